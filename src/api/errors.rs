// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::enforcement::AuthError;
use crate::generation::GenerationError;
use crate::policy::PolicyLoadError;
use crate::rate_limit::QuotaExceeded;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
    pub request_id: Option<String>,
    pub details: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone)]
pub enum ApiError {
    InvalidRequest(String),
    Unauthorized(String),
    Forbidden(String),
    RateLimitExceeded {
        limit: u64,
        retry_after: u64,
    },
    UpstreamError(String),
    PolicyReloadFailed(String),
    Timeout,
}

impl ApiError {
    pub fn to_response(&self, request_id: Option<String>) -> ErrorResponse {
        let (error_type, message, details) = match self {
            ApiError::InvalidRequest(msg) => ("invalid_request", msg.clone(), None),
            ApiError::Unauthorized(msg) => ("unauthorized", msg.clone(), None),
            ApiError::Forbidden(msg) => ("forbidden", msg.clone(), None),
            ApiError::RateLimitExceeded { limit, retry_after } => {
                let mut details = HashMap::new();
                details.insert(
                    "retry_after".to_string(),
                    serde_json::Value::Number((*retry_after).into()),
                );
                details.insert(
                    "limit".to_string(),
                    serde_json::Value::Number((*limit).into()),
                );
                (
                    "rate_limit_exceeded",
                    "Rate limit exceeded".to_string(),
                    Some(details),
                )
            }
            ApiError::UpstreamError(msg) => ("upstream_error", msg.clone(), None),
            ApiError::PolicyReloadFailed(msg) => ("policy_reload_failed", msg.clone(), None),
            ApiError::Timeout => ("timeout", "Upstream request timed out".to_string(), None),
        };

        ErrorResponse {
            error_type: error_type.to_string(),
            message,
            request_id,
            details,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidRequest(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::RateLimitExceeded { .. } => 429,
            ApiError::UpstreamError(_) => 502,
            ApiError::PolicyReloadFailed(_) => 422,
            ApiError::Timeout => 504,
        }
    }

    /// Seconds for the `Retry-After` header, when one applies
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ApiError::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::RateLimitExceeded { retry_after, .. } => write!(
                f,
                "Rate limit exceeded, retry after {} seconds",
                retry_after
            ),
            ApiError::UpstreamError(msg) => write!(f, "Upstream error: {}", msg),
            ApiError::PolicyReloadFailed(msg) => write!(f, "Policy reload failed: {}", msg),
            ApiError::Timeout => write!(f, "Upstream request timed out"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Unauthorized(e.to_string())
    }
}

impl From<QuotaExceeded> for ApiError {
    fn from(e: QuotaExceeded) -> Self {
        ApiError::RateLimitExceeded {
            limit: e.limit,
            retry_after: e.retry_after_secs,
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Timeout { .. } => ApiError::Timeout,
            other => ApiError::UpstreamError(other.to_string()),
        }
    }
}

impl From<PolicyLoadError> for ApiError {
    fn from(e: PolicyLoadError) -> Self {
        ApiError::PolicyReloadFailed(e.to_string())
    }
}
