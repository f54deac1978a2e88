// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use serde::{Deserialize, Serialize};

use crate::enforcement::SafetyReport;
use crate::rate_limit::RateLimitPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
}

/// Body of `POST /analyze`; identical for allowed and flagged results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub request_id: String,
    pub sanitized_text: String,
    pub redacted_text: String,
    pub final_output: String,
    pub flagged: bool,
    pub reasons: Vec<String>,
    pub policy_version: String,
    pub input_flagged: bool,
    pub input_reasons: Vec<String>,
}

impl AnalyzeResponse {
    pub fn from_report(request_id: String, report: &SafetyReport) -> Self {
        let finding = report.decisive();
        Self {
            request_id,
            sanitized_text: finding.sanitized_text.clone(),
            redacted_text: finding.redacted_text.clone(),
            final_output: finding.final_output.clone(),
            flagged: finding.flagged,
            reasons: finding.reasons.clone(),
            policy_version: finding.policy_version.clone(),
            input_flagged: report.input.flagged,
            input_reasons: report.input.reasons.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub policy_version: String,
    /// True while running without a policy source
    pub policy_degraded: bool,
    /// "shared", "local" or "local-fallback"
    pub rate_limit_backend: String,
    pub generator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub ready: bool,
    /// "ok", "unavailable" or "not_configured"
    pub redis: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyInfo {
    pub version: String,
    pub degraded: bool,
    pub reload_count: u64,
    pub auth_required: bool,
    pub rate_limit: RateLimitPolicy,
    pub blocked_term_count: usize,
    pub sanitize_rule_count: usize,
    pub redact_pii: bool,
    pub max_output_length: usize,
    pub block_flagged_input: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResponse {
    pub previous_version: String,
    pub version: String,
    pub reload_count: u64,
}
