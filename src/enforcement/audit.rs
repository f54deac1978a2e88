// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! One structured audit record per request, written to an append-only sink

use serde::Serialize;
use std::sync::Mutex;
use tracing::info;

/// Terminal state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    Allowed,
    Flagged,
    RateLimited,
    Unauthorized,
    UpstreamError,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Allowed => "ALLOWED",
            Disposition::Flagged => "FLAGGED",
            Disposition::RateLimited => "RATE_LIMITED",
            Disposition::Unauthorized => "UNAUTHORIZED",
            Disposition::UpstreamError => "UPSTREAM_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub request_id: String,
    /// Identity fingerprint, never a raw key
    pub identity: String,
    pub disposition: Disposition,
    pub flagged: bool,
    pub reasons: Vec<String>,
    pub ratelimited: bool,
    pub policy_version: String,
    pub timestamp_ms: i64,
}

/// Destination for audit records. Never read back by the gateway.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Emits each record as one `tracing` event on the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        let json = serde_json::to_string(record).unwrap_or_default();
        info!(
            target: "audit",
            request_id = %record.request_id,
            identity = %record.identity,
            disposition = record.disposition.as_str(),
            flagged = record.flagged,
            ratelimited = record.ratelimited,
            policy_version = %record.policy_version,
            timestamp_ms = record.timestamp_ms,
            record = %json,
            "request audited"
        );
    }
}

/// Keeps records in memory; for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
    }
}
