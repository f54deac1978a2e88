// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Request lifecycle: authenticate, admit, filter input, generate, filter
//! output, audit

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::audit::{AuditRecord, AuditSink, Disposition};
use super::identity::Identity;
use crate::generation::{GenerationError, TextGenerator};
use crate::policy::{PolicyDocument, PolicyStore};
use crate::rate_limit::{QuotaExceeded, RateLimiter};
use crate::safety::{SafetyFinding, SafetyPipeline};

/// Missing or rejected caller credential
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("API key required")]
    MissingApiKey,
    #[error("API key not recognised")]
    InvalidApiKey,
}

/// One inbound text to enforce
#[derive(Debug, Clone)]
pub struct EnforcementRequest {
    pub api_key: Option<String>,
    /// Network origin of the caller, used when no key is presented
    pub origin: String,
    pub text: String,
}

/// Safety results collected before the terminal state
#[derive(Debug, Clone)]
pub struct SafetyReport {
    pub input: SafetyFinding,
    /// Absent when a flagged input ended the request before generation
    pub output: Option<SafetyFinding>,
}

impl SafetyReport {
    /// The finding that decided the disposition
    pub fn decisive(&self) -> &SafetyFinding {
        self.output.as_ref().unwrap_or(&self.input)
    }
}

#[derive(Debug)]
pub enum Verdict {
    Allowed(SafetyReport),
    Flagged(SafetyReport),
    RateLimited(QuotaExceeded),
    Unauthorized(AuthError),
    UpstreamError(GenerationError),
}

impl Verdict {
    pub fn disposition(&self) -> Disposition {
        match self {
            Verdict::Allowed(_) => Disposition::Allowed,
            Verdict::Flagged(_) => Disposition::Flagged,
            Verdict::RateLimited(_) => Disposition::RateLimited,
            Verdict::Unauthorized(_) => Disposition::Unauthorized,
            Verdict::UpstreamError(_) => Disposition::UpstreamError,
        }
    }
}

/// Terminal result of one enforced request
#[derive(Debug)]
pub struct Enforcement {
    pub request_id: String,
    pub policy_version: String,
    pub verdict: Verdict,
}

/// Composes policy, rate limiter, safety pipeline and generator.
///
/// The policy snapshot is taken once per request so a concurrent reload
/// never changes the rules half way through.
pub struct Enforcer {
    policies: Arc<PolicyStore>,
    limiter: Arc<RateLimiter>,
    generator: Arc<dyn TextGenerator>,
    audit: Arc<dyn AuditSink>,
    generation_timeout: Duration,
}

impl Enforcer {
    pub fn new(
        policies: Arc<PolicyStore>,
        limiter: Arc<RateLimiter>,
        generator: Arc<dyn TextGenerator>,
        audit: Arc<dyn AuditSink>,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            policies,
            limiter,
            generator,
            audit,
            generation_timeout,
        }
    }

    pub fn policies(&self) -> &Arc<PolicyStore> {
        &self.policies
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    /// Drive one request to a terminal state and emit its audit record.
    ///
    /// Dropping the returned future before completion abandons the request
    /// without an audit record; an admission already counted stays counted.
    pub async fn enforce(&self, request: EnforcementRequest) -> Enforcement {
        let request_id = Uuid::new_v4().to_string();
        let policy = self.policies.current();
        let identity = Identity::from_request(request.api_key.as_deref(), &request.origin);

        let verdict = self.decide(&policy, &identity, &request.text).await;
        let enforcement = Enforcement {
            request_id,
            policy_version: policy.version.clone(),
            verdict,
        };
        self.audit.record(&audit_record(&enforcement, &identity));
        enforcement
    }

    async fn decide(&self, policy: &Arc<PolicyDocument>, identity: &Identity, text: &str) -> Verdict {
        if let Err(e) = authenticate(policy, identity) {
            warn!(identity = %identity, error = %e, "Request unauthorized");
            return Verdict::Unauthorized(e);
        }

        let fingerprint = identity.fingerprint();
        if let Err(quota) = self
            .limiter
            .admit(&fingerprint, &policy.rate_limit)
            .await
            .into_result()
        {
            info!(
                identity = %fingerprint,
                retry_after_secs = quota.retry_after_secs,
                "Request rate limited"
            );
            return Verdict::RateLimited(quota);
        }

        let pipeline = SafetyPipeline::new(Arc::clone(policy));
        let input = pipeline.run(text);
        if input.flagged {
            debug!(reasons = ?input.reasons, "Input flagged");
            if policy.block_flagged_input {
                return Verdict::Flagged(SafetyReport {
                    input,
                    output: None,
                });
            }
        }

        let generated = match tokio::time::timeout(
            self.generation_timeout,
            self.generator.generate(&input.final_output),
        )
        .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(generator = self.generator.name(), error = %e, "Upstream generation failed");
                return Verdict::UpstreamError(e);
            }
            Err(_) => {
                let timeout_ms = self.generation_timeout.as_millis() as u64;
                warn!(generator = self.generator.name(), timeout_ms, "Upstream generation timed out");
                return Verdict::UpstreamError(GenerationError::Timeout { timeout_ms });
            }
        };

        let output = pipeline.run(&generated);
        let report = SafetyReport {
            input,
            output: Some(output),
        };
        if report.decisive().flagged {
            Verdict::Flagged(report)
        } else {
            Verdict::Allowed(report)
        }
    }
}

fn authenticate(policy: &PolicyDocument, identity: &Identity) -> Result<(), AuthError> {
    if !policy.requires_api_key() {
        return Ok(());
    }
    match identity.api_key() {
        None => Err(AuthError::MissingApiKey),
        Some(key) if policy.is_key_allowed(key) => Ok(()),
        Some(_) => Err(AuthError::InvalidApiKey),
    }
}

fn audit_record(enforcement: &Enforcement, identity: &Identity) -> AuditRecord {
    let (flagged, reasons) = match &enforcement.verdict {
        Verdict::Allowed(report) | Verdict::Flagged(report) => {
            let finding = report.decisive();
            (finding.flagged, finding.reasons.clone())
        }
        Verdict::RateLimited(quota) => (false, vec![quota.to_string()]),
        Verdict::Unauthorized(e) => (false, vec![e.to_string()]),
        Verdict::UpstreamError(e) => (false, vec![e.to_string()]),
    };
    AuditRecord {
        request_id: enforcement.request_id.clone(),
        identity: identity.fingerprint(),
        disposition: enforcement.verdict.disposition(),
        flagged,
        reasons,
        ratelimited: matches!(enforcement.verdict, Verdict::RateLimited(_)),
        policy_version: enforcement.policy_version.clone(),
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
    }
}
