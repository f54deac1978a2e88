// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod enforcement;
pub mod generation;
pub mod logging;
pub mod policy;
pub mod rate_limit;
pub mod safety;
pub mod version;

pub use config::GatewayConfig;
pub use enforcement::{
    AuditRecord, AuditSink, Disposition, Enforcement, EnforcementRequest, Enforcer, Identity,
    Verdict,
};
pub use generation::{GenerationError, TextGenerator};
pub use policy::{PolicyDocument, PolicyLoadError, PolicyStore};
pub use rate_limit::{CounterBackend, Decision, RateLimiter};
pub use safety::{SafetyFinding, SafetyPipeline};
