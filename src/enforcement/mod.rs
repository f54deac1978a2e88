// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod audit;
pub mod identity;
pub mod orchestrator;

pub use audit::{AuditRecord, AuditSink, Disposition, MemoryAuditSink, TracingAuditSink};
pub use identity::Identity;
pub use orchestrator::{
    AuthError, Enforcement, EnforcementRequest, Enforcer, SafetyReport, Verdict,
};
