// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Counter backend trait shared by the local and Redis implementations

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::window::Window;

/// Shared counter backend failures. Always absorbed by the limiter, which
/// falls back to the process-local counter.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend did not answer within the configured timeout
    #[error("Rate-limit backend timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Connection or command failure reported by Redis
    #[error("Rate-limit backend error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Backend refused the operation for another reason
    #[error("Rate-limit backend unavailable: {0}")]
    Unavailable(String),
}

/// Which counter produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Shared,
    Local,
}

/// Atomic increment-per-window counter
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Increment the counter for `identity` in `window` and return the
    /// post-increment count. Increments for one identity and window must be
    /// linearizable.
    async fn increment(&self, identity: &str, window: Window) -> Result<u64, BackendError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Cheap reachability probe used by readiness checks
    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
