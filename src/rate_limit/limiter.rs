// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fixed-window rate limiter preferring a shared backend, degrading to the
//! process-local counter on any backend failure

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::backend::{BackendKind, CounterBackend};
use super::local::LocalCounter;
use super::window::{unix_now, RateLimitPolicy, Window};

/// Admission rejected for the current window
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Rate limit of {limit} requests exceeded, retry after {retry_after_secs}s")]
pub struct QuotaExceeded {
    pub limit: u64,
    pub retry_after_secs: u64,
}

/// Outcome of one admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Post-increment count in the current window
    pub count: u64,
    pub limit: u64,
    /// Seconds until the current window closes
    pub retry_after_secs: u64,
    pub backend: BackendKind,
}

impl Decision {
    pub fn into_result(self) -> Result<Decision, QuotaExceeded> {
        if self.allowed {
            Ok(self)
        } else {
            Err(QuotaExceeded {
                limit: self.limit,
                retry_after_secs: self.retry_after_secs,
            })
        }
    }
}

/// Admits or rejects requests per identity.
///
/// When a shared backend is configured it is tried first; any error routes
/// that call to the local counter and marks the backend down. While down,
/// calls skip the backend until `reprobe_interval` has elapsed (`None` keeps
/// it bypassed for the life of the process).
pub struct RateLimiter {
    shared: Option<Arc<dyn CounterBackend>>,
    local: Arc<LocalCounter>,
    reprobe_interval: Option<Duration>,
    shared_down_since: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Limiter backed only by the process-local counter
    pub fn local_only() -> Self {
        Self {
            shared: None,
            local: Arc::new(LocalCounter::new()),
            reprobe_interval: None,
            shared_down_since: Mutex::new(None),
        }
    }

    /// Limiter preferring `shared`, falling back to a local counter
    pub fn with_shared(shared: Arc<dyn CounterBackend>, reprobe_interval: Option<Duration>) -> Self {
        info!(
            backend = shared.name(),
            reprobe_secs = reprobe_interval.map(|d| d.as_secs()),
            "Rate limiter using shared backend with local fallback"
        );
        Self {
            shared: Some(shared),
            local: Arc::new(LocalCounter::new()),
            reprobe_interval,
            shared_down_since: Mutex::new(None),
        }
    }

    pub fn local_counter(&self) -> &LocalCounter {
        &self.local
    }

    pub fn has_shared_backend(&self) -> bool {
        self.shared.is_some()
    }

    /// Admission check for `identity` at the current time
    pub async fn admit(&self, identity: &str, policy: &RateLimitPolicy) -> Decision {
        self.admit_at(identity, policy, unix_now()).await
    }

    /// Admission check at an explicit Unix time in seconds
    pub async fn admit_at(&self, identity: &str, policy: &RateLimitPolicy, now_secs: u64) -> Decision {
        let window = Window::containing(now_secs, policy.window_seconds);

        let (count, backend) = match self.usable_shared() {
            Some(shared) => match shared.increment(identity, window).await {
                Ok(count) => {
                    self.mark_shared_up();
                    (count, BackendKind::Shared)
                }
                Err(e) => {
                    self.mark_shared_down(shared.name(), &e);
                    (self.local.increment_in(identity, window), BackendKind::Local)
                }
            },
            None => (self.local.increment_in(identity, window), BackendKind::Local),
        };

        let allowed = count <= policy.requests_per_window;
        if !allowed {
            debug!(
                identity,
                count,
                limit = policy.requests_per_window,
                backend = ?backend,
                "Rate limit exceeded"
            );
        }

        Decision {
            allowed,
            count,
            limit: policy.requests_per_window,
            retry_after_secs: window.retry_after(now_secs),
            backend,
        }
    }

    /// Probe the shared backend; `None` when none is configured
    pub async fn shared_backend_healthy(&self) -> Option<bool> {
        let shared = self.shared.as_ref()?;
        match shared.ping().await {
            Ok(()) => {
                self.mark_shared_up();
                Some(true)
            }
            Err(e) => {
                debug!(backend = shared.name(), error = %e, "Shared backend probe failed");
                Some(false)
            }
        }
    }

    /// True while calls are being routed to the local counter
    pub fn is_degraded(&self) -> bool {
        self.shared.is_some() && self.down_since().is_some()
    }

    /// The shared backend when this call should use it. While the backend is
    /// down, the first caller after each re-probe interval claims the probe
    /// and everyone else stays local.
    fn usable_shared(&self) -> Option<&Arc<dyn CounterBackend>> {
        let shared = self.shared.as_ref()?;
        let mut down = self
            .shared_down_since
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match *down {
            None => Some(shared),
            Some(since) => match self.reprobe_interval {
                Some(interval) if since.elapsed() >= interval => {
                    *down = Some(Instant::now());
                    Some(shared)
                }
                _ => None,
            },
        }
    }

    fn down_since(&self) -> Option<Instant> {
        *self
            .shared_down_since
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn mark_shared_down(&self, name: &str, error: &super::backend::BackendError) {
        let mut down = self
            .shared_down_since
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if down.is_none() {
            warn!(
                backend = name,
                error = %error,
                "Shared rate-limit backend unavailable, falling back to local counter"
            );
        } else {
            debug!(backend = name, error = %error, "Shared rate-limit backend still unavailable");
        }
        *down = Some(Instant::now());
    }

    fn mark_shared_up(&self) {
        let mut down = self
            .shared_down_since
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if down.take().is_some() {
            info!("Shared rate-limit backend reachable again");
        }
    }
}
