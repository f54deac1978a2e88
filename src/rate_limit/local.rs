// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Process-local fixed-window counter, also the fallback target when the
//! shared backend is unreachable

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::backend::{BackendError, CounterBackend};
use super::window::Window;

/// Per-identity counter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindowState {
    pub count: u64,
    pub window_start: u64,
}

/// In-memory counter keyed by identity.
///
/// Only correct for a single instance: N instances each enforce the limit on
/// their own, admitting up to N x `requests_per_window`.
pub struct LocalCounter {
    windows: Mutex<HashMap<String, RateWindowState>>,
    last_prune: AtomicU64,
}

impl LocalCounter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            last_prune: AtomicU64::new(0),
        }
    }

    /// Increment under the map lock so concurrent bursts from one identity
    /// never lose updates
    pub fn increment_in(&self, identity: &str, window: Window) -> u64 {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        // Prune at most once per window
        let last_prune = self.last_prune.load(Ordering::Relaxed);
        if window.start >= last_prune + window.seconds {
            windows.retain(|_, state| state.window_start + window.seconds > window.start);
            self.last_prune.store(window.start, Ordering::Relaxed);
        }

        let state = windows
            .entry(identity.to_string())
            .or_insert(RateWindowState {
                count: 0,
                window_start: window.start,
            });
        if state.window_start < window.start {
            state.count = 0;
            state.window_start = window.start;
        }
        state.count += 1;
        state.count
    }

    /// Snapshot of the state for `identity`, if any
    pub fn state(&self, identity: &str) -> Option<RateWindowState> {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(identity)
            .copied()
    }

    /// Number of identities currently tracked
    pub fn tracked(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for LocalCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterBackend for LocalCounter {
    async fn increment(&self, identity: &str, window: Window) -> Result<u64, BackendError> {
        Ok(self.increment_in(identity, window))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
