// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fixed-window bucketing shared by every counter backend

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Rate-limit parameters carried by the policy document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    pub requests_per_window: u64,
    pub window_seconds: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            requests_per_window: 60,
            window_seconds: 60,
        }
    }
}

impl RateLimitPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.requests_per_window == 0 {
            return Err("requests_per_window must be greater than 0".to_string());
        }
        if self.window_seconds == 0 {
            return Err("window_seconds must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// The epoch-aligned window a request falls into.
///
/// `start = now - (now mod window_seconds)`, so every instance sharing a
/// clock agrees on bucket boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: u64,
    pub seconds: u64,
}

impl Window {
    /// Window containing `now_secs` (seconds since the Unix epoch)
    pub fn containing(now_secs: u64, window_seconds: u64) -> Self {
        let seconds = window_seconds.max(1);
        Self {
            start: now_secs - (now_secs % seconds),
            seconds,
        }
    }

    pub fn end(&self) -> u64 {
        self.start + self.seconds
    }

    /// Seconds until the next window opens, never less than one
    pub fn retry_after(&self, now_secs: u64) -> u64 {
        self.end().saturating_sub(now_secs).max(1)
    }

    /// True once `now_secs` has moved past this window
    pub fn is_expired(&self, now_secs: u64) -> bool {
        now_secs >= self.end()
    }

    /// Counter key for `identity` in this window
    pub fn key(&self, identity: &str) -> String {
        format!("ratelimit:{}:{}", identity, self.start)
    }
}

/// Current Unix time in whole seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
