// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-identity fixed-window rate limiting
//!
//! - `window`: epoch bucketing shared by all backends
//! - `local`: in-process counter, also the fallback target
//! - `redis_counter`: shared counter for multi-instance deployments
//! - `limiter`: admission with transparent fallback

pub mod backend;
pub mod limiter;
pub mod local;
pub mod redis_counter;
pub mod window;

pub use backend::{BackendError, BackendKind, CounterBackend};
pub use limiter::{Decision, QuotaExceeded, RateLimiter};
pub use local::{LocalCounter, RateWindowState};
pub use redis_counter::RedisCounter;
pub use window::{unix_now, RateLimitPolicy, Window};
