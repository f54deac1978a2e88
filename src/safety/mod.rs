// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Policy-driven content safety: detect, sanitize, redact, output check

pub mod finding;
pub mod patterns;
pub mod pipeline;

pub use finding::SafetyFinding;
pub use pipeline::SafetyPipeline;
