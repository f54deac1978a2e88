// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Result of one safety pipeline run

use serde::{Deserialize, Serialize};

/// Findings for one text body. Built fresh per run and never mutated after
/// it is returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyFinding {
    pub flagged: bool,
    /// Detection reasons followed by output-check reasons, in stage order
    pub reasons: Vec<String>,
    pub sanitized_text: String,
    pub redacted_text: String,
    pub final_output: String,
    /// Version of the policy that produced this finding
    pub policy_version: String,
}

impl SafetyFinding {
    /// Finding for a text that passed through every stage unchanged
    pub fn passthrough(text: &str, policy_version: &str) -> Self {
        Self {
            flagged: false,
            reasons: Vec::new(),
            sanitized_text: text.to_string(),
            redacted_text: text.to_string(),
            final_output: text.to_string(),
            policy_version: policy_version.to_string(),
        }
    }
}
