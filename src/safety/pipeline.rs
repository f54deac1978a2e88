// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Four-stage content safety pipeline driven by the active policy
//!
//! 1. `detect` - blocked terms and markup in the raw text
//! 2. `sanitize_or_paraphrase` - ordered regex substitutions, optional hint
//! 3. `redact` - email then phone placeholders
//! 4. `output_check` - length ceiling and surviving blocked terms
//!
//! Every stage is pure CPU work over owned strings; nothing here blocks or
//! fails once the policy has been validated at load time.

use regex::NoExpand;
use std::sync::Arc;

use super::finding::SafetyFinding;
use super::patterns;
use crate::policy::PolicyDocument;

/// Pipeline bound to one policy snapshot
#[derive(Debug, Clone)]
pub struct SafetyPipeline {
    policy: Arc<PolicyDocument>,
}

impl SafetyPipeline {
    pub fn new(policy: Arc<PolicyDocument>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PolicyDocument {
        &self.policy
    }

    /// Stage 1: one reason per matching blocked term, plus one for markup
    /// when HTML is not allowed
    pub fn detect(&self, text: &str) -> Vec<String> {
        let mut reasons: Vec<String> = self
            .blocked_terms_in(text)
            .map(|term| format!("Detected blocked term: '{}'", term))
            .collect();
        if !self.policy.allow_html && patterns::html_tag().is_match(text) {
            reasons.push("HTML content is not allowed".to_string());
        }
        reasons
    }

    /// Stage 2: sanitize rules in declared order, each applied to the
    /// previous rule's output, then the paraphrase hint after a blank line
    pub fn sanitize_or_paraphrase(&self, text: &str) -> String {
        let mut sanitized = text.to_string();
        for rule in &self.policy.sanitize_rules {
            sanitized = rule
                .pattern
                .replace_all(&sanitized, rule.replacement.as_str())
                .into_owned();
        }
        if self.policy.paraphrase_enabled && !self.policy.paraphrase_hint.is_empty() {
            sanitized = format!("{}\n\n{}", sanitized, self.policy.paraphrase_hint);
        }
        sanitized
    }

    /// Stage 3: email addresses, then phone numbers, replaced by the
    /// configured placeholders. Placeholders never match either pattern, so
    /// redacting twice is a no-op.
    pub fn redact(&self, text: &str) -> String {
        if !self.policy.redact_pii {
            return text.to_string();
        }
        let redaction = &self.policy.redaction;
        let redacted = patterns::email().replace_all(text, NoExpand(&redaction.email));
        patterns::phone()
            .replace_all(&redacted, NoExpand(&redaction.phone))
            .into_owned()
    }

    /// Stage 4: length ceiling (in characters) and, unless allowed, any
    /// blocked term still present after sanitization and redaction
    pub fn output_check(&self, text: &str) -> Vec<String> {
        let mut issues = Vec::new();
        if text.chars().count() > self.policy.max_output_length {
            issues.push(format!(
                "Output exceeds maximum length of {} characters",
                self.policy.max_output_length
            ));
        }
        if !self.policy.allow_blocked_terms_in_output {
            issues.extend(
                self.blocked_terms_in(text)
                    .map(|term| format!("Output still contains blocked term '{}'", term)),
            );
        }
        issues
    }

    /// Run all four stages over `text`
    pub fn run(&self, text: &str) -> SafetyFinding {
        if self.policy.is_degraded() {
            return SafetyFinding::passthrough(text, &self.policy.version);
        }

        let mut reasons = self.detect(text);
        let sanitized_text = self.sanitize_or_paraphrase(text);
        let redacted_text = self.redact(&sanitized_text);
        reasons.extend(self.output_check(&redacted_text));

        SafetyFinding {
            flagged: !reasons.is_empty(),
            reasons,
            sanitized_text,
            final_output: redacted_text.clone(),
            redacted_text,
            policy_version: self.policy.version.clone(),
        }
    }

    fn blocked_terms_in<'a>(&'a self, text: &str) -> impl Iterator<Item = &'a str> + 'a {
        let lowered = text.to_lowercase();
        self.policy
            .blocked_terms
            .iter()
            .filter(move |term| lowered.contains(term.as_str()))
            .map(String::as_str)
    }
}
