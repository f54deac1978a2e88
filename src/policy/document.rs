// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Policy document: parsing, defaults and load-time validation
//!
//! The on-disk document is human-edited YAML or TOML:
//!
//! ```yaml
//! version: "2025-01-15"
//! safety:
//!   blocked_terms: ["bomb"]
//!   sanitize_replacements:
//!     - pattern: "password\\s*=\\s*\\S+"
//!       replacement: "password=[removed]"
//!   redaction_patterns:
//!     email: "[EMAIL REDACTED]"
//!   max_output_length: 500
//! api:
//!   allowed_api_keys: ["dev-key"]
//!   rate_limit:
//!     requests_per_window: 60
//!     window_seconds: 60
//! logging:
//!   level: info
//! ```
//!
//! Keys are snake_case; the camelCase spellings are accepted as aliases and
//! the `safety` section may also be named `rules`.

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

use super::errors::{ConfigError, PolicyLoadError};
use crate::rate_limit::RateLimitPolicy;
use crate::safety::patterns;

/// Version reported when no policy source exists
pub const UNAVAILABLE_VERSION: &str = "unavailable";
/// Version reported when the document does not carry one
pub const UNKNOWN_VERSION: &str = "unknown";

pub const DEFAULT_MAX_OUTPUT_LENGTH: usize = 500;
pub const DEFAULT_EMAIL_PLACEHOLDER: &str = "[EMAIL REDACTED]";
pub const DEFAULT_PHONE_PLACEHOLDER: &str = "[PHONE REDACTED]";
pub const DEFAULT_SANITIZE_REPLACEMENT: &str = "[removed]";

/// Serialization format of a policy source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyFormat {
    Yaml,
    Toml,
}

impl PolicyFormat {
    /// `.toml` selects TOML, anything else is read as YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => PolicyFormat::Toml,
            _ => PolicyFormat::Yaml,
        }
    }
}

// --- Raw document as written by operators ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPolicy {
    version: Option<serde_json::Value>,
    #[serde(alias = "rules")]
    safety: RawSafety,
    api: RawApi,
    logging: RawLogging,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawSafety {
    #[serde(alias = "blockedTerms")]
    blocked_terms: Vec<String>,
    #[serde(alias = "sanitize_rules", alias = "sanitizeRules")]
    sanitize_replacements: Vec<RawSanitizeRule>,
    #[serde(alias = "paraphraseEnabled")]
    paraphrase_enabled: bool,
    #[serde(alias = "paraphraseHint")]
    paraphrase_hint: String,
    #[serde(alias = "redactPII", alias = "redactPii")]
    redact_pii: bool,
    #[serde(alias = "redactionPatterns")]
    redaction_patterns: RawRedaction,
    #[serde(alias = "maxOutputLength")]
    max_output_length: usize,
    #[serde(alias = "allowHtml")]
    allow_html: bool,
    #[serde(alias = "allowBlockedTermsInOutput")]
    allow_blocked_terms_in_output: bool,
    #[serde(alias = "blockFlaggedInput")]
    block_flagged_input: bool,
}

impl Default for RawSafety {
    fn default() -> Self {
        Self {
            blocked_terms: Vec::new(),
            sanitize_replacements: Vec::new(),
            paraphrase_enabled: false,
            paraphrase_hint: String::new(),
            redact_pii: true,
            redaction_patterns: RawRedaction::default(),
            max_output_length: DEFAULT_MAX_OUTPUT_LENGTH,
            allow_html: false,
            allow_blocked_terms_in_output: false,
            block_flagged_input: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSanitizeRule {
    pattern: String,
    replacement: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRedaction {
    email: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawApi {
    #[serde(alias = "allowedApiKeys")]
    allowed_api_keys: Vec<String>,
    #[serde(alias = "rateLimit")]
    rate_limit: RawRateLimit,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawRateLimit {
    #[serde(alias = "requestsPerWindow")]
    requests_per_window: u64,
    #[serde(alias = "windowSeconds")]
    window_seconds: u64,
}

impl Default for RawRateLimit {
    fn default() -> Self {
        let defaults = RateLimitPolicy::default();
        Self {
            requests_per_window: defaults.requests_per_window,
            window_seconds: defaults.window_seconds,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLogging {
    level: Option<String>,
}

// --- Compiled document ---

/// One ordered, case-insensitive regex substitution
#[derive(Debug, Clone)]
pub struct SanitizeRule {
    pub pattern: Regex,
    pub replacement: String,
}

/// Placeholders substituted for redacted PII
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionPlaceholders {
    pub email: String,
    pub phone: String,
}

impl Default for RedactionPlaceholders {
    fn default() -> Self {
        Self {
            email: DEFAULT_EMAIL_PLACEHOLDER.to_string(),
            phone: DEFAULT_PHONE_PLACEHOLDER.to_string(),
        }
    }
}

/// Validated, immutable policy snapshot.
///
/// Shared behind an `Arc` by the policy store; a reload builds a new
/// instance instead of mutating this one.
#[derive(Debug, Clone)]
pub struct PolicyDocument {
    pub version: String,
    /// False only in the degraded "no policy" mode
    pub enforced: bool,
    /// Lowercased, deduplicated, in declaration order
    pub blocked_terms: Vec<String>,
    pub sanitize_rules: Vec<SanitizeRule>,
    pub paraphrase_enabled: bool,
    pub paraphrase_hint: String,
    pub redact_pii: bool,
    pub redaction: RedactionPlaceholders,
    pub max_output_length: usize,
    pub allow_html: bool,
    pub allow_blocked_terms_in_output: bool,
    pub block_flagged_input: bool,
    pub rate_limit: RateLimitPolicy,
    pub allowed_api_keys: HashSet<String>,
    pub log_level: Option<String>,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            version: UNKNOWN_VERSION.to_string(),
            enforced: true,
            blocked_terms: Vec::new(),
            sanitize_rules: Vec::new(),
            paraphrase_enabled: false,
            paraphrase_hint: String::new(),
            redact_pii: true,
            redaction: RedactionPlaceholders::default(),
            max_output_length: DEFAULT_MAX_OUTPUT_LENGTH,
            allow_html: false,
            allow_blocked_terms_in_output: false,
            block_flagged_input: false,
            rate_limit: RateLimitPolicy::default(),
            allowed_api_keys: HashSet::new(),
            log_level: None,
        }
    }
}

impl PolicyDocument {
    /// Degraded snapshot used when the policy source is absent: every safety
    /// stage is skipped and the version reads `unavailable`.
    pub fn unavailable() -> Self {
        Self {
            version: UNAVAILABLE_VERSION.to_string(),
            enforced: false,
            ..Self::default()
        }
    }

    /// Read and validate a policy file
    pub fn load(path: &Path) -> Result<Self, PolicyLoadError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| PolicyLoadError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&content, PolicyFormat::from_path(path)).map_err(|e| match e {
            PolicyLoadError::Malformed { message, .. } => PolicyLoadError::Malformed {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Parse and validate a policy document held in memory
    pub fn parse(content: &str, format: PolicyFormat) -> Result<Self, PolicyLoadError> {
        let raw: RawPolicy = if content.trim().is_empty() {
            RawPolicy::default()
        } else {
            match format {
                PolicyFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
                PolicyFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            }
            .map_err(|message| PolicyLoadError::Malformed {
                path: Default::default(),
                message,
            })?
        };
        Ok(Self::compile(raw)?)
    }

    fn compile(raw: RawPolicy) -> Result<Self, ConfigError> {
        let version = match raw.version {
            None | Some(serde_json::Value::Null) => UNKNOWN_VERSION.to_string(),
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
        };

        let safety = raw.safety;

        let mut seen = HashSet::new();
        let mut blocked_terms = Vec::new();
        for term in safety.blocked_terms {
            if term.trim().is_empty() {
                warn!(version = %version, "Skipping blank blocked term");
                continue;
            }
            let term = term.to_lowercase();
            if seen.insert(term.clone()) {
                blocked_terms.push(term);
            }
        }

        let mut sanitize_rules = Vec::with_capacity(safety.sanitize_replacements.len());
        for (index, rule) in safety.sanitize_replacements.into_iter().enumerate() {
            if rule.pattern.is_empty() {
                warn!(index, "Skipping sanitize rule with empty pattern");
                continue;
            }
            let pattern = RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| ConfigError::InvalidPattern {
                    index,
                    pattern: rule.pattern.clone(),
                    source,
                })?;
            sanitize_rules.push(SanitizeRule {
                pattern,
                replacement: rule
                    .replacement
                    .unwrap_or_else(|| DEFAULT_SANITIZE_REPLACEMENT.to_string()),
            });
        }

        let redaction = RedactionPlaceholders {
            email: safety
                .redaction_patterns
                .email
                .unwrap_or_else(|| DEFAULT_EMAIL_PLACEHOLDER.to_string()),
            phone: safety
                .redaction_patterns
                .phone
                .unwrap_or_else(|| DEFAULT_PHONE_PLACEHOLDER.to_string()),
        };
        for (kind, placeholder) in [("email", &redaction.email), ("phone", &redaction.phone)] {
            if patterns::matches_pii(placeholder) {
                return Err(ConfigError::SelfMatchingPlaceholder {
                    kind: kind.to_string(),
                    placeholder: placeholder.clone(),
                });
            }
            if patterns::joins_adjacent_text(placeholder) {
                return Err(ConfigError::UnboundedPlaceholder {
                    kind: kind.to_string(),
                    placeholder: placeholder.clone(),
                });
            }
        }

        if safety.max_output_length == 0 {
            return Err(ConfigError::InvalidMaxOutputLength);
        }

        let rate_limit = RateLimitPolicy {
            requests_per_window: raw.api.rate_limit.requests_per_window,
            window_seconds: raw.api.rate_limit.window_seconds,
        };
        rate_limit.validate().map_err(ConfigError::InvalidRateLimit)?;

        let allowed_api_keys = raw
            .api
            .allowed_api_keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        Ok(Self {
            version,
            enforced: true,
            blocked_terms,
            sanitize_rules,
            paraphrase_enabled: safety.paraphrase_enabled,
            paraphrase_hint: safety.paraphrase_hint,
            redact_pii: safety.redact_pii,
            redaction,
            max_output_length: safety.max_output_length,
            allow_html: safety.allow_html,
            allow_blocked_terms_in_output: safety.allow_blocked_terms_in_output,
            block_flagged_input: safety.block_flagged_input,
            rate_limit,
            allowed_api_keys,
            log_level: raw.logging.level,
        })
    }

    /// True when this snapshot came from the degraded "no policy" mode
    pub fn is_degraded(&self) -> bool {
        !self.enforced
    }

    /// API keys are only checked when the document lists at least one
    pub fn requires_api_key(&self) -> bool {
        !self.allowed_api_keys.is_empty()
    }

    pub fn is_key_allowed(&self, key: &str) -> bool {
        self.allowed_api_keys.contains(key)
    }
}
