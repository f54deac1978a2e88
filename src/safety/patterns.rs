// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fixed detection and PII patterns used by the safety pipeline

use regex::Regex;
use std::sync::OnceLock;

/// Tag-like markup (`<...>`), flagged when HTML is not allowed
pub fn html_tag() -> &'static Regex {
    static HTML_TAG: OnceLock<Regex> = OnceLock::new();
    HTML_TAG.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

/// Email addresses: `local@domain` with word characters, dots and dashes
pub fn email() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"[\w.\-]+@[\w.\-]+").unwrap())
}

/// Phone numbers with optional country code, `. -` or space separators and
/// parenthesized area codes, e.g. `+1 (555) 123-4567`, `555.123.4567`
pub fn phone() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| {
        Regex::new(r"(?:\+|\b)\d{1,3}[\s.\-]?\(?\d{2,3}\)?[\s.\-]?\d{3}[\s.\-]?\d{4}\b").unwrap()
    })
}

/// True when `placeholder` would be rewritten again by either PII pattern.
pub fn matches_pii(placeholder: &str) -> bool {
    email().is_match(placeholder) || phone().is_match(placeholder)
}

/// True when the placeholder starts or ends with a character either PII
/// pattern can extend through, so that it could fuse with surrounding text
/// (`REDACTED` turns `a@b@c` into `REDACTED@c`).
pub fn joins_adjacent_text(placeholder: &str) -> bool {
    let extends = |c: char| c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '+');
    placeholder.chars().next().is_some_and(extends)
        || placeholder.chars().next_back().is_some_and(extends)
}
