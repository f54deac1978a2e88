// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for policy loading and validation

use std::path::PathBuf;
use thiserror::Error;

/// A policy document that parsed but cannot be applied.
///
/// Raised at load time so a bad document is rejected wholesale instead of
/// silently skipping one rule per request.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A sanitize rule pattern failed to compile
    #[error("Invalid sanitize pattern #{index} '{pattern}': {source}")]
    InvalidPattern {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Rate-limit parameters outside the accepted range
    #[error("Invalid rate limit: {0}")]
    InvalidRateLimit(String),

    /// A redaction placeholder that would be re-matched by a redaction pattern
    #[error("Redaction placeholder for {kind} '{placeholder}' matches a PII pattern")]
    SelfMatchingPlaceholder { kind: String, placeholder: String },

    /// A redaction placeholder that could merge with neighbouring text into
    /// a new PII match
    #[error(
        "Redaction placeholder for {kind} '{placeholder}' must not start or end with a letter, digit, '.', '-', '_' or '+'"
    )]
    UnboundedPlaceholder { kind: String, placeholder: String },

    /// Output length ceiling of zero
    #[error("max_output_length must be greater than 0")]
    InvalidMaxOutputLength,
}

/// Errors returned by `PolicyDocument::load` and `PolicyStore::reload`
#[derive(Debug, Error)]
pub enum PolicyLoadError {
    /// Source exists but could not be read
    #[error("Failed to read policy file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source could not be parsed as a policy document
    #[error("Malformed policy document {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    /// Document parsed but failed validation
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Errors returned by `PolicyStore::spawn_watcher`
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Policy store has no backing file to watch")]
    NoBackingFile,

    #[error("Failed to watch {path}: {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}
