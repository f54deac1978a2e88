// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Versioned safety and access policy with hot reload

pub mod document;
pub mod errors;
pub mod store;

pub use document::{
    PolicyDocument, PolicyFormat, RedactionPlaceholders, SanitizeRule, UNAVAILABLE_VERSION,
    UNKNOWN_VERSION,
};
pub use errors::{ConfigError, PolicyLoadError, WatchError};
pub use store::{PolicyStore, PolicyWatcher};
