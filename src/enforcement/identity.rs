// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use sha2::{Digest, Sha256};
use std::fmt;

/// Caller attribution for rate limiting and audit.
///
/// Raw API keys never leave this type: logs, audit lines and shared counter
/// keys use `fingerprint()`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    ApiKey(String),
    Origin(String),
}

impl Identity {
    /// API key when one was presented, otherwise the network origin
    pub fn from_request(api_key: Option<&str>, origin: &str) -> Self {
        match api_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => Identity::ApiKey(key.to_string()),
            None => Identity::Origin(origin.to_string()),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        match self {
            Identity::ApiKey(key) => Some(key),
            Identity::Origin(_) => None,
        }
    }

    /// Stable, non-reversible label: `key:<16 hex>` or `origin:<addr>`
    pub fn fingerprint(&self) -> String {
        match self {
            Identity::ApiKey(key) => {
                let digest = Sha256::digest(key.as_bytes());
                format!("key:{}", hex::encode(&digest[..8]))
            }
            Identity::Origin(origin) => format!("origin:{}", origin),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.fingerprint())
    }
}
