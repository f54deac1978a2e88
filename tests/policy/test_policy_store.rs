// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Policy loading and hot reload
//!
//! These tests verify that:
//! - YAML and TOML documents load with documented defaults
//! - Malformed or invalid documents are rejected wholesale
//! - A deleted policy file never switches safety checks off
//! - The file watcher swaps in edits without a restart, including the last
//!   of a burst and rename-style saves
//! - Readers never observe a half-applied document

use llm_policy_gateway::policy::{ConfigError, PolicyDocument, PolicyLoadError, PolicyStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_yaml_document_with_camel_case_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "policy.yaml",
        r#"
version: "2024-05"
safety:
  blockedTerms: ["Bomb", "bomb", "  ", "virus"]
  sanitizeRules:
    - pattern: "secret"
  redactPII: true
  maxOutputLength: 42
api:
  allowedApiKeys: ["k1", "k2"]
  rateLimit:
    requestsPerWindow: 5
logging:
  level: DEBUG
"#,
    );

    let document = PolicyDocument::load(&path).unwrap();

    assert_eq!(document.version, "2024-05");
    assert_eq!(document.blocked_terms, vec!["bomb", "virus"]);
    assert_eq!(document.sanitize_rules.len(), 1);
    assert_eq!(document.sanitize_rules[0].replacement, "[removed]");
    assert_eq!(document.max_output_length, 42);
    assert!(document.requires_api_key());
    assert!(document.is_key_allowed("k2"));
    assert!(!document.is_key_allowed("k3"));
    assert_eq!(document.rate_limit.requests_per_window, 5);
    assert_eq!(document.rate_limit.window_seconds, 60);
    assert_eq!(document.log_level.as_deref(), Some("DEBUG"));
}

#[test]
fn test_toml_document_with_snake_case_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "policy.toml",
        r#"
version = 3

[rules]
blocked_terms = ["phishing"]
allow_html = true
paraphrase_enabled = true
paraphrase_hint = "Rephrase."

[api.rate_limit]
requests_per_window = 100
window_seconds = 10
"#,
    );

    let document = PolicyDocument::load(&path).unwrap();

    assert_eq!(document.version, "3");
    assert_eq!(document.blocked_terms, vec!["phishing"]);
    assert!(document.allow_html);
    assert!(document.paraphrase_enabled);
    assert!(!document.requires_api_key());
    assert_eq!(document.rate_limit.window_seconds, 10);
}

#[test]
fn test_defaults_when_fields_missing() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "policy.yaml", "version: minimal\n");

    let document = PolicyDocument::load(&path).unwrap();

    assert_eq!(document.max_output_length, 500);
    assert!(document.redact_pii);
    assert!(!document.allow_html);
    assert!(!document.allow_blocked_terms_in_output);
    assert!(!document.block_flagged_input);
    assert_eq!(document.rate_limit.requests_per_window, 60);
    assert_eq!(document.rate_limit.window_seconds, 60);
    assert_eq!(document.redaction.email, "[EMAIL REDACTED]");
    assert_eq!(document.redaction.phone, "[PHONE REDACTED]");
}

#[test]
fn test_malformed_document_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "policy.yaml", "rules: [unterminated\n");

    match PolicyDocument::load(&path) {
        Err(PolicyLoadError::Malformed { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected malformed error, got {:?}", other),
    }
}

#[test]
fn test_bad_regex_rejects_whole_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "policy.yaml",
        "rules:\n  sanitizeRules:\n    - pattern: \"ok\"\n    - pattern: \"(broken\"\n",
    );

    match PolicyDocument::load(&path) {
        Err(PolicyLoadError::Invalid(ConfigError::InvalidPattern { index, .. })) => {
            assert_eq!(index, 1)
        }
        other => panic!("expected invalid pattern, got {:?}", other),
    }
}

#[test]
fn test_zero_rate_limit_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "policy.yaml",
        "api:\n  rateLimit:\n    windowSeconds: 0\n",
    );

    assert!(matches!(
        PolicyDocument::load(&path),
        Err(PolicyLoadError::Invalid(ConfigError::InvalidRateLimit(_)))
    ));
}

#[test]
fn test_failed_reload_keeps_active_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "policy.yaml", "version: stable\n");
    let store = PolicyStore::open(&path).unwrap();

    std::fs::write(&path, "version: broken\nrules:\n  maxOutputLength: 0\n").unwrap();
    assert!(store.reload().is_err());
    assert_eq!(store.version(), "stable");
    assert_eq!(store.reload_count(), 0);
}

#[test]
fn test_removed_file_keeps_active_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "policy.yaml",
        "version: present\nrules:\n  blockedTerms: [\"bomb\"]\n",
    );
    let store = PolicyStore::open(&path).unwrap();

    std::fs::remove_file(&path).unwrap();

    assert!(matches!(
        store.reload(),
        Err(PolicyLoadError::Unreadable { .. })
    ));
    let document = store.current();
    assert!(!document.is_degraded());
    assert_eq!(store.version(), "present");
    assert_eq!(document.blocked_terms, vec!["bomb"]);
}

async fn wait_for_version(store: &PolicyStore, version: &str) -> bool {
    for _ in 0..100 {
        if store.version() == version {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

#[tokio::test]
async fn test_watcher_applies_edits() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "policy.yaml", "version: before\n");
    let store = Arc::new(PolicyStore::open(&path).unwrap());
    let _watcher = store.spawn_watcher(Duration::from_millis(25)).unwrap();

    std::fs::write(&path, "version: after\nrules:\n  blockedTerms: [\"new\"]\n").unwrap();

    assert!(
        wait_for_version(&store, "after").await,
        "watcher did not pick up the edit"
    );
    assert_eq!(store.current().blocked_terms, vec!["new"]);
    assert!(store.reload_count() >= 1);
}

#[tokio::test]
async fn test_watcher_applies_last_of_rapid_edits() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "policy.yaml", "version: v0\n");
    let store = Arc::new(PolicyStore::open(&path).unwrap());
    let _watcher = store.spawn_watcher(Duration::from_millis(10)).unwrap();

    // Edits keep landing while earlier reloads are in progress
    for n in 1..=15 {
        std::fs::write(&path, format!("version: v{n}\n")).unwrap();
        tokio::time::sleep(Duration::from_millis(7)).await;
    }

    assert!(
        wait_for_version(&store, "v15").await,
        "last edit was never applied, active version {}",
        store.version()
    );
}

#[tokio::test]
async fn test_watcher_follows_rename_over_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "policy.yaml", "version: original\n");
    let store = Arc::new(PolicyStore::open(&path).unwrap());
    let _watcher = store.spawn_watcher(Duration::from_millis(25)).unwrap();

    let staged = write(&dir, "policy.yaml.tmp", "version: renamed\n");
    std::fs::rename(&staged, &path).unwrap();

    assert!(wait_for_version(&store, "renamed").await);
    assert!(!store.current().is_degraded());
}

#[tokio::test]
async fn test_watcher_loads_file_created_after_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.yaml");
    let store = Arc::new(PolicyStore::open(&path).unwrap());
    assert!(store.current().is_degraded());
    let _watcher = store.spawn_watcher(Duration::from_millis(25)).unwrap();

    std::fs::write(&path, "version: late\n").unwrap();

    assert!(wait_for_version(&store, "late").await);
    assert!(!store.current().is_degraded());
}

#[tokio::test]
async fn test_dropped_watcher_stops_reloading() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "policy.yaml", "version: kept\n");
    let store = Arc::new(PolicyStore::open(&path).unwrap());
    let watcher = store.spawn_watcher(Duration::from_millis(10)).unwrap();
    drop(watcher);

    std::fs::write(&path, "version: ignored\n").unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(store.version(), "kept");
    assert_eq!(store.reload_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_torn_documents() {
    let dir = tempfile::tempdir().unwrap();
    let body = |n: u32| format!("version: v{n}\nrules:\n  blockedTerms: [\"term{n}\"]\n");
    let path = write(&dir, "policy.yaml", &body(0));
    let store = Arc::new(PolicyStore::open(&path).unwrap());

    let mut readers = Vec::new();
    for _ in 0..4 {
        let store = Arc::clone(&store);
        readers.push(tokio::spawn(async move {
            for _ in 0..500 {
                let document = store.current();
                let suffix = document.version.trim_start_matches('v');
                assert_eq!(document.blocked_terms, vec![format!("term{}", suffix)]);
                tokio::task::yield_now().await;
            }
        }));
    }

    for n in 1..=20 {
        std::fs::write(&path, body(n)).unwrap();
        store.reload().unwrap();
        tokio::task::yield_now().await;
    }

    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(store.version(), "v20");
}
