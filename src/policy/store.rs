// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Active policy snapshot with atomic replace-on-reload

use arc_swap::ArcSwap;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::document::PolicyDocument;
use super::errors::{PolicyLoadError, WatchError};

/// Holds the active `PolicyDocument`.
///
/// Readers call `current()` and keep the returned `Arc` for the whole
/// request, so an in-flight request never observes a mix of two documents.
/// Reloads build a complete new document and swap the pointer.
pub struct PolicyStore {
    path: Option<PathBuf>,
    current: ArcSwap<PolicyDocument>,
    reload_count: AtomicU64,
}

/// File watcher driving hot reload. Dropping it stops the reloads.
pub struct PolicyWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for PolicyWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl PolicyStore {
    /// Store serving a fixed document with no backing file
    pub fn from_document(document: PolicyDocument) -> Self {
        Self {
            path: None,
            current: ArcSwap::from_pointee(document),
            reload_count: AtomicU64::new(0),
        }
    }

    /// Load the policy at `path`.
    ///
    /// A missing file at startup puts the store in the degraded "no policy"
    /// mode; an unreadable or invalid file is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PolicyLoadError> {
        let path = path.into();
        let document = if path.exists() {
            Self::read(&path)?
        } else {
            warn!(
                policy_path = %path.display(),
                "Policy file not found; safety checks disabled"
            );
            PolicyDocument::unavailable()
        };
        Ok(Self {
            path: Some(path),
            current: ArcSwap::from_pointee(document),
            reload_count: AtomicU64::new(0),
        })
    }

    fn read(path: &Path) -> Result<PolicyDocument, PolicyLoadError> {
        let document = PolicyDocument::load(path)?;
        info!(
            policy_path = %path.display(),
            version = %document.version,
            blocked_terms = document.blocked_terms.len(),
            sanitize_rules = document.sanitize_rules.len(),
            "Loaded safety policy"
        );
        Ok(document)
    }

    /// The active snapshot. Never blocks.
    pub fn current(&self) -> Arc<PolicyDocument> {
        self.current.load_full()
    }

    pub fn version(&self) -> String {
        self.current.load().version.clone()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn reload_count(&self) -> u64 {
        self.reload_count.load(Ordering::Relaxed)
    }

    /// Re-read the backing file and swap it in.
    ///
    /// On failure the previous snapshot stays active. A file that has gone
    /// missing is a failure too; only `open` enters the degraded mode.
    pub fn reload(&self) -> Result<Arc<PolicyDocument>, PolicyLoadError> {
        let Some(path) = self.path.as_deref() else {
            debug!("Policy store has no backing file; reload is a no-op");
            return Ok(self.current());
        };

        let document = match Self::read(path) {
            Ok(document) => Arc::new(document),
            Err(e) => {
                error!(
                    policy_path = %path.display(),
                    error = %e,
                    active_version = %self.version(),
                    "Policy reload rejected; keeping active policy"
                );
                return Err(e);
            }
        };

        let previous = self.current.swap(document.clone());
        self.reload_count.fetch_add(1, Ordering::Relaxed);
        info!(
            previous_version = %previous.version,
            version = %document.version,
            "Policy reloaded"
        );
        Ok(document)
    }

    /// Watch the backing file and reload once changes have been quiet for
    /// `settle`.
    ///
    /// The parent directory is watched so that editors which save by
    /// renaming a temporary file over the policy are picked up as well.
    pub fn spawn_watcher(self: &Arc<Self>, settle: Duration) -> Result<PolicyWatcher, WatchError> {
        let path = self.path.clone().ok_or(WatchError::NoBackingFile)?;
        let file_name = path.file_name().map(|name| name.to_os_string());
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    if event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == file_name.as_deref())
                    {
                        let _ = tx.send(());
                    }
                }
                Err(e) => warn!(error = %e, "Policy watch error"),
            }
        })
        .map_err(|source| WatchError::Notify {
            path: dir.clone(),
            source,
        })?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Notify {
                path: dir.clone(),
                source,
            })?;

        let store = Arc::clone(self);
        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                tokio::time::sleep(settle).await;
                // Events queued so far are covered by the read below; later
                // ones trigger another pass
                while rx.try_recv().is_ok() {}
                // Failures are logged by reload
                let _ = store.reload();
            }
        });

        info!(policy_path = %path.display(), "Watching policy file for changes");
        Ok(PolicyWatcher {
            _watcher: watcher,
            task,
        })
    }
}
