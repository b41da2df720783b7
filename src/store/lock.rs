// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-document advisory locking with a bounded wait.
//!
//! Two layers guard a document: an async mutex shared by every task in this
//! process, and a `<document>.lock` file created with `create_new` so that
//! other processes working on the same mission directory serialise too. The
//! lock file holds the owner's pid and acquisition time; a lock file older
//! than the stale threshold is treated as abandoned and removed. A guard only
//! removes the lock file on drop while it still holds its own stamp.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::StoreError;

/// First backoff step while polling a held lock file.
const INITIAL_BACKOFF: Duration = Duration::from_millis(5);

/// Backoff ceiling while polling a held lock file.
const MAX_BACKOFF: Duration = Duration::from_millis(200);

/// Held lock on one document. Released on drop.
#[derive(Debug)]
pub struct DocumentLock {
    path: PathBuf,
    stamp: String,
    _guard: OwnedMutexGuard<()>,
}

impl DocumentLock {
    /// Path of the lock file backing this guard.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        // Another process may have broken our lock as stale and taken its own.
        match std::fs::read_to_string(&self.path) {
            Ok(owner) if owner == self.stamp => {}
            Ok(_) => {
                warn!(path = %self.path.display(), "Lock file taken over by another owner, leaving it");
                return;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read lock file");
                return;
            }
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove lock file");
            }
        }
    }
}

/// Lock file path for a document file.
pub fn lock_path_for(document_path: &Path) -> PathBuf {
    let mut name = document_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    document_path.with_file_name(name)
}

/// Acquire both lock layers for `document`, waiting at most `timeout`.
pub async fn acquire(
    document: &str,
    mutex: Arc<Mutex<()>>,
    lock_path: PathBuf,
    timeout: Duration,
    stale_after: Duration,
) -> Result<DocumentLock, StoreError> {
    let deadline = Instant::now() + timeout;
    let timed_out = || StoreError::LockTimeout {
        document: document.to_string(),
        timeout,
    };

    let guard = tokio::time::timeout_at(deadline, mutex.lock_owned())
        .await
        .map_err(|_| timed_out())?;

    let mut backoff = INITIAL_BACKOFF;
    loop {
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .await
        {
            Ok(mut file) => {
                let stamp = format!(
                    "{} {}\n",
                    std::process::id(),
                    chrono::Utc::now().to_rfc3339()
                );
                let written = file.write_all(stamp.as_bytes()).await;
                if let Err(e) = written.and(file.flush().await) {
                    let _ = tokio::fs::remove_file(&lock_path).await;
                    return Err(StoreError::Io(e));
                }
                debug!(document, path = %lock_path.display(), "Lock acquired");
                return Ok(DocumentLock {
                    path: lock_path,
                    stamp,
                    _guard: guard,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if is_stale(&lock_path, stale_after).await {
                    warn!(document, path = %lock_path.display(), "Removing stale lock file");
                    let _ = tokio::fs::remove_file(&lock_path).await;
                    continue;
                }

                let now = Instant::now();
                if now >= deadline {
                    return Err(timed_out());
                }
                tokio::time::sleep(backoff.min(deadline - now)).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(e) => return Err(StoreError::Io(e)),
        }
    }
}

async fn is_stale(lock_path: &Path, stale_after: Duration) -> bool {
    let modified = match tokio::fs::metadata(lock_path).await.and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => return false,
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > stale_after)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_for() {
        let path = lock_path_for(Path::new("/missions/alpha/management.md"));
        assert_eq!(path, PathBuf::from("/missions/alpha/management.md.lock"));
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("doc.md.lock");
        let mutex = Arc::new(Mutex::new(()));

        let lock = acquire(
            "doc",
            mutex.clone(),
            lock_path.clone(),
            Duration::from_secs(1),
            Duration::from_secs(60),
        )
        .await
        .unwrap();
        assert!(lock_path.exists());
        assert_eq!(lock.path(), lock_path.as_path());

        drop(lock);
        assert!(!lock_path.exists());
    }

    #[tokio::test]
    async fn test_drop_leaves_lock_taken_over_by_another_owner() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("doc.md.lock");

        let lock = acquire(
            "doc",
            Arc::new(Mutex::new(())),
            lock_path.clone(),
            Duration::from_secs(1),
            Duration::from_secs(60),
        )
        .await
        .unwrap();
        let ours = std::fs::read_to_string(&lock_path).unwrap();
        assert!(ours.starts_with(&std::process::id().to_string()));

        // Simulate another process breaking our lock and taking its own.
        std::fs::write(&lock_path, "4242 2026-01-01T00:00:00+00:00\n").unwrap();
        drop(lock);

        assert_eq!(
            std::fs::read_to_string(&lock_path).unwrap(),
            "4242 2026-01-01T00:00:00+00:00\n"
        );
    }

    #[tokio::test]
    async fn test_foreign_lock_file_times_out() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("doc.md.lock");
        std::fs::write(&lock_path, "other process").unwrap();

        let result = acquire(
            "doc",
            Arc::new(Mutex::new(())),
            lock_path.clone(),
            Duration::from_millis(50),
            Duration::from_secs(60),
        )
        .await;

        assert!(matches!(result, Err(StoreError::LockTimeout { .. })));
        assert!(lock_path.exists(), "Foreign lock must be left in place");
    }

    #[tokio::test]
    async fn test_stale_lock_file_is_broken() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("doc.md.lock");
        std::fs::write(&lock_path, "crashed process").unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let lock = acquire(
            "doc",
            Arc::new(Mutex::new(())),
            lock_path.clone(),
            Duration::from_secs(1),
            Duration::from_millis(10),
        )
        .await;

        assert!(lock.is_ok());
    }

    #[tokio::test]
    async fn test_in_process_contention_times_out() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("doc.md.lock");
        let mutex = Arc::new(Mutex::new(()));

        let _held = acquire(
            "doc",
            mutex.clone(),
            lock_path.clone(),
            Duration::from_secs(1),
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        let second = acquire(
            "doc",
            mutex,
            lock_path,
            Duration::from_millis(30),
            Duration::from_secs(60),
        )
        .await;
        assert!(second.unwrap_err().is_lock_timeout());
    }
}
