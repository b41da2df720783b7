// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Locked read/write access to a mission's documents.
//!
//! [`DocumentStore`] is the one place where document bytes are read and
//! written. Its contract:
//!
//! - `read` never fails on a fresh mission: a missing document is created
//!   from its default template.
//! - `write` is a no-op returning `true` when the text is unchanged, so
//!   repeated identical proposals never wake observers.
//! - Changed text is written under the document's lock, to a temp file that
//!   is renamed over the original, then every change listener receives the
//!   exact text written.
//! - Lock acquisition is bounded; on timeout `write` returns `false`.
//!
//! Writers to the same document serialise on its lock. Writers to different
//! documents never coordinate.

mod lock;
mod mission;
pub mod templates;

pub use lock::{lock_path_for, DocumentLock};
pub use mission::Missions;
pub use templates::{default_template, is_placeholder, PLACEHOLDER, REQUIRED_DOCUMENTS};

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::error::StoreError;
use crate::mutation::MutationResult;

/// File extension of persisted documents.
pub const DOCUMENT_EXTENSION: &str = "md";

/// Default bound on lock acquisition.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default age after which a lock file is considered abandoned.
pub const DEFAULT_STALE_LOCK_AFTER: Duration = Duration::from_secs(60);

/// Observer invoked with `(document_name, full_new_text)` after each write.
pub type ChangeListener = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Tuning for a [`DocumentStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long a writer waits for a document lock.
    pub lock_timeout: Duration,
    /// Lock files older than this are removed as abandoned.
    pub stale_lock_after: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            stale_lock_after: DEFAULT_STALE_LOCK_AFTER,
        }
    }
}

impl StoreOptions {
    /// Set the lock timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set the stale lock threshold.
    pub fn with_stale_lock_after(mut self, after: Duration) -> Self {
        self.stale_lock_after = after;
        self
    }
}

/// Counters describing what a store has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Physical writes performed.
    pub writes: u64,
    /// Writes skipped because the text was unchanged.
    pub unchanged: u64,
    /// Writes refused because the lock could not be acquired.
    pub lock_timeouts: u64,
    /// Writes that failed on I/O.
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    writes: AtomicU64,
    unchanged: AtomicU64,
    lock_timeouts: AtomicU64,
    failures: AtomicU64,
}

/// Document access for one mission directory.
pub struct DocumentStore {
    root: PathBuf,
    options: StoreOptions,
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    listeners: RwLock<Vec<ChangeListener>>,
    counters: Counters,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("root", &self.root)
            .field("options", &self.options)
            .field("listeners", &self.listeners.read().map(|l| l.len()).unwrap_or(0))
            .finish()
    }
}

impl DocumentStore {
    /// Create a store over `root` with default options.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_options(root, StoreOptions::default())
    }

    /// Create a store over `root`.
    pub fn with_options(root: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self {
            root: root.into(),
            options,
            locks: std::sync::Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            counters: Counters::default(),
        }
    }

    /// The mission directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The store's options.
    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Path of a document on disk.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.root.join(format!("{name}.{DOCUMENT_EXTENSION}")))
    }

    /// Register a change listener.
    pub fn subscribe(&self, listener: ChangeListener) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(listener);
        }
    }

    /// Snapshot of the store's counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            writes: self.counters.writes.load(Ordering::Relaxed),
            unchanged: self.counters.unchanged.load(Ordering::Relaxed),
            lock_timeouts: self.counters.lock_timeouts.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Read a document, materialising its default template if it is missing.
    pub async fn read(&self, name: &str) -> Result<String, StoreError> {
        let path = self.path_for(name)?;
        if let Some(text) = read_optional(&path).await? {
            return Ok(text);
        }

        let template = default_template(name);
        match self.lock(name).await {
            Ok(_lock) => {
                // Another writer may have created it while we waited.
                if let Some(text) = read_optional(&path).await? {
                    return Ok(text);
                }
                persist_atomic(&self.root, &path, &template).await?;
                debug!(document = name, "Materialised default template");
            }
            Err(e) => {
                warn!(document = name, error = %e, "Could not persist default template");
            }
        }
        Ok(template)
    }

    /// Persist `text` as the new content of `name`.
    ///
    /// Returns `true` when the document holds `text` afterwards, `false` when
    /// the lock could not be acquired in time or the write failed. Never
    /// returns an error.
    pub async fn write(&self, name: &str, text: &str) -> bool {
        let path = match self.path_for(name) {
            Ok(path) => path,
            Err(e) => {
                error!(document = name, error = %e, "✗ Refusing write");
                return false;
            }
        };

        match read_optional(&path).await {
            Ok(Some(current)) if current == text => {
                self.counters.unchanged.fetch_add(1, Ordering::Relaxed);
                debug!(document = name, "Content unchanged, skipping write");
                return true;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(document = name, error = %e, "Could not read current content before write");
            }
        }

        #[cfg(feature = "telemetry")]
        let start = std::time::Instant::now();

        let lock = match self.lock(name).await {
            Ok(lock) => lock,
            Err(e) => {
                self.counters.lock_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(document = name, error = %e, "⚠ Write rejected");
                return false;
            }
        };

        if let Err(e) = persist_atomic(&self.root, &path, text).await {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            error!(document = name, error = %e, "✗ Write failed");
            return false;
        }
        drop(lock);

        self.counters.writes.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("store.write", start.elapsed());

        info!(document = name, bytes = text.len(), "✓ Document written");
        self.notify(name, text);
        true
    }

    /// Read-modify-write a document under its lock.
    ///
    /// `mutate` receives the current text. When it reports success with
    /// different content, that content is persisted and listeners notified.
    /// The mutation result is returned either way.
    pub async fn update<F>(&self, name: &str, mutate: F) -> Result<MutationResult, StoreError>
    where
        F: FnOnce(&str) -> MutationResult,
    {
        let path = self.path_for(name)?;
        let lock = self.lock(name).await.inspect_err(|e| {
            if e.is_lock_timeout() {
                self.counters.lock_timeouts.fetch_add(1, Ordering::Relaxed);
            }
        })?;

        let current = match read_optional(&path).await? {
            Some(text) => text,
            None => default_template(name),
        };

        let result = mutate(&current);
        let changed = match result.new_content.as_deref() {
            Some(new_content) if result.success && new_content != current => {
                persist_atomic(&self.root, &path, new_content)
                    .await
                    .inspect_err(|_| {
                        self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    })?;
                Some(new_content.to_string())
            }
            _ => None,
        };
        drop(lock);

        if let Some(new_content) = changed {
            self.counters.writes.fetch_add(1, Ordering::Relaxed);
            self.notify(name, &new_content);
        }
        Ok(result)
    }

    /// Names of documents present on disk, sorted.
    pub async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn lock(&self, name: &str) -> Result<DocumentLock, StoreError> {
        let path = self.path_for(name)?;
        let mutex = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock::acquire(
            name,
            mutex,
            lock_path_for(&path),
            self.options.lock_timeout,
            self.options.stale_lock_after,
        )
        .await
    }

    fn notify(&self, name: &str, text: &str) {
        let listeners: Vec<ChangeListener> = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return,
        };
        for listener in listeners {
            listener(name, text);
        }
    }
}

/// Check that a document or mission name is a single safe path component.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `text` to a temp file in `dir`, then rename it over `path`.
async fn persist_atomic(dir: &Path, path: &Path, text: &str) -> Result<(), StoreError> {
    let dir = dir.to_path_buf();
    let path = path.to_path_buf();
    let text = text.to_string();

    tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
        std::fs::create_dir_all(&dir)?;
        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        file.write_all(text.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&path)?;
        Ok(())
    })
    .await
    .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    use crate::mutation::{add_to_section, InsertPosition};

    fn counting_listener(store: &DocumentStore) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        store.subscribe(Arc::new(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        count
    }

    #[tokio::test]
    async fn test_read_materialises_template() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::new(temp.path());

        let text = store.read("management").await.unwrap();
        assert_eq!(text, default_template("management"));
        assert!(temp.path().join("management.md").exists());
    }

    #[tokio::test]
    async fn test_read_existing() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("production.md"), "# Content\nhello\n").unwrap();
        let store = DocumentStore::new(temp.path());
        assert_eq!(store.read("production").await.unwrap(), "# Content\nhello\n");
    }

    #[tokio::test]
    async fn test_invalid_names_rejected() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::new(temp.path());
        assert!(matches!(store.read("../etc").await, Err(StoreError::InvalidName(_))));
        assert!(!store.write("a/b", "x").await);
        assert!(validate_name("activity-log").is_ok());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("").is_err());
    }

    #[tokio::test]
    async fn test_write_notifies_with_exact_text() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::new(temp.path());
        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = received.clone();
        store.subscribe(Arc::new(move |name, text| {
            sink.lock().unwrap().push((name.to_string(), text.to_string()));
        }));

        assert!(store.write("production", "# Content\nv1\n").await);

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], ("production".to_string(), "# Content\nv1\n".to_string()));
    }

    #[tokio::test]
    async fn test_identical_write_is_noop() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::new(temp.path());
        let notifications = counting_listener(&store);

        assert!(store.write("evaluation", "# Assessment\ngood\n").await);
        assert!(store.write("evaluation", "# Assessment\ngood\n").await);

        let stats = store.stats();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.unchanged, 1);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lock_timeout_returns_false_and_preserves_content() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::with_options(
            temp.path(),
            StoreOptions::default().with_lock_timeout(Duration::from_millis(50)),
        );
        assert!(store.write("production", "# Content\noriginal\n").await);
        let notifications = counting_listener(&store);

        // Simulate another process holding the lock.
        let lock_file = lock_path_for(&store.path_for("production").unwrap());
        std::fs::write(&lock_file, "4242").unwrap();

        assert!(!store.write("production", "# Content\nclobbered\n").await);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("production.md")).unwrap(),
            "# Content\noriginal\n"
        );
        assert_eq!(store.stats().lock_timeouts, 1);
        assert_eq!(notifications.load(Ordering::SeqCst), 0);

        std::fs::remove_file(&lock_file).unwrap();
        assert!(store.write("production", "# Content\nnext\n").await);
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::new(temp.path());
        assert!(store.write("request", "# Request\nbuild a thing\n").await);

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| name != "request.md")
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
    }

    #[tokio::test]
    async fn test_update_appends_under_lock() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::new(temp.path());
        let notifications = counting_listener(&store);

        let result = store
            .update("activity-log", |text| {
                add_to_section(text, "Entries", "- first", InsertPosition::End)
            })
            .await
            .unwrap();
        assert!(result.success);

        let text = store.read("activity-log").await.unwrap();
        assert_eq!(text, "# Entries\n- first\n");
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_failed_mutation_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::new(temp.path());

        let result = store
            .update("activity-log", |text| {
                add_to_section(text, "Missing", "- x", InsertPosition::End)
            })
            .await
            .unwrap();
        assert!(result.is_not_found());
        assert_eq!(store.stats().writes, 0);
    }

    #[tokio::test]
    async fn test_list_documents() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::new(temp.path());
        store.read("production").await.unwrap();
        store.read("evaluation").await.unwrap();
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["evaluation", "production"]);
    }
}
