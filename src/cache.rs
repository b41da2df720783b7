// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Namespaced memoization cache with TTL and LRU eviction.
//!
//! Agents use it to remember the model's answer for a prompt they have
//! already sent, so a poll cycle whose inputs did not change does not pay for
//! another request. Expired entries are removed lazily when read, or in bulk
//! through [`TtlCache::cleanup`].

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

/// Default cache TTL (10 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// Default max entries per namespace.
const DEFAULT_MAX_ENTRIES: usize = 256;

/// Cache entry with timestamps.
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_accessed: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        let now = Instant::now();
        Self {
            value,
            inserted_at: now,
            last_accessed: now,
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }
}

type Namespace<V> = HashMap<String, CacheEntry<V>>;

/// Thread-safe, namespaced TTL cache.
pub struct TtlCache<V> {
    namespaces: RwLock<HashMap<String, Namespace<V>>>,
    ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache with default settings.
    pub fn new() -> Self {
        Self::with_config(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_config(ttl, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with custom TTL and per-namespace capacity.
    pub fn with_config(ttl: Duration, max_entries: usize) -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// The configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Build a stable key from arbitrary text parts.
    pub fn make_key(parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        let hash = format!("{:x}", hasher.finalize());
        hash[..32].to_string()
    }

    /// Get a value, removing it if it has outlived the TTL.
    pub fn get(&self, namespace: &str, key: &str) -> Option<V> {
        let mut namespaces = self.namespaces.write().ok()?;
        let entries = namespaces.get_mut(namespace)?;

        if let Some(entry) = entries.get_mut(key) {
            if entry.is_expired(self.ttl) {
                entries.remove(key);
                return None;
            }
            entry.last_accessed = Instant::now();
            return Some(entry.value.clone());
        }

        None
    }

    /// Insert or replace a value.
    pub fn set(&self, namespace: &str, key: impl Into<String>, value: V) {
        let mut namespaces = match self.namespaces.write() {
            Ok(n) => n,
            Err(_) => return,
        };

        let entries = namespaces.entry(namespace.to_string()).or_default();
        let key = key.into();
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            evict_oldest(entries, self.ttl, self.max_entries);
        }
        entries.insert(key, CacheEntry::new(value));
    }

    /// Remove expired entries from one namespace, or from all of them.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup(&self, namespace: Option<&str>) -> usize {
        let mut namespaces = match self.namespaces.write() {
            Ok(n) => n,
            Err(_) => return 0,
        };

        let ttl = self.ttl;
        let mut removed = 0;
        let mut sweep = |entries: &mut Namespace<V>| {
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(ttl));
            removed += before - entries.len();
        };

        match namespace {
            Some(name) => {
                if let Some(entries) = namespaces.get_mut(name) {
                    sweep(entries);
                }
            }
            None => namespaces.values_mut().for_each(&mut sweep),
        }

        namespaces.retain(|_, entries| !entries.is_empty());
        removed
    }

    /// Drop every entry in a namespace.
    pub fn clear_namespace(&self, namespace: &str) {
        if let Ok(mut namespaces) = self.namespaces.write() {
            namespaces.remove(namespace);
        }
    }

    /// Number of entries stored in a namespace, expired ones included.
    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .map(|n| n.get(namespace).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    /// Check whether a namespace holds no entries.
    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }

    /// Get cache statistics across all namespaces.
    pub fn stats(&self) -> CacheStats {
        let namespaces = match self.namespaces.read() {
            Ok(n) => n,
            Err(_) => return CacheStats::default(),
        };

        let total_entries = namespaces.values().map(HashMap::len).sum();
        let expired_entries = namespaces
            .values()
            .flat_map(HashMap::values)
            .filter(|e| e.is_expired(self.ttl))
            .count();

        CacheStats {
            namespaces: namespaces.len(),
            total_entries,
            expired_entries,
        }
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Evict expired entries, then the least recently used one if still full.
fn evict_oldest<V>(entries: &mut Namespace<V>, ttl: Duration, max_entries: usize) {
    entries.retain(|_, entry| !entry.is_expired(ttl));

    if entries.len() >= max_entries {
        if let Some(oldest_key) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(k, _)| k.clone())
        {
            entries.remove(&oldest_key);
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of non-empty namespaces.
    pub namespaces: usize,
    /// Total entries in cache.
    pub total_entries: usize,
    /// Number of expired entries not yet removed.
    pub expired_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_key_is_stable() {
        let key1 = TtlCache::<String>::make_key(&["management", "prompt"]);
        let key2 = TtlCache::<String>::make_key(&["management", "prompt"]);
        let key3 = TtlCache::<String>::make_key(&["management", "other"]);
        let key4 = TtlCache::<String>::make_key(&["managementprompt"]);

        assert_eq!(key1, key2, "Same inputs should produce same key");
        assert_ne!(key1, key3);
        assert_ne!(key1, key4, "Part boundaries should matter");
    }

    #[test]
    fn test_set_get() {
        let cache = TtlCache::new();
        cache.set("scores", "item-1", 42u32);
        assert_eq!(cache.get("scores", "item-1"), Some(42));
        assert_eq!(cache.get("scores", "item-2"), None);
        assert_eq!(cache.get("other", "item-1"), None);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let cache = TtlCache::new();
        cache.set("a", "k", "first".to_string());
        cache.set("b", "k", "second".to_string());
        assert_eq!(cache.get("a", "k").as_deref(), Some("first"));
        assert_eq!(cache.get("b", "k").as_deref(), Some("second"));

        cache.clear_namespace("a");
        assert_eq!(cache.get("a", "k"), None);
        assert_eq!(cache.get("b", "k").as_deref(), Some("second"));
    }

    #[test]
    fn test_expired_entry_removed_on_read() {
        let cache = TtlCache::with_ttl(Duration::from_millis(5));
        cache.set("scores", "item", 1u8);
        assert_eq!(cache.len("scores"), 1);

        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.get("scores", "item"), None, "Entry should have expired");
        assert_eq!(cache.len("scores"), 0, "Expired entry should be evicted");
    }

    #[test]
    fn test_cleanup_single_namespace() {
        let cache = TtlCache::with_ttl(Duration::from_millis(5));
        cache.set("a", "1", 1u8);
        cache.set("a", "2", 2u8);
        cache.set("b", "1", 3u8);

        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.cleanup(Some("a")), 2);
        assert!(cache.is_empty("a"));
        assert_eq!(cache.len("b"), 1);

        assert_eq!(cache.cleanup(None), 1);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_cleanup_keeps_fresh_entries() {
        let cache = TtlCache::new();
        cache.set("a", "1", 1u8);
        assert_eq!(cache.cleanup(None), 0);
        assert_eq!(cache.len("a"), 1);
    }

    #[test]
    fn test_eviction_at_capacity() {
        let cache = TtlCache::with_config(Duration::from_secs(3600), 3);
        for i in 0..5u32 {
            cache.set("ns", format!("key{i}"), i);
        }

        let stats = cache.stats();
        assert!(stats.total_entries <= 3, "Cache should have evicted entries");
        assert_eq!(cache.get("ns", "key4"), Some(4));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = TtlCache::with_config(Duration::from_secs(3600), 2);
        cache.set("ns", "a", 1u8);
        cache.set("ns", "b", 2u8);
        cache.set("ns", "a", 3u8);
        assert_eq!(cache.get("ns", "a"), Some(3));
        assert_eq!(cache.get("ns", "b"), Some(2));
    }
}
