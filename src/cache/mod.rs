//! # Plaintext LRU Cache
//!
//! Bounded per-process cache of decrypted entity payloads, keyed by
//! `(database, entity_key)`. Both lookups and inserts count as uses, so
//! eviction is strict least-recently-used. Coherence with disk comes from
//! the write pipeline's ordering (file lock → rename → cache publish), not
//! from any TTL; contents are lost on process exit by design.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

/// Default maximum entry count.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Cache address of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub database: String,
    pub entity_key: String,
}

impl CacheKey {
    pub fn new(database: impl Into<String>, entity_key: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            entity_key: entity_key.into(),
        }
    }
}

/// A cached plaintext and the version it corresponds to on disk.
#[derive(Debug, Clone)]
pub struct CachedEntity {
    pub plaintext: Arc<Vec<u8>>,
    pub version: u64,
}

/// Concurrent bounded LRU of decrypted entities.
pub struct EntityCache {
    entries: Mutex<LruCache<CacheKey, CachedEntity>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EntityCache {
    /// Cache bounded to `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Look up an entity, refreshing its recency on hit.
    pub fn get(&self, database: &str, entity_key: &str) -> Option<CachedEntity> {
        let key = CacheKey::new(database, entity_key);
        let found = self.entries.lock().get(&key).cloned();
        match &found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Publish a just-written or just-read `(plaintext, version)`.
    ///
    /// Writers call this while still holding the entity's file lock so the
    /// cache can never run ahead of (or behind) the renamed files.
    pub fn put(&self, database: &str, entity_key: &str, plaintext: Vec<u8>, version: u64) {
        let key = CacheKey::new(database, entity_key);
        let entry = CachedEntity {
            plaintext: Arc::new(plaintext),
            version,
        };
        self.entries.lock().put(key, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` since startup.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_roundtrip() {
        let cache = EntityCache::new();
        cache.put("chatdb", "Chat_id", b"plaintext".to_vec(), 3);
        let entry = cache.get("chatdb", "Chat_id").unwrap();
        assert_eq!(entry.plaintext.as_slice(), b"plaintext");
        assert_eq!(entry.version, 3);
    }

    #[test]
    fn test_miss_on_absent_key() {
        let cache = EntityCache::new();
        assert!(cache.get("chatdb", "absent").is_none());
        assert_eq!(cache.stats(), (0, 1));
    }

    #[test]
    fn test_eviction_is_strict_lru() {
        let cache = EntityCache::with_capacity(2);
        cache.put("db", "a", b"a".to_vec(), 1);
        cache.put("db", "b", b"b".to_vec(), 1);
        cache.put("db", "c", b"c".to_vec(), 1);

        assert!(cache.get("db", "a").is_none(), "oldest entry must be evicted");
        assert!(cache.get("db", "b").is_some());
        assert!(cache.get("db", "c").is_some());
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = EntityCache::with_capacity(2);
        cache.put("db", "a", b"a".to_vec(), 1);
        cache.put("db", "b", b"b".to_vec(), 1);

        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get("db", "a").is_some());
        cache.put("db", "c", b"c".to_vec(), 1);

        assert!(cache.get("db", "a").is_some());
        assert!(cache.get("db", "b").is_none());
    }

    #[test]
    fn test_put_replaces_version() {
        let cache = EntityCache::new();
        cache.put("db", "k", b"v1".to_vec(), 1);
        cache.put("db", "k", b"v2".to_vec(), 2);
        let entry = cache.get("db", "k").unwrap();
        assert_eq!(entry.plaintext.as_slice(), b"v2");
        assert_eq!(entry.version, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_hit_miss_counters() {
        let cache = EntityCache::new();
        cache.put("db", "k", b"v".to_vec(), 1);
        let _ = cache.get("db", "k");
        let _ = cache.get("db", "k");
        let _ = cache.get("db", "other");
        assert_eq!(cache.stats(), (2, 1));
    }

    #[test]
    fn test_databases_do_not_collide() {
        let cache = EntityCache::new();
        cache.put("db1", "k", b"one".to_vec(), 1);
        cache.put("db2", "k", b"two".to_vec(), 1);
        assert_eq!(cache.get("db1", "k").unwrap().plaintext.as_slice(), b"one");
        assert_eq!(cache.get("db2", "k").unwrap().plaintext.as_slice(), b"two");
    }
}
