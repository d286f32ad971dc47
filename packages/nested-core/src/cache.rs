//! # Object Cache
//!
//! Read-through blob cache in front of places and accounts.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CACHE DISCIPLINE                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  read:   get(key) ──hit──► decode blob                                 │
//! │                   └─miss─► load row ──► put(key, blob, ttl)             │
//! │                                                                         │
//! │  write:  commit transaction ──► invalidate(key)                        │
//! │                                                                         │
//! │  Writers never patch a cached blob. The next read reloads the entity.  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use crate::account::AccountId;
use crate::place::PlaceId;

/// Cache key, namespaced by entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A place blob
    Place(PlaceId),
    /// An account blob
    Account(AccountId),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Place(id) => write!(f, "place:{}", id),
            CacheKey::Account(id) => write!(f, "account:{}", id),
        }
    }
}

/// Key-value cache collaborator.
pub trait Cache: Send + Sync {
    /// Fetch a blob, `None` on miss or expiry.
    fn get(&self, key: &CacheKey) -> Option<Vec<u8>>;

    /// Store a blob for `ttl`.
    fn put(&self, key: &CacheKey, blob: Vec<u8>, ttl: Duration);

    /// Drop an entry. Dropping a missing key is a no-op.
    fn invalidate(&self, key: &CacheKey);
}

/// Expired entries are swept on every this many puts.
const PURGE_EVERY_PUTS: usize = 256;

struct Entry {
    blob: Vec<u8>,
    expires_at_millis: i64,
}

/// In-process cache backed by a concurrent map.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    puts: AtomicUsize,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live and expired entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key` currently has an unexpired entry.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !crate::time::has_passed(entry.expires_at_millis));
        before.saturating_sub(self.entries.len())
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let rendered = key.to_string();
        {
            let entry = self.entries.get(&rendered)?;
            if !crate::time::has_passed(entry.expires_at_millis) {
                return Some(entry.blob.clone());
            }
        }
        // A concurrent put may have replaced the entry since the guard dropped
        self.entries
            .remove_if(&rendered, |_, entry| crate::time::has_passed(entry.expires_at_millis));
        None
    }

    fn put(&self, key: &CacheKey, blob: Vec<u8>, ttl: Duration) {
        let expires_at_millis = crate::time::deadline_after(ttl);
        self.entries.insert(key.to_string(), Entry { blob, expires_at_millis });

        let puts = self.puts.fetch_add(1, Ordering::Relaxed) + 1;
        if puts % PURGE_EVERY_PUTS == 0 {
            let purged = self.purge_expired();
            tracing::debug!(purged, remaining = self.entries.len(), "Cache swept");
        }
    }

    fn invalidate(&self, key: &CacheKey) {
        self.entries.remove(&key.to_string());
    }
}
