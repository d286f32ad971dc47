//! # Context
//!
//! The dependency-injection root. Every engine is constructed from a
//! [`Context`] and reaches its collaborators only through it; there are no
//! process-wide singletons.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              CONTEXT                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   db        Arc<Database>            entity store, transactions        │
//! │   cache     Arc<dyn Cache>           place / account blobs             │
//! │   events    Arc<dyn EventSink>       activity + webhook events         │
//! │   counters  Arc<dyn SystemCounters>  process-wide place statistics     │
//! │   groups    Arc<dyn GroupDirectory>  notification groups               │
//! │   config    CoreConfig               limits, TTL, max level            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::account::{Account, AccountId};
use crate::cache::{Cache, CacheKey, MemoryCache};
use crate::config::CoreConfig;
use crate::counters::SystemCounters;
use crate::error::Result;
use crate::events::{EventSink, TracingSink};
use crate::groups::{GroupDirectory, LocalGroupDirectory};
use crate::place::{Place, PlaceId};
use crate::storage::{accounts, places, Database};

/// Shared handles passed into every engine.
#[derive(Clone)]
pub struct Context {
    /// Entity store
    pub db: Arc<Database>,
    /// Read-through object cache
    pub cache: Arc<dyn Cache>,
    /// Activity / webhook sink
    pub events: Arc<dyn EventSink>,
    /// Process-wide aggregate counters
    pub counters: Arc<dyn SystemCounters>,
    /// Notification group service
    pub groups: Arc<dyn GroupDirectory>,
    /// Core configuration
    pub config: CoreConfig,
}

impl Context {
    /// Assemble a context from explicit collaborators.
    pub fn new(
        db: Arc<Database>,
        cache: Arc<dyn Cache>,
        events: Arc<dyn EventSink>,
        counters: Arc<dyn SystemCounters>,
        groups: Arc<dyn GroupDirectory>,
        config: CoreConfig,
    ) -> Self {
        Self { db, cache, events, counters, groups, config }
    }

    /// Build a fully local context: SQLite at `config.database_path`
    /// (in-memory when unset), an in-process cache and group directory, a
    /// logging event sink, and system counters stored in the database.
    pub async fn open(config: CoreConfig) -> Result<Self> {
        let db = Arc::new(Database::open(config.database_path.as_deref()).await?);
        Ok(Self {
            counters: db.clone(),
            db,
            cache: Arc::new(MemoryCache::new()),
            events: Arc::new(TracingSink),
            groups: Arc::new(LocalGroupDirectory::new()),
            config,
        })
    }

    /// Same as [`Context::open`] but always in-memory.
    pub async fn in_memory(mut config: CoreConfig) -> Result<Self> {
        config.database_path = None;
        Self::open(config).await
    }

    /// Replace the event sink.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config.cache_ttl_secs)
    }

    /// Load a place through the cache. `Ok(None)` when it does not exist.
    pub fn load_place(&self, id: &PlaceId) -> Result<Option<Place>> {
        let key = CacheKey::Place(id.clone());
        self.load_through(&key, || self.db.read(|conn| places::get(conn, id)))
    }

    /// Load an account through the cache. `Ok(None)` when it does not exist.
    pub fn load_account(&self, id: &AccountId) -> Result<Option<Account>> {
        let key = CacheKey::Account(id.clone());
        self.load_through(&key, || self.db.read(|conn| accounts::get(conn, id)))
    }

    /// Drop the cached place blob.
    pub fn invalidate_place(&self, id: &PlaceId) {
        self.cache.invalidate(&CacheKey::Place(id.clone()));
    }

    /// Drop the cached account blob.
    pub fn invalidate_account(&self, id: &AccountId) {
        self.cache.invalidate(&CacheKey::Account(id.clone()));
    }

    fn load_through<T, F>(&self, key: &CacheKey, load: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<Option<T>>,
    {
        if let Some(blob) = self.cache.get(key) {
            match bincode::deserialize::<T>(&blob) {
                Ok(value) => {
                    tracing::debug!(key = %key, "Cache hit");
                    return Ok(Some(value));
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Dropping undecodable cache entry");
                    self.cache.invalidate(key);
                }
            }
        }

        tracing::debug!(key = %key, "Cache miss");
        let value = load()?;
        if let Some(ref v) = value {
            match bincode::serialize(v) {
                Ok(blob) => self.cache.put(key, blob, self.cache_ttl()),
                Err(e) => tracing::warn!(key = %key, error = %e, "Failed to encode cache entry"),
            }
        }
        Ok(value)
    }
}
