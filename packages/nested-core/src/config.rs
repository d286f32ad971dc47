//! Core configuration.
//!
//! Defaults are usable as-is; hosts override them programmatically or via
//! `NESTED_*` environment variables.

use std::env;

use crate::place::Limit;

/// Default cache entry lifetime in seconds (1 hour).
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Default deepest level a place may sit at (grand places are level 0).
const DEFAULT_MAX_PLACE_LEVEL: u8 = 3;

/// Initial limits for each creation variant.
#[derive(Debug, Clone, Copy)]
pub struct PlaceDefaults {
    /// Personal places (grand or sub-place)
    pub personal: Limit,
    /// Shared grand places
    pub grand: Limit,
    /// Locked sub-places
    pub locked: Limit,
    /// Unlocked level-1 places
    pub unlocked: Limit,
}

impl Default for PlaceDefaults {
    fn default() -> Self {
        Self {
            personal: Limit { creators: 1, keyholders: 0, children: 50, quota: 1 << 30 },
            grand: Limit { creators: 10, keyholders: 1000, children: 50, quota: 10 << 30 },
            locked: Limit { creators: 10, keyholders: 1000, children: 50, quota: 1 << 30 },
            unlocked: Limit { creators: 10, keyholders: 0, children: 0, quota: 1 << 30 },
        }
    }
}

/// Configuration for a [`Context`](crate::Context).
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Path to the database file (None for in-memory)
    pub database_path: Option<String>,
    /// Lifetime of cached place / account blobs
    pub cache_ttl_secs: u64,
    /// Deepest level a place may be created at
    pub max_place_level: u8,
    /// Initial limits per creation variant
    pub defaults: PlaceDefaults,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_place_level: DEFAULT_MAX_PLACE_LEVEL,
            defaults: PlaceDefaults::default(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cache_ttl_secs = env::var("NESTED_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.cache_ttl_secs);
        let max_place_level = env::var("NESTED_MAX_PLACE_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_place_level);

        let mut place_defaults = defaults.defaults;
        if let Some(n) = env::var("NESTED_GRAND_KEYHOLDER_LIMIT").ok().and_then(|v| v.parse().ok()) {
            place_defaults.grand.keyholders = n;
        }
        if let Some(n) = env::var("NESTED_CHILD_LIMIT").ok().and_then(|v| v.parse().ok()) {
            place_defaults.personal.children = n;
            place_defaults.grand.children = n;
            place_defaults.locked.children = n;
        }

        Self {
            database_path: env::var("NESTED_DATABASE_PATH").ok(),
            cache_ttl_secs,
            max_place_level,
            defaults: place_defaults,
        }
    }
}
