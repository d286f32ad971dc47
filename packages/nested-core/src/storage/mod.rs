//! # Storage Module
//!
//! SQLite-backed entity store for places, accounts, posts and read tracking.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Database (database.rs)                                                 │
//! │  ├── read(|conn| ..)           single statement or consistent read     │
//! │  └── transaction(|tx| ..)      multi-row mutation, all or nothing      │
//! │                                                                         │
//! │  Row modules (free functions over &Connection):                        │
//! │  • places     - place rows, membership rows, unlocked children         │
//! │  • accounts   - account rows, AccessPlaceIDs, bookmarks, connections   │
//! │  • posts      - post rows and their place placement                    │
//! │  • reads      - unread counters and unread markers                     │
//! │  • activity   - per-place activity history                             │
//! │                                                                         │
//! │  Counters are only changed with `x = x + n` statements, never by       │
//! │  read-modify-write in Rust.                                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod database;
mod schema;

pub(crate) mod accounts;
pub(crate) mod activity;
pub(crate) mod places;
pub(crate) mod posts;
pub(crate) mod reads;

pub use activity::ActivityRecord;
pub use database::Database;
pub use schema::SCHEMA_VERSION;

use rusqlite::types::Type;
use rusqlite::Row;

/// Read a text column and parse it into one of the entity enums.
pub(crate) fn column_enum<T>(
    row: &Row<'_>,
    idx: usize,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unexpected value {:?}", raw).into(),
        )
    })
}
