//! # Database
//!
//! SQLite database handle.
//!
//! ## Database Operations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DATABASE OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │    Engines      │  access / membership / read tracking / lifecycle  │
//! │  └────────┬────────┘                                                   │
//! │           │  read(|conn| ..)  transaction(|tx| ..)                      │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │    Database     │  Connection behind a mutex                        │
//! │  │   (this file)   │  - one SQLite transaction per closure             │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │  places.rs      │  Row-level SQL, all taking &Connection            │
//! │  │  accounts.rs    │  so they compose inside a transaction             │
//! │  │  reads.rs ...   │                                                   │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The connection mutex is not reentrant: a closure passed to `read` or
//! `transaction` must only use the connection it is handed.

use parking_lot::Mutex;
use rusqlite::{params, Connection, Transaction};
use std::sync::Arc;

use super::schema;
use crate::counters::SystemCounters;
use crate::error::{Error, Result};

/// The main database handle
pub struct Database {
    /// The underlying SQLite connection
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub async fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory()
                .map_err(|e| Error::Database(format!("Failed to create in-memory database: {}", e)))?,
        };

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        // Check current schema version
        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::Database(format!("Failed to create tables: {}", e)))?;

                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| Error::Database(format!("Failed to set schema version: {}", e)))?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::StorageCorrupted(format!(
                    "database schema version {} is newer than supported {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Database schema version: {}", v);
            }
        }

        Ok(())
    }

    /// Run read-only work against the connection.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` inside one SQLite transaction.
    ///
    /// Committed when `f` returns `Ok`; rolled back (by drop) on `Err`.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;
        let out = f(&tx)?;
        tx.commit()
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;
        Ok(out)
    }
}

// ============================================================================
// SYSTEM COUNTERS
// ============================================================================

impl SystemCounters for Database {
    fn increment(&self, name: &str, delta: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO system_counters (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = value + ?2",
            params![name, delta],
        )
        .map_err(|e| Error::Database(format!("Failed to bump system counter: {}", e)))?;
        Ok(())
    }

    fn get(&self, name: &str) -> Result<i64> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            "SELECT value FROM system_counters WHERE name = ?",
            params![name],
            |row| row.get(0),
        );
        match result {
            Ok(v) => Ok(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(Error::Database(format!("Failed to read system counter: {}", e))),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
