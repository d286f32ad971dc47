//! # Error Handling
//!
//! Error types for Nested Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Place Errors (100-199)                                            │
//! │  │   ├── PlaceNotFound         - Place does not exist                  │
//! │  │   ├── PlaceExists           - ID already taken                      │
//! │  │   ├── InvalidPlaceId        - Malformed dotted path                 │
//! │  │   ├── ParentNotFound        - Parent of a sub-place is missing      │
//! │  │   ├── InvalidParent         - Parent cannot hold this kind of child │
//! │  │   ├── ChildLimitReached     - Parent is at Limit.Children           │
//! │  │   └── LevelLimitReached     - Tree is already at maximum depth      │
//! │  │                                                                      │
//! │  ├── Account Errors (200-299)                                          │
//! │  │   ├── AccountNotFound       - Account does not exist                │
//! │  │   ├── AccountExists         - Account ID already taken              │
//! │  │   └── InvalidAccountId      - Malformed account ID                  │
//! │  │                                                                      │
//! │  ├── Storage Errors (400-499)                                          │
//! │  │   ├── Database              - SQLite failure                        │
//! │  │   └── StorageCorrupted      - Row could not be materialized         │
//! │  │                                                                      │
//! │  └── Internal Errors (900-999)                                         │
//! │      ├── Internal              - Should not happen                     │
//! │      └── Serialization         - Cache blob / payload encoding         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Business-rule refusals (promoting a non-keyholder, removing a place that
//! still has children) are not errors: those operations return `Ok(false)`.

use thiserror::Error;

/// Result type alias for Nested Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Nested Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Place Errors (100-199)
    // ========================================================================

    /// Place does not exist
    #[error("Place not found: {0}")]
    PlaceNotFound(String),

    /// A place with this ID already exists
    #[error("Place already exists: {0}")]
    PlaceExists(String),

    /// The dotted-path ID is malformed
    #[error("Invalid place ID: {0}")]
    InvalidPlaceId(String),

    /// The parent of a sub-place does not exist
    #[error("Parent place not found: {0}")]
    ParentNotFound(String),

    /// The parent cannot hold this kind of child
    #[error("Invalid parent place: {0}")]
    InvalidParent(String),

    /// The parent already holds `Limit.Children` children
    #[error("Place {0} has reached its child limit")]
    ChildLimitReached(String),

    /// The new place would be deeper than the configured maximum
    #[error("Place {0} would exceed the maximum place level")]
    LevelLimitReached(String),

    // ========================================================================
    // Account Errors (200-299)
    // ========================================================================

    /// Account does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// An account with this ID already exists
    #[error("Account already exists: {0}")]
    AccountExists(String),

    /// The account ID is malformed
    #[error("Invalid account ID: {0}")]
    InvalidAccountId(String),

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be turned back into an entity
    #[error("Data corruption detected: {0}")]
    StorageCorrupted(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Numeric error code for the outer API layer
    ///
    /// - 100-199: Places
    /// - 200-299: Accounts
    /// - 400-499: Storage
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::PlaceNotFound(_) => 100,
            Error::PlaceExists(_) => 101,
            Error::InvalidPlaceId(_) => 102,
            Error::ParentNotFound(_) => 103,
            Error::InvalidParent(_) => 104,
            Error::ChildLimitReached(_) => 105,
            Error::LevelLimitReached(_) => 106,

            Error::AccountNotFound(_) => 200,
            Error::AccountExists(_) => 201,
            Error::InvalidAccountId(_) => 202,

            Error::Database(_) => 400,
            Error::StorageCorrupted(_) => 401,

            Error::Internal(_) => 900,
            Error::Serialization(_) => 901,
        }
    }

    /// Check if this error is worth retrying.
    ///
    /// Only infrastructure failures qualify; retry itself is the caller's job.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Database(_))
    }

    /// Whether the error means "the thing you asked about is not there".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::PlaceNotFound(_) | Error::ParentNotFound(_) | Error::AccountNotFound(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::PlaceNotFound("a".into()).code(), 100);
        assert_eq!(Error::LevelLimitReached("a.b.c.d".into()).code(), 106);
        assert_eq!(Error::AccountNotFound("bob".into()).code(), 200);
        assert_eq!(Error::Database("locked".into()).code(), 400);
        assert_eq!(Error::Internal("test".into()).code(), 900);
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::Database("busy".into()).is_recoverable());
        assert!(!Error::PlaceExists("sales".into()).is_recoverable());
    }

    #[test]
    fn test_rusqlite_conversion() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.code(), 400);
        assert!(err.to_string().starts_with("Database error"));
    }

    #[test]
    fn test_not_found_classification() {
        assert!(Error::ParentNotFound("sales".into()).is_not_found());
        assert!(!Error::ChildLimitReached("sales".into()).is_not_found());
    }
}
