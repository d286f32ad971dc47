//! # Accounts
//!
//! The account entity as far as the core needs it: identity, the places it
//! can access (the account side of the membership index) and bookmarks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::place::{is_valid_segment, PlaceId};
use crate::storage::accounts;

/// Account identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Parse and validate an account ID (same charset as a place segment).
    pub fn parse(raw: &str) -> Result<Self> {
        if !is_valid_segment(raw) {
            return Err(Error::InvalidAccountId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub(crate) fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    /// The ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account ID
    pub id: AccountId,
    /// Display name
    pub name: String,
    /// Places the account is a creator or keyholder of, in join order
    pub access_place_ids: Vec<PlaceId>,
    /// Bookmarked places
    pub bookmarked_place_ids: Vec<PlaceId>,
    /// Registration time (Unix seconds)
    pub created_at: i64,
    /// Last update (Unix seconds)
    pub updated_at: i64,
}

impl Account {
    /// Whether the account's access list names the place.
    pub fn has_access_to(&self, place_id: &PlaceId) -> bool {
        self.access_place_ids.iter().any(|id| id == place_id)
    }

    /// Whether the account bookmarked the place.
    pub fn has_bookmarked(&self, place_id: &PlaceId) -> bool {
        self.bookmarked_place_ids.iter().any(|id| id == place_id)
    }
}

/// Account registration and bookmarks.
#[derive(Clone)]
pub struct AccountService {
    ctx: Context,
}

impl AccountService {
    /// Create a new account service.
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Register a new account.
    pub fn register(&self, id: &AccountId, name: &str) -> Result<Account> {
        let now = crate::time::now_timestamp();
        let account = Account {
            id: id.clone(),
            name: name.to_string(),
            access_place_ids: Vec::new(),
            bookmarked_place_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let inserted = self.ctx.db.transaction(|tx| accounts::insert(tx, &account))?;
        if !inserted {
            return Err(Error::AccountExists(id.to_string()));
        }

        tracing::info!(account_id = %id, "Account registered");
        Ok(account)
    }

    /// Load an account through the cache.
    pub fn get(&self, id: &AccountId) -> Result<Account> {
        self.ctx
            .load_account(id)?
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))
    }

    /// Bookmark a place. Returns false if it was already bookmarked.
    pub fn bookmark_place(&self, id: &AccountId, place_id: &PlaceId) -> Result<bool> {
        let now = crate::time::now_timestamp();
        let added = self.ctx.db.transaction(|tx| {
            if !accounts::exists(tx, id)? {
                return Err(Error::AccountNotFound(id.to_string()));
            }
            if !crate::storage::places::exists(tx, place_id)? {
                return Err(Error::PlaceNotFound(place_id.to_string()));
            }
            accounts::add_bookmark(tx, id, place_id, now)
        })?;

        if added {
            self.ctx.invalidate_account(id);
        }
        Ok(added)
    }

    /// Connection strength between an account and a place, for ranking.
    pub fn place_connection(&self, id: &AccountId, place_id: &PlaceId) -> Result<i64> {
        self.ctx.db.read(|conn| accounts::place_connection(conn, id, place_id))
    }

    /// Connection strength between two accounts, for ranking.
    pub fn account_connection(&self, id: &AccountId, other: &AccountId) -> Result<i64> {
        self.ctx.db.read(|conn| accounts::account_connection(conn, id, other))
    }

    /// Remove a bookmark. Returns false if there was none.
    pub fn unbookmark_place(&self, id: &AccountId, place_id: &PlaceId) -> Result<bool> {
        let removed = self
            .ctx
            .db
            .transaction(|tx| accounts::remove_bookmark(tx, id, place_id))?;
        if removed {
            self.ctx.invalidate_account(id);
        }
        Ok(removed)
    }
}
