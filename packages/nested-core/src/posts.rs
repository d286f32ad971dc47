//! # Post Index
//!
//! Where posts are located. Post content lives outside the core; this module
//! only records placement, keeps `Counter.posts` of every place in step and
//! drives read tracking.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::place::PlaceId;
use crate::read_tracking::{detach_markers_tx, fan_out_tx};
use crate::storage::places::{self, CounterField};
use crate::storage::posts;

/// Post identifier, opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    /// Wrap an existing ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Post placement.
#[derive(Clone)]
pub struct PostIndex {
    ctx: Context,
}

impl PostIndex {
    /// Create a new index.
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Place a new post into `targets` and fan it out to their readers.
    ///
    /// Each target is its own transaction; a failing target is logged and
    /// skipped. Returns the places the post landed in.
    pub fn record(&self, post_id: &PostId, sender: &AccountId, targets: &[PlaceId]) -> Result<Vec<PlaceId>> {
        let now = crate::time::now_timestamp();
        let mut landed = Vec::new();

        for place_id in targets {
            let result = self.ctx.db.transaction(|tx| {
                let Some(place) = places::get(tx, place_id)? else {
                    return Err(Error::PlaceNotFound(place_id.to_string()));
                };
                posts::insert(tx, post_id.as_str(), sender, now)?;
                if !posts::attach(tx, post_id.as_str(), place_id)? {
                    return Ok(false);
                }
                places::bump_counter(tx, place_id, CounterField::Posts, 1, now)?;
                let delivered = fan_out_tx(tx, &place, post_id.as_str(), sender, now)?;
                tracing::debug!(place_id = %place_id, post_id = %post_id, delivered, "Post placed");
                Ok(true)
            });

            match result {
                Ok(true) => {
                    self.ctx.invalidate_place(place_id);
                    landed.push(place_id.clone());
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(place_id = %place_id, post_id = %post_id, error = %e, "Failed to place post, skipped");
                }
            }
        }

        Ok(landed)
    }

    /// Take a post out of one place.
    ///
    /// Readers still holding an unread marker there are decremented. The
    /// post row is deleted once it is located nowhere.
    pub fn detach(&self, post_id: &PostId, place_id: &PlaceId) -> Result<bool> {
        let now = crate::time::now_timestamp();
        let detached = self.ctx.db.transaction(|tx| {
            if !posts::detach(tx, post_id.as_str(), place_id)? {
                return Ok(false);
            }
            places::bump_counter(tx, place_id, CounterField::Posts, -1, now)?;
            detach_markers_tx(tx, place_id, post_id.as_str())?;
            posts::delete_if_orphaned(tx, post_id.as_str())?;
            Ok(true)
        })?;

        if detached {
            self.ctx.invalidate_place(place_id);
        }
        Ok(detached)
    }

    /// Move a post from `from` to `to` in one transaction.
    ///
    /// Returns false when the post is not in `from` or already in `to`.
    pub fn relocate(&self, post_id: &PostId, from: &PlaceId, to: &PlaceId) -> Result<bool> {
        let now = crate::time::now_timestamp();
        let moved = self.ctx.db.transaction(|tx| {
            let Some(target) = places::get(tx, to)? else {
                return Err(Error::PlaceNotFound(to.to_string()));
            };
            let Some(sender) = posts::sender(tx, post_id.as_str())? else {
                return Ok(false);
            };
            if posts::places_of(tx, post_id.as_str())?.contains(to) {
                return Ok(false);
            }
            if !posts::detach(tx, post_id.as_str(), from)? {
                return Ok(false);
            }
            places::bump_counter(tx, from, CounterField::Posts, -1, now)?;
            detach_markers_tx(tx, from, post_id.as_str())?;

            posts::attach(tx, post_id.as_str(), to)?;
            places::bump_counter(tx, to, CounterField::Posts, 1, now)?;
            fan_out_tx(tx, &target, post_id.as_str(), &sender, now)?;
            Ok(true)
        })?;

        if moved {
            self.ctx.invalidate_place(from);
            self.ctx.invalidate_place(to);
            tracing::debug!(post_id = %post_id, from = %from, to = %to, "Post moved");
        }
        Ok(moved)
    }

    /// Places a post is located in.
    pub fn places_of(&self, post_id: &PostId) -> Result<Vec<PlaceId>> {
        self.ctx.db.read(|conn| posts::places_of(conn, post_id.as_str()))
    }
}
