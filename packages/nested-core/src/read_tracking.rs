//! # Read Tracking
//!
//! Per-(account, place) unread counters backed by per-(account, place, post)
//! unread markers.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         READ TRACKING                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  post created ──► for each reader except sender:                       │
//! │                     insert marker ──inserted?──► counter += 1          │
//! │                                                                         │
//! │  mark read    ──► delete markers ──► counter -= rows deleted           │
//! │                                                                         │
//! │  member gone  ──► delete markers + counter row                         │
//! │                                                                         │
//! │  Readers of a locked place are its members. Readers of an unlocked     │
//! │  place are the grand place's members plus its own.                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The marker primary key makes every fan-out idempotent: replaying a post
//! creation inserts nothing and therefore increments nothing.

use rusqlite::Connection;

use crate::account::AccountId;
use crate::context::Context;
use crate::error::Result;
use crate::place::{Place, PlaceId};
use crate::storage::{places, reads};

/// Maintains unread counters and markers.
#[derive(Clone)]
pub struct ReadTrackingEngine {
    ctx: Context,
}

impl ReadTrackingEngine {
    /// Create a new engine.
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Fan a new post out to the readers of every target place.
    ///
    /// Each place is handled in its own transaction. A place that is missing
    /// or fails is logged and skipped. Returns the number of markers inserted.
    pub fn on_post_created(&self, post_id: &str, sender: &AccountId, targets: &[PlaceId]) -> usize {
        let now = crate::time::now_timestamp();
        let mut inserted = 0;

        for place_id in targets {
            let result = self.ctx.db.transaction(|tx| match places::get(tx, place_id)? {
                Some(place) => fan_out_tx(tx, &place, post_id, sender, now),
                None => {
                    tracing::warn!(place_id = %place_id, post_id, "Fan-out target missing, skipped");
                    Ok(0)
                }
            });
            match result {
                Ok(n) => inserted += n,
                Err(e) => {
                    tracing::warn!(place_id = %place_id, post_id, error = %e, "Fan-out failed, skipped");
                }
            }
        }

        tracing::debug!(post_id, targets = targets.len(), inserted, "Post fanned out");
        inserted
    }

    /// Mark a post read for an account in every place it was delivered to.
    ///
    /// Returns the number of markers deleted; a repeated call deletes none.
    pub fn mark_read(&self, post_id: &str, account_id: &AccountId) -> Result<usize> {
        self.ctx.db.transaction(|tx| {
            let places = reads::delete_markers_for_account_post(tx, account_id, post_id)?;
            for place_id in &places {
                reads::bump_counter(tx, account_id, place_id, -1)?;
            }
            Ok(places.len())
        })
    }

    /// Mark everything in a place read for an account.
    ///
    /// Returns the number of markers deleted.
    pub fn mark_read_by_place(&self, place_id: &PlaceId, account_id: &AccountId) -> Result<i64> {
        self.ctx.db.transaction(|tx| {
            let deleted = reads::delete_markers_in_place(tx, account_id, place_id)?;
            if deleted > 0 {
                reads::bump_counter(tx, account_id, place_id, -deleted)?;
            }
            Ok(deleted)
        })
    }

    /// Drop all read state an account holds for a place it left.
    ///
    /// Covers the unlocked children too when the place is a grand place.
    pub fn on_membership_removed(&self, place_id: &PlaceId, account_id: &AccountId) -> Result<()> {
        self.ctx.db.transaction(|tx| match places::get(tx, place_id)? {
            Some(place) => clear_membership_tx(tx, &place, account_id),
            None => {
                reads::delete_markers_in_place(tx, account_id, place_id)?;
                reads::delete_counter(tx, account_id, place_id)?;
                Ok(())
            }
        })
    }

    /// A post left `from`: decrement every reader still holding a marker.
    ///
    /// Returns the number of markers deleted.
    pub fn on_post_moved(&self, post_id: &str, from: &PlaceId) -> Result<usize> {
        self.ctx.db.transaction(|tx| detach_markers_tx(tx, from, post_id))
    }

    /// A post was deleted: clear its markers in every place.
    pub fn on_post_removed(&self, post_id: &str) -> Result<usize> {
        self.ctx.db.transaction(|tx| {
            let mut deleted = 0;
            for place_id in reads::places_with_markers(tx, post_id)? {
                deleted += detach_markers_tx(tx, &place_id, post_id)?;
            }
            Ok(deleted)
        })
    }

    /// Unread count for one place, 0 when the account has no counter.
    pub fn unread_count(&self, account_id: &AccountId, place_id: &PlaceId) -> Result<i64> {
        let count = self
            .ctx
            .db
            .read(|conn| reads::get_counter(conn, account_id, place_id))?;
        Ok(count.unwrap_or(0))
    }

    /// Every unread counter the account holds, ordered by place.
    pub fn unread_counts(&self, account_id: &AccountId) -> Result<Vec<(PlaceId, i64)>> {
        self.ctx.db.read(|conn| reads::counters_for_account(conn, account_id))
    }

    /// Whether the account has an unread marker for the post in the place.
    pub fn is_unread(&self, account_id: &AccountId, place_id: &PlaceId, post_id: &str) -> Result<bool> {
        self.ctx.db.read(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM post_reads WHERE account_id = ? AND place_id = ? AND post_id = ?",
                rusqlite::params![account_id.as_str(), place_id.as_str(), post_id],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }
}

/// Accounts that read a place, in a stable order without duplicates.
pub(crate) fn readers_tx(conn: &Connection, place: &Place) -> Result<Vec<AccountId>> {
    let mut readers: Vec<AccountId> = Vec::new();
    if !place.privacy.locked && place.grand_parent_id != place.id {
        for (account_id, _) in places::members(conn, &place.grand_parent_id)? {
            readers.push(account_id);
        }
    }
    for account_id in place.members() {
        if !readers.contains(account_id) {
            readers.push(account_id.clone());
        }
    }
    Ok(readers)
}

/// Insert one marker per reader except the sender, bumping counters for
/// the markers that were actually new.
pub(crate) fn fan_out_tx(
    conn: &Connection,
    place: &Place,
    post_id: &str,
    sender: &AccountId,
    now: i64,
) -> Result<usize> {
    let mut inserted = 0;
    for reader in readers_tx(conn, place)? {
        if &reader == sender {
            continue;
        }
        if reads::insert_marker(conn, &reader, &place.id, post_id, now)? {
            reads::bump_counter(conn, &reader, &place.id, 1)?;
            inserted += 1;
        }
    }
    Ok(inserted)
}

/// Delete every marker of a post in one place and decrement their holders.
pub(crate) fn detach_markers_tx(conn: &Connection, place_id: &PlaceId, post_id: &str) -> Result<usize> {
    let holders = reads::delete_markers_for_post(conn, place_id, post_id)?;
    for account_id in &holders {
        reads::bump_counter(conn, account_id, place_id, -1)?;
    }
    Ok(holders.len())
}

/// Force-read and drop the counters of an account leaving a place.
pub(crate) fn clear_membership_tx(conn: &Connection, place: &Place, account_id: &AccountId) -> Result<()> {
    let mut scope = vec![place.id.clone()];
    if place.is_grand_place() {
        scope.extend(place.unlocked_children_ids.iter().cloned());
    }
    for place_id in &scope {
        let deleted = reads::delete_markers_in_place(conn, account_id, place_id)?;
        reads::delete_counter(conn, account_id, place_id)?;
        tracing::debug!(place_id = %place_id, account_id = %account_id, deleted, "Read state cleared");
    }
    Ok(())
}

/// Counters for a new reader start at the markers already waiting for it.
pub(crate) fn init_counters_tx(conn: &Connection, place: &Place, account_id: &AccountId) -> Result<()> {
    let mut scope = vec![place.id.clone()];
    if place.is_grand_place() {
        scope.extend(place.unlocked_children_ids.iter().cloned());
    }
    for place_id in &scope {
        let waiting = reads::count_markers(conn, account_id, place_id)?;
        reads::set_counter(conn, account_id, place_id, waiting)?;
    }
    Ok(())
}
