//! # Membership
//!
//! Moves accounts between the three per-place states:
//!
//! ```text
//!              add_keyholder            promote
//!   NonMember ──────────────► Keyholder ───────► Creator
//!       ▲      remove_keyholder  │   ◄───────      │
//!       └────────────────────────┘    demote        │
//!       ▲                                           │
//!       └───────────────────────────────────────────┘
//!                     remove_creator
//! ```
//!
//! Every transition runs in one transaction that writes both sides of the
//! membership index (`place_members` and `account_places`), the place
//! counters, read tracking and the activity history. Cached blobs of the
//! place and the account are invalidated after commit, never patched.
//!
//! A violated precondition returns `Ok(false)` and writes nothing.

use rusqlite::Connection;
use serde_json::json;

use crate::account::AccountId;
use crate::context::Context;
use crate::error::Result;
use crate::events::EventKind;
use crate::place::{MemberRole, Place, PlaceId};
use crate::read_tracking;
use crate::storage::places::{self, CounterField};
use crate::storage::{accounts, activity};

/// Creator / keyholder management.
#[derive(Clone)]
pub struct MembershipEngine {
    ctx: Context,
}

impl MembershipEngine {
    /// Create a new engine.
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Add a non-member as keyholder.
    pub fn add_keyholder(&self, place_id: &PlaceId, account_id: &AccountId) -> Result<bool> {
        self.join(place_id, account_id, MemberRole::Keyholder)
    }

    /// Add a non-member directly as creator.
    pub fn add_creator(&self, place_id: &PlaceId, account_id: &AccountId) -> Result<bool> {
        self.join(place_id, account_id, MemberRole::Creator)
    }

    fn join(&self, place_id: &PlaceId, account_id: &AccountId, role: MemberRole) -> Result<bool> {
        let now = crate::time::now_timestamp();
        let joined = self.ctx.db.transaction(|tx| {
            let Some(place) = places::get(tx, place_id)? else {
                return Ok(false);
            };
            join_tx(tx, &place, account_id, role, account_id, now)
        })?;

        if joined {
            self.after_change(place_id, account_id, EventKind::MemberJoined, Some(role));
        } else {
            tracing::debug!(place_id = %place_id, account_id = %account_id, role = role.as_str(), "Join rejected");
        }
        Ok(joined)
    }

    /// Turn a keyholder into a creator.
    ///
    /// Rejected when the place already holds `Limit.Creators` creators.
    pub fn promote(&self, place_id: &PlaceId, account_id: &AccountId) -> Result<bool> {
        let now = crate::time::now_timestamp();
        let promoted = self.ctx.db.transaction(|tx| {
            let Some(place) = places::get(tx, place_id)? else {
                return Ok(false);
            };
            if !place.is_keyholder(account_id) || place.is_creator(account_id) {
                return Ok(false);
            }
            if !place.has_creator_capacity() {
                tracing::debug!(place_id = %place_id, "Creator limit reached");
                return Ok(false);
            }

            places::change_role(tx, place_id, account_id, MemberRole::Keyholder, MemberRole::Creator)?;
            places::bump_counter(tx, place_id, CounterField::Keyholders, -1, now)?;
            places::bump_counter(tx, place_id, CounterField::Creators, 1, now)?;
            activity::insert(tx, place_id, account_id.as_str(), "member_promoted", Some(account_id.as_str()), now)?;
            Ok(true)
        })?;

        if promoted {
            self.after_change(place_id, account_id, EventKind::MemberPromoted, Some(MemberRole::Creator));
        }
        Ok(promoted)
    }

    /// Turn a creator into a keyholder.
    ///
    /// Rejected when the place has no keyholder capacity left, which always
    /// holds for personal places.
    pub fn demote(&self, place_id: &PlaceId, account_id: &AccountId) -> Result<bool> {
        let now = crate::time::now_timestamp();
        let demoted = self.ctx.db.transaction(|tx| {
            let Some(place) = places::get(tx, place_id)? else {
                return Ok(false);
            };
            if !place.is_creator(account_id) || !place.has_keyholder_capacity() {
                return Ok(false);
            }

            places::change_role(tx, place_id, account_id, MemberRole::Creator, MemberRole::Keyholder)?;
            places::bump_counter(tx, place_id, CounterField::Creators, -1, now)?;
            places::bump_counter(tx, place_id, CounterField::Keyholders, 1, now)?;
            activity::insert(tx, place_id, account_id.as_str(), "member_demoted", Some(account_id.as_str()), now)?;
            Ok(true)
        })?;

        if demoted {
            self.after_change(place_id, account_id, EventKind::MemberDemoted, Some(MemberRole::Keyholder));
        }
        Ok(demoted)
    }

    /// Remove a keyholder.
    pub fn remove_keyholder(&self, place_id: &PlaceId, account_id: &AccountId) -> Result<bool> {
        self.leave(place_id, account_id, MemberRole::Keyholder)
    }

    /// Remove a creator. The sole creator of a personal place cannot be removed.
    pub fn remove_creator(&self, place_id: &PlaceId, account_id: &AccountId) -> Result<bool> {
        self.leave(place_id, account_id, MemberRole::Creator)
    }

    fn leave(&self, place_id: &PlaceId, account_id: &AccountId, role: MemberRole) -> Result<bool> {
        let now = crate::time::now_timestamp();
        let left = self.ctx.db.transaction(|tx| {
            let Some(place) = places::get(tx, place_id)? else {
                return Ok(false);
            };
            leave_tx(tx, &place, account_id, role, now)
        })?;

        if left {
            self.after_change(place_id, account_id, EventKind::MemberRemoved, None);
        }
        Ok(left)
    }

    /// Strip every member from a place.
    ///
    /// Clears both sides of the membership index, bookmarks and the members'
    /// read state for the place. Returns the accounts removed.
    pub fn remove_all_members(&self, place_id: &PlaceId) -> Result<Vec<AccountId>> {
        let now = crate::time::now_timestamp();
        let removed = self.ctx.db.transaction(|tx| {
            let Some(place) = places::get(tx, place_id)? else {
                return Ok(Vec::new());
            };
            for account_id in place.members() {
                read_tracking::clear_membership_tx(tx, &place, account_id)?;
            }
            remove_all_members_tx(tx, place_id, now)
        })?;

        self.ctx.invalidate_place(place_id);
        for account_id in &removed {
            self.ctx.invalidate_account(account_id);
        }
        tracing::info!(place_id = %place_id, removed = removed.len(), "All members removed");
        Ok(removed)
    }

    fn after_change(&self, place_id: &PlaceId, account_id: &AccountId, kind: EventKind, role: Option<MemberRole>) {
        self.ctx.invalidate_place(place_id);
        self.ctx.invalidate_account(account_id);
        tracing::debug!(
            place_id = %place_id,
            account_id = %account_id,
            event = kind.as_str(),
            "Membership changed"
        );
        self.ctx.events.emit(
            kind,
            json!({
                "place_id": place_id.as_str(),
                "account_id": account_id.as_str(),
                "role": role.map(|r| r.as_str()),
            }),
        );
    }
}

/// Add `account_id` to `place` with `role`, inside an open transaction.
///
/// `place` must have been loaded from the same transaction.
pub(crate) fn join_tx(
    conn: &Connection,
    place: &Place,
    account_id: &AccountId,
    role: MemberRole,
    actor: &AccountId,
    now: i64,
) -> Result<bool> {
    if place.is_member(account_id) || !accounts::exists(conn, account_id)? {
        return Ok(false);
    }
    let (has_room, counter) = match role {
        MemberRole::Creator => (place.has_creator_capacity(), CounterField::Creators),
        MemberRole::Keyholder => (place.has_keyholder_capacity(), CounterField::Keyholders),
    };
    if !has_room {
        tracing::debug!(place_id = %place.id, role = role.as_str(), "Member limit reached");
        return Ok(false);
    }
    if !places::add_member(conn, &place.id, account_id, role, now)? {
        return Ok(false);
    }

    places::bump_counter(conn, &place.id, counter, 1, now)?;
    accounts::add_access_place(conn, account_id, &place.id, now)?;
    read_tracking::init_counters_tx(conn, place, account_id)?;

    accounts::bump_place_connection(conn, account_id, &place.id, 1)?;
    for creator in &place.creator_ids {
        accounts::bump_account_connection(conn, account_id, creator, 1)?;
    }

    activity::insert(conn, &place.id, actor.as_str(), "member_joined", Some(account_id.as_str()), now)?;
    Ok(true)
}

/// Remove `account_id` from `place` when it holds `role`, inside an open transaction.
pub(crate) fn leave_tx(
    conn: &Connection,
    place: &Place,
    account_id: &AccountId,
    role: MemberRole,
    now: i64,
) -> Result<bool> {
    let holds_role = match role {
        MemberRole::Creator => place.is_creator(account_id),
        MemberRole::Keyholder => place.is_keyholder(account_id),
    };
    if !holds_role {
        return Ok(false);
    }
    if role == MemberRole::Creator && place.is_personal() {
        return Ok(false);
    }
    if !places::remove_member(conn, &place.id, account_id, role)? {
        return Ok(false);
    }

    let counter = match role {
        MemberRole::Creator => CounterField::Creators,
        MemberRole::Keyholder => CounterField::Keyholders,
    };
    places::bump_counter(conn, &place.id, counter, -1, now)?;
    accounts::remove_access_place(conn, account_id, &place.id)?;
    accounts::remove_bookmark(conn, account_id, &place.id)?;
    read_tracking::clear_membership_tx(conn, place, account_id)?;
    activity::insert(conn, &place.id, account_id.as_str(), "member_removed", Some(account_id.as_str()), now)?;
    Ok(true)
}

/// Clear a place's membership and strip it from every account, inside an
/// open transaction. Returns every account that was touched.
pub(crate) fn remove_all_members_tx(conn: &Connection, place_id: &PlaceId, now: i64) -> Result<Vec<AccountId>> {
    let mut touched = places::clear_members(conn, place_id, now)?;
    for account_id in accounts::strip_place(conn, place_id)? {
        if !touched.contains(&account_id) {
            touched.push(account_id);
        }
    }
    Ok(touched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::testing;

    #[tokio::test]
    async fn test_add_keyholder_updates_both_sides() {
        let mut env = testing::env().await;
        let alice = env.account("alice");
        let bob = env.account("bob");
        let sales = env.grand_place("sales", &alice);
        env.drain_events();

        assert!(env.membership().add_keyholder(&sales.id, &bob).unwrap());

        let place = env.reload(&sales.id);
        assert_eq!(place.keyholder_ids, vec![bob.clone()]);
        assert_eq!(place.counter.keyholders, 1);
        let account = env.ctx.load_account(&bob).unwrap().unwrap();
        assert!(account.has_access_to(&sales.id));
        assert_eq!(env.reads().unread_counts(&bob).unwrap(), vec![(sales.id.clone(), 0)]);
        assert_eq!(env.accounts().place_connection(&bob, &sales.id).unwrap(), 1);
        assert_eq!(env.accounts().account_connection(&bob, &alice).unwrap(), 1);
        assert_eq!(env.accounts().account_connection(&alice, &bob).unwrap(), 1);

        let events = env.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::MemberJoined);
        assert_eq!(events[0].payload["account_id"], "bob");
    }

    #[tokio::test]
    async fn test_add_keyholder_rejects_members() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let bob = env.account("bob");
        let sales = env.grand_place("sales", &alice);

        assert!(!env.membership().add_keyholder(&sales.id, &alice).unwrap());
        assert!(env.membership().add_keyholder(&sales.id, &bob).unwrap());
        assert!(!env.membership().add_keyholder(&sales.id, &bob).unwrap());
        assert_eq!(env.reload(&sales.id).counter.keyholders, 1);
    }

    #[tokio::test]
    async fn test_add_keyholder_unknown_place_or_account() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let sales = env.grand_place("sales", &alice);
        let ghost = AccountId::parse("ghost").unwrap();
        let nowhere = PlaceId::parse("nowhere").unwrap();

        assert!(!env.membership().add_keyholder(&sales.id, &ghost).unwrap());
        assert!(!env.membership().add_keyholder(&nowhere, &alice).unwrap());
    }

    #[tokio::test]
    async fn test_personal_place_admits_no_keyholders() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let bob = env.account("bob");
        let home = env.personal_place("alice", &alice);

        assert!(!env.membership().add_keyholder(&home.id, &bob).unwrap());
        assert!(!env.membership().demote(&home.id, &alice).unwrap());
        assert!(!env.membership().remove_creator(&home.id, &alice).unwrap());
        assert!(env.reload(&home.id).invariant_violations().is_empty());
    }

    #[tokio::test]
    async fn test_add_then_remove_keyholder_round_trip() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let bob = env.account("bob");
        let sales = env.grand_place("sales", &alice);
        let before = env.reload(&sales.id).counter.keyholders;

        env.membership().add_keyholder(&sales.id, &bob).unwrap();
        env.reads().on_post_created("p1", &alice, &[sales.id.clone()]);
        env.accounts().bookmark_place(&bob, &sales.id).unwrap();
        assert!(env.membership().remove_keyholder(&sales.id, &bob).unwrap());

        let place = env.reload(&sales.id);
        assert_eq!(place.counter.keyholders, before);
        assert!(!place.is_member(&bob));
        assert!(env.reads().unread_counts(&bob).unwrap().is_empty());
        let account = env.ctx.load_account(&bob).unwrap().unwrap();
        assert!(account.access_place_ids.is_empty());
        assert!(account.bookmarked_place_ids.is_empty());

        assert!(!env.membership().remove_keyholder(&sales.id, &bob).unwrap());
    }

    #[tokio::test]
    async fn test_add_then_remove_creator_clears_grand_and_unlocked_state() {
        let mut env = testing::env().await;
        let alice = env.account("alice");
        let carol = env.account("carol");
        let sales = env.grand_place("sales", &alice);
        let lounge = env.unlocked_child(&sales, "lounge", &alice);
        let before = env.reload(&sales.id).counter.creators;

        assert!(env.membership().add_creator(&sales.id, &carol).unwrap());
        assert!(!env.membership().add_creator(&sales.id, &carol).unwrap());
        assert_eq!(env.reload(&sales.id).counter.creators, before + 1);

        let post = crate::posts::PostId::new("p1");
        let landed = env
            .posts()
            .record(&post, &alice, &[sales.id.clone(), lounge.id.clone()])
            .unwrap();
        assert_eq!(landed.len(), 2);
        assert_eq!(
            env.reads().unread_counts(&carol).unwrap(),
            vec![(sales.id.clone(), 1), (lounge.id.clone(), 1)]
        );
        env.accounts().bookmark_place(&carol, &sales.id).unwrap();
        env.drain_events();

        assert!(env.membership().remove_creator(&sales.id, &carol).unwrap());

        let place = env.reload(&sales.id);
        assert_eq!(place.counter.creators, before);
        assert!(!place.is_member(&carol));
        assert!(place.invariant_violations().is_empty());
        let account = env.ctx.load_account(&carol).unwrap().unwrap();
        assert!(account.access_place_ids.is_empty());
        assert!(account.bookmarked_place_ids.is_empty());
        assert!(env.reads().unread_counts(&carol).unwrap().is_empty());
        assert!(!env.reads().is_unread(&carol, &lounge.id, post.as_str()).unwrap());

        let events = env.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::MemberRemoved);
        assert_eq!(events[0].payload["account_id"], "carol");

        assert!(!env.membership().remove_creator(&sales.id, &carol).unwrap());
    }

    #[tokio::test]
    async fn test_promote_and_demote() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let bob = env.account("bob");
        let sales = env.grand_place("sales", &alice);

        assert!(!env.membership().promote(&sales.id, &bob).unwrap());
        env.membership().add_keyholder(&sales.id, &bob).unwrap();
        assert!(env.membership().promote(&sales.id, &bob).unwrap());
        assert!(!env.membership().promote(&sales.id, &bob).unwrap());

        let place = env.reload(&sales.id);
        assert!(place.is_creator(&bob));
        assert!(!place.is_keyholder(&bob));
        assert_eq!((place.counter.creators, place.counter.keyholders), (2, 0));

        assert!(env.membership().demote(&sales.id, &bob).unwrap());
        let place = env.reload(&sales.id);
        assert!(place.is_keyholder(&bob));
        assert_eq!((place.counter.creators, place.counter.keyholders), (1, 1));
        // Access list untouched by role changes
        assert!(env.ctx.load_account(&bob).unwrap().unwrap().has_access_to(&sales.id));
    }

    #[tokio::test]
    async fn test_promote_respects_creator_limit() {
        let mut config = crate::config::CoreConfig::default();
        config.defaults.grand.creators = 1;
        let env = testing::env_with(config).await;
        let alice = env.account("alice");
        let bob = env.account("bob");
        let sales = env.grand_place("sales", &alice);
        env.membership().add_keyholder(&sales.id, &bob).unwrap();

        assert!(!env.membership().promote(&sales.id, &bob).unwrap());
        let place = env.reload(&sales.id);
        assert!(place.creator_ids.len() as i64 <= place.limit.creators);
        assert!(place.is_keyholder(&bob));
    }

    #[tokio::test]
    async fn test_add_keyholder_respects_keyholder_limit() {
        let mut config = crate::config::CoreConfig::default();
        config.defaults.grand.keyholders = 1;
        let env = testing::env_with(config).await;
        let alice = env.account("alice");
        let sales = env.grand_place("sales", &alice);
        env.keyholder(&sales, "bob");
        let carol = env.account("carol");

        assert!(!env.membership().add_keyholder(&sales.id, &carol).unwrap());
        assert_eq!(env.reload(&sales.id).keyholder_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_grand_place_join_initializes_unlocked_children() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let sales = env.grand_place("sales", &alice);
        let lounge = env.unlocked_child(&sales, "lounge", &alice);
        let bob = env.account("bob");

        env.membership().add_keyholder(&sales.id, &bob).unwrap();
        let counts = env.reads().unread_counts(&bob).unwrap();
        assert_eq!(counts, vec![(sales.id.clone(), 0), (lounge.id.clone(), 0)]);
    }

    #[tokio::test]
    async fn test_cached_place_is_invalidated() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let bob = env.account("bob");
        let sales = env.grand_place("sales", &alice);

        // Warm the cache
        assert!(!env.ctx.load_place(&sales.id).unwrap().unwrap().is_member(&bob));
        env.membership().add_keyholder(&sales.id, &bob).unwrap();
        assert!(env.ctx.load_place(&sales.id).unwrap().unwrap().is_keyholder(&bob));
    }

    #[tokio::test]
    async fn test_remove_all_members() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let sales = env.grand_place("sales", &alice);
        let bob = env.keyholder(&sales, "bob");
        env.reads().on_post_created("p1", &alice, &[sales.id.clone()]);

        let removed = env.membership().remove_all_members(&sales.id).unwrap();
        assert_eq!(removed.len(), 2);

        let place = env.reload(&sales.id);
        assert_eq!(place.members().count(), 0);
        assert_eq!((place.counter.creators, place.counter.keyholders), (0, 0));
        assert!(env.ctx.load_account(&bob).unwrap().unwrap().access_place_ids.is_empty());
        assert!(env.reads().unread_counts(&bob).unwrap().is_empty());
    }
}
