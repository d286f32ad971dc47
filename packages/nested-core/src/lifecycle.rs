//! # Place Lifecycle
//!
//! Creation and removal of places.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         PLACE LIFECYCLE                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Creating ──────────► Active ──────────► Removed (hard delete)        │
//! │                                                                         │
//! │   create_*:  validate parent ─► insert row ─► creator joins            │
//! │              ─► parent counters ─► activity   (one transaction)         │
//! │              then: system counter, notification group, re-read         │
//! │                                                                         │
//! │   remove:    no children ─► parent counters ─► strip members           │
//! │              ─► posts / read state / history ─► delete row             │
//! │                                                   (one transaction)     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Variant  | Parent                    | Locked | Receptive | System counter    |
//! |----------|---------------------------|--------|-----------|-------------------|
//! | personal | none, or personal         | yes    | off       | `places.personal` |
//! | grand    | none                      | yes    | off       | `places.grand`    |
//! | locked   | locked shared place       | yes    | off       | `places.locked`   |
//! | unlocked | shared grand place        | no     | internal  | `places.unlocked` |

use rusqlite::Connection;
use serde_json::json;

use crate::account::AccountId;
use crate::context::Context;
use crate::counters::{GRAND_PLACES, LOCKED_PLACES, PERSONAL_PLACES, UNLOCKED_PLACES};
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::membership::{join_tx, remove_all_members_tx};
use crate::place::hierarchy;
use crate::place::{
    Counter, Limit, MemberRole, Place, PlaceId, PlaceType, Policy, PolicyLevel, Privacy,
    Receptive,
};
use crate::storage::places::{self, CounterField};
use crate::storage::{accounts, activity, posts, reads, ActivityRecord};

/// The four creation variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceKind {
    /// Personal place (root or sub-place of a personal place)
    Personal,
    /// Shared root place
    Grand,
    /// Locked shared sub-place
    Locked,
    /// Unlocked level-1 shared place
    Unlocked,
}

impl PlaceKind {
    /// Classify an existing place.
    pub fn of(place: &Place) -> Self {
        if place.is_personal() {
            PlaceKind::Personal
        } else if place.is_grand_place() {
            PlaceKind::Grand
        } else if place.privacy.locked {
            PlaceKind::Locked
        } else {
            PlaceKind::Unlocked
        }
    }

    /// System counter tracking this kind.
    pub fn counter_name(&self) -> &'static str {
        match self {
            PlaceKind::Personal => PERSONAL_PLACES,
            PlaceKind::Grand => GRAND_PLACES,
            PlaceKind::Locked => LOCKED_PLACES,
            PlaceKind::Unlocked => UNLOCKED_PLACES,
        }
    }

    fn place_type(&self) -> PlaceType {
        match self {
            PlaceKind::Personal => PlaceType::Personal,
            _ => PlaceType::Shared,
        }
    }

    fn privacy(&self) -> Privacy {
        match self {
            PlaceKind::Personal => Privacy { locked: true, search: false, receptive: Receptive::Off },
            PlaceKind::Grand | PlaceKind::Locked => {
                Privacy { locked: true, search: true, receptive: Receptive::Off }
            }
            PlaceKind::Unlocked => Privacy { locked: false, search: true, receptive: Receptive::Internal },
        }
    }

    fn policy(&self) -> Policy {
        match self {
            PlaceKind::Personal => Policy {
                add_post: PolicyLevel::Creators,
                add_place: PolicyLevel::Creators,
                add_member: PolicyLevel::NoOne,
            },
            PlaceKind::Grand | PlaceKind::Locked => Policy {
                add_post: PolicyLevel::Everyone,
                add_place: PolicyLevel::Creators,
                add_member: PolicyLevel::Creators,
            },
            PlaceKind::Unlocked => Policy {
                add_post: PolicyLevel::Everyone,
                add_place: PolicyLevel::NoOne,
                add_member: PolicyLevel::NoOne,
            },
        }
    }
}

/// Creates and removes places.
#[derive(Clone)]
pub struct PlaceLifecycle {
    ctx: Context,
}

impl PlaceLifecycle {
    /// Create a new lifecycle service.
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Load a place through the cache.
    pub fn get(&self, id: &PlaceId) -> Result<Place> {
        self.ctx
            .load_place(id)?
            .ok_or_else(|| Error::PlaceNotFound(id.to_string()))
    }

    /// Most recent activity of a place, newest first.
    pub fn activity(&self, id: &PlaceId, limit: usize) -> Result<Vec<ActivityRecord>> {
        self.ctx.db.read(|conn| activity::for_place(conn, id, limit))
    }

    /// Create a personal place, either a root or a child of another
    /// personal place owned by `creator`.
    pub fn create_personal_place(&self, id: &PlaceId, name: &str, creator: &AccountId) -> Result<Place> {
        self.create(id, name, creator, PlaceKind::Personal)
    }

    /// Create a shared root place.
    pub fn create_grand_place(&self, id: &PlaceId, name: &str, creator: &AccountId) -> Result<Place> {
        self.create(id, name, creator, PlaceKind::Grand)
    }

    /// Create a locked sub-place of a locked shared place.
    pub fn create_locked_place(&self, id: &PlaceId, name: &str, creator: &AccountId) -> Result<Place> {
        self.create(id, name, creator, PlaceKind::Locked)
    }

    /// Create an unlocked level-1 place under a shared grand place.
    pub fn create_unlocked_place(&self, id: &PlaceId, name: &str, creator: &AccountId) -> Result<Place> {
        self.create(id, name, creator, PlaceKind::Unlocked)
    }

    fn create(&self, id: &PlaceId, name: &str, creator: &AccountId, kind: PlaceKind) -> Result<Place> {
        let level = hierarchy::level(id);
        if level > self.ctx.config.max_place_level {
            return Err(Error::LevelLimitReached(id.to_string()));
        }
        match kind {
            PlaceKind::Grand if level != 0 => {
                return Err(Error::InvalidPlaceId(format!("{} is not a root ID", id)));
            }
            PlaceKind::Locked if level == 0 => {
                return Err(Error::InvalidPlaceId(format!("{} has no parent", id)));
            }
            PlaceKind::Unlocked if level != 1 => {
                return Err(Error::InvalidPlaceId(format!("{} is not a level-1 ID", id)));
            }
            _ => {}
        }

        let parent_id = hierarchy::parent_id(id);
        let grand_parent_id = hierarchy::grand_parent_id(id);
        let limit = self.limit_for(kind);
        let now = crate::time::now_timestamp();

        let place = Place {
            id: id.clone(),
            place_type: kind.place_type(),
            name: name.to_string(),
            description: None,
            parent_id: parent_id.clone(),
            grand_parent_id,
            level,
            privacy: kind.privacy(),
            policy: kind.policy(),
            limit,
            counter: Counter::default(),
            creator_ids: Vec::new(),
            keyholder_ids: Vec::new(),
            unlocked_children_ids: Vec::new(),
            group_id: None,
            created_at: now,
            updated_at: now,
        };

        let touched = self.ctx.db.transaction(|tx| {
            if places::exists(tx, id)? {
                return Err(Error::PlaceExists(id.to_string()));
            }
            if !accounts::exists(tx, creator)? {
                return Err(Error::AccountNotFound(creator.to_string()));
            }
            if let Some(parent_id) = &parent_id {
                let parent = places::get(tx, parent_id)?
                    .ok_or_else(|| Error::ParentNotFound(parent_id.to_string()))?;
                check_parent(&parent, kind, creator)?;
            }

            places::insert(tx, &place)?;
            let inserted = places::get(tx, id)?
                .ok_or_else(|| Error::Internal(format!("place {} vanished after insert", id)))?;
            if !join_tx(tx, &inserted, creator, MemberRole::Creator, creator, now)? {
                return Err(Error::Internal(format!("creator could not join {}", id)));
            }

            let mut touched = vec![creator.clone()];
            if let Some(parent_id) = &parent_id {
                places::bump_counter(tx, parent_id, CounterField::Children, 1, now)?;
                if kind == PlaceKind::Unlocked {
                    touched.extend(attach_unlocked_child_tx(tx, &inserted, now)?);
                }
            }

            activity::insert(tx, id, creator.as_str(), "place_added", None, now)?;
            Ok(touched)
        })?;

        if let Err(e) = self.ctx.counters.increment(kind.counter_name(), 1) {
            tracing::warn!(place_id = %id, error = %e, "Failed to bump system counter");
        }
        match self.ctx.groups.create_group(id, name) {
            Ok(group_id) => {
                self.ctx
                    .db
                    .transaction(|tx| places::set_group(tx, id, &group_id, now))?;
            }
            Err(e) => tracing::warn!(place_id = %id, error = %e, "Failed to create notification group"),
        }

        if let Some(parent_id) = &parent_id {
            self.ctx.invalidate_place(parent_id);
        }
        for account_id in &touched {
            self.ctx.invalidate_account(account_id);
        }

        let created = self
            .ctx
            .db
            .read(|conn| places::get(conn, id))?
            .ok_or_else(|| Error::PlaceNotFound(id.to_string()))?;

        tracing::info!(place_id = %id, kind = kind.counter_name(), creator = %creator, "Place created");
        self.ctx.events.emit(
            EventKind::PlaceAdded,
            json!({
                "place_id": id.as_str(),
                "creator_id": creator.as_str(),
                "kind": kind.counter_name(),
            }),
        );
        Ok(created)
    }

    fn limit_for(&self, kind: PlaceKind) -> Limit {
        let defaults = &self.ctx.config.defaults;
        match kind {
            PlaceKind::Personal => defaults.personal,
            PlaceKind::Grand => defaults.grand,
            PlaceKind::Locked => defaults.locked,
            PlaceKind::Unlocked => defaults.unlocked,
        }
    }

    /// Hard-delete a place.
    ///
    /// Returns false, writing nothing, when the place is missing or still
    /// has children. Removal also drops the place's posts, read state and
    /// activity history.
    pub fn remove(&self, id: &PlaceId, actor: &AccountId) -> Result<bool> {
        let now = crate::time::now_timestamp();
        let removed = self.ctx.db.transaction(|tx| {
            let Some(place) = places::get(tx, id)? else {
                return Ok(None);
            };
            if place.blocking_children() > 0 {
                tracing::debug!(place_id = %id, children = place.blocking_children(), "Place still has children");
                return Ok(None);
            }

            let kind = PlaceKind::of(&place);
            if let Some(parent_id) = &place.parent_id {
                places::bump_counter(tx, parent_id, CounterField::Children, -1, now)?;
                if kind == PlaceKind::Unlocked {
                    places::remove_unlocked_child(tx, &place.grand_parent_id, id)?;
                    places::bump_counter(tx, &place.grand_parent_id, CounterField::UnlockedChildren, -1, now)?;
                }
                activity::insert(tx, parent_id, actor.as_str(), "place_removed", None, now)?;
            }

            let touched = remove_all_members_tx(tx, id, now)?;
            let deleted_posts = posts::purge_place(tx, id)?;
            let (counters, markers) = reads::purge_place(tx, id)?;
            activity::delete_for_place(tx, id)?;
            places::delete(tx, id)?;

            tracing::debug!(place_id = %id, deleted_posts, counters, markers, "Place contents purged");
            Ok(Some((place, kind, touched)))
        })?;

        let Some((place, kind, touched)) = removed else {
            return Ok(false);
        };

        if let Err(e) = self.ctx.counters.increment(kind.counter_name(), -1) {
            tracing::warn!(place_id = %id, error = %e, "Failed to bump system counter");
        }

        self.ctx.invalidate_place(id);
        if let Some(parent_id) = &place.parent_id {
            self.ctx.invalidate_place(parent_id);
        }
        for account_id in &touched {
            self.ctx.invalidate_account(account_id);
        }

        tracing::info!(place_id = %id, actor = %actor, "Place removed");
        self.ctx.events.emit(
            EventKind::PlaceRemoved,
            json!({ "place_id": id.as_str(), "actor_id": actor.as_str() }),
        );
        Ok(true)
    }
}

fn check_parent(parent: &Place, kind: PlaceKind, creator: &AccountId) -> Result<()> {
    let fits = match kind {
        PlaceKind::Personal => parent.is_personal() && parent.is_creator(creator),
        PlaceKind::Locked => !parent.is_personal() && parent.privacy.locked,
        PlaceKind::Unlocked => !parent.is_personal() && parent.is_grand_place(),
        PlaceKind::Grand => false,
    };
    if !fits {
        return Err(Error::InvalidParent(parent.id.to_string()));
    }
    if !parent.has_child_capacity() {
        return Err(Error::ChildLimitReached(parent.id.to_string()));
    }
    Ok(())
}

/// Register an unlocked child on its grand place and give every grand
/// member a counter for it. Returns the grand members.
fn attach_unlocked_child_tx(conn: &Connection, child: &Place, now: i64) -> Result<Vec<AccountId>> {
    let grand_id = &child.grand_parent_id;
    places::add_unlocked_child(conn, grand_id, &child.id, now)?;
    places::bump_counter(conn, grand_id, CounterField::UnlockedChildren, 1, now)?;

    let mut members = Vec::new();
    for (account_id, _) in places::members(conn, grand_id)? {
        let waiting = reads::count_markers(conn, &account_id, &child.id)?;
        if reads::get_counter(conn, &account_id, &child.id)?.is_none() {
            reads::set_counter(conn, &account_id, &child.id, waiting)?;
        }
        members.push(account_id);
    }
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::SystemCounters;
    use crate::testing;

    fn id(raw: &str) -> PlaceId {
        PlaceId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_create_grand_place() {
        let mut env = testing::env().await;
        let alice = env.account("alice");
        env.drain_events();

        let sales = env.lifecycle().create_grand_place(&id("sales"), "Sales", &alice).unwrap();
        assert!(sales.is_grand_place());
        assert_eq!(sales.grand_parent_id, sales.id);
        assert_eq!(sales.parent_id, None);
        assert_eq!(sales.creator_ids, vec![alice.clone()]);
        assert_eq!(sales.counter.creators, 1);
        assert!(sales.group_id.is_some());
        assert!(sales.invariant_violations().is_empty());

        assert_eq!(env.ctx.db.get(GRAND_PLACES).unwrap(), 1);
        let account = env.ctx.load_account(&alice).unwrap().unwrap();
        assert!(account.has_access_to(&sales.id));

        let kinds: Vec<EventKind> = env.drain_events().into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::PlaceAdded]);

        let history = env.lifecycle().activity(&sales.id, 10).unwrap();
        let actions: Vec<&str> = history.iter().map(|a| a.action.as_str()).collect();
        assert!(actions.contains(&"place_added"));
        assert!(actions.contains(&"member_joined"));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let lifecycle = env.lifecycle();

        assert!(matches!(
            lifecycle.create_grand_place(&id("sales.eu"), "EU", &alice),
            Err(Error::InvalidPlaceId(_))
        ));
        assert!(matches!(
            lifecycle.create_locked_place(&id("sales.eu"), "EU", &alice),
            Err(Error::ParentNotFound(_))
        ));

        lifecycle.create_grand_place(&id("sales"), "Sales", &alice).unwrap();
        assert!(matches!(
            lifecycle.create_grand_place(&id("sales"), "Sales", &alice),
            Err(Error::PlaceExists(_))
        ));
        assert!(matches!(
            lifecycle.create_personal_place(&id("sales.me"), "Me", &alice),
            Err(Error::InvalidParent(_))
        ));
        assert!(matches!(
            lifecycle.create_unlocked_place(&id("sales.eu.uk"), "UK", &alice),
            Err(Error::InvalidPlaceId(_))
        ));

        let ghost = AccountId::parse("ghost").unwrap();
        assert!(matches!(
            lifecycle.create_grand_place(&id("other"), "Other", &ghost),
            Err(Error::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unlocked_places_cannot_have_children() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let sales = env.grand_place("sales", &alice);
        env.unlocked_child(&sales, "lounge", &alice);

        let result = env.lifecycle().create_locked_place(&id("sales.lounge.corner"), "Corner", &alice);
        assert!(matches!(result, Err(Error::InvalidParent(_))));
    }

    #[tokio::test]
    async fn test_personal_child_requires_owner() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let bob = env.account("bob");
        env.personal_place("alice", &alice);

        let result = env.lifecycle().create_personal_place(&id("alice.notes"), "Notes", &bob);
        assert!(matches!(result, Err(Error::InvalidParent(_))));
        assert!(env.lifecycle().create_personal_place(&id("alice.notes"), "Notes", &alice).is_ok());
    }

    #[tokio::test]
    async fn test_level_and_child_limits() {
        let mut config = crate::config::CoreConfig::default();
        config.max_place_level = 1;
        config.defaults.grand.children = 1;
        let env = testing::env_with(config).await;
        let alice = env.account("alice");
        let sales = env.grand_place("sales", &alice);
        let eu = env.locked_child(&sales, "eu", &alice);

        assert!(matches!(
            env.lifecycle().create_locked_place(&id("sales.us"), "US", &alice),
            Err(Error::ChildLimitReached(_))
        ));
        assert!(matches!(
            env.lifecycle().create_locked_place(&eu.id.child("uk").unwrap(), "UK", &alice),
            Err(Error::LevelLimitReached(_))
        ));
    }

    #[tokio::test]
    async fn test_very_deep_id_hits_level_limit() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let deep = id(&vec!["s"; 257].join("."));

        assert!(matches!(
            env.lifecycle().create_grand_place(&deep, "Deep", &alice),
            Err(Error::LevelLimitReached(_))
        ));
        assert!(env.lifecycle().get(&deep).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_parent_counters_follow_children() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let sales = env.grand_place("sales", &alice);
        let eu = env.locked_child(&sales, "eu", &alice);
        let lounge = env.unlocked_child(&sales, "lounge", &alice);

        let grand = env.reload(&sales.id);
        assert_eq!(grand.counter.children, 2);
        assert_eq!(grand.counter.unlocked_children, 1);
        assert_eq!(grand.unlocked_children_ids, vec![lounge.id.clone()]);
        assert!(grand.invariant_violations().is_empty());

        assert!(env.lifecycle().remove(&lounge.id, &alice).unwrap());
        assert!(env.lifecycle().remove(&eu.id, &alice).unwrap());
        let grand = env.reload(&sales.id);
        assert_eq!((grand.counter.children, grand.counter.unlocked_children), (0, 0));
        assert!(grand.unlocked_children_ids.is_empty());
        assert_eq!(env.ctx.db.get(UNLOCKED_PLACES).unwrap(), 0);
        assert_eq!(env.ctx.db.get(LOCKED_PLACES).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_with_children_is_rejected() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let sales = env.grand_place("sales", &alice);
        env.locked_child(&sales, "eu", &alice);
        env.locked_child(&sales, "us", &alice);
        let before = env.reload(&sales.id);

        assert!(!env.lifecycle().remove(&sales.id, &alice).unwrap());
        assert_eq!(env.reload(&sales.id), before);
    }

    #[tokio::test]
    async fn test_remove_cleans_up_everything() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let sales = env.grand_place("sales", &alice);
        let eu = env.locked_child(&sales, "eu", &alice);
        let bob = env.keyholder(&eu, "bob");
        env.accounts().bookmark_place(&bob, &eu.id).unwrap();
        let post = crate::posts::PostId::new("p1");
        env.posts().record(&post, &alice, &[eu.id.clone()]).unwrap();

        assert!(env.lifecycle().remove(&eu.id, &alice).unwrap());
        assert!(env.lifecycle().get(&eu.id).unwrap_err().is_not_found());

        let account = env.ctx.load_account(&bob).unwrap().unwrap();
        assert!(account.access_place_ids.is_empty());
        assert!(account.bookmarked_place_ids.is_empty());
        assert!(env.reads().unread_counts(&bob).unwrap().is_empty());
        assert!(env.posts().places_of(&post).unwrap().is_empty());
        assert!(!env.ctx.load_account(&alice).unwrap().unwrap().has_access_to(&eu.id));

        assert!(!env.lifecycle().remove(&eu.id, &alice).unwrap());
    }

    #[tokio::test]
    async fn test_remove_personal_root() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let home = env.personal_place("alice", &alice);
        assert_eq!(env.ctx.db.get(PERSONAL_PLACES).unwrap(), 1);

        assert!(env.lifecycle().remove(&home.id, &alice).unwrap());
        assert_eq!(env.ctx.db.get(PERSONAL_PLACES).unwrap(), 0);
    }
}
