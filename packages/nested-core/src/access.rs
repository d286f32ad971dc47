//! # Access Control
//!
//! Computes the permission set an account holds in a place.
//!
//! ## Resolution Order
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     ACCESS RESOLUTION ORDER                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. Creator    - everything, trimmed by place type and lock state      │
//! │  2. Keyholder  - read + see members, the rest gated by Policy          │
//! │  3. Non-member - inherited through the grand place for unlocked        │
//! │                  places, write gated by Privacy.Receptive              │
//! │                                                                         │
//! │  The first matching role wins. Every key is always present in the      │
//! │  resulting map; anything not granted is false.                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use crate::account::AccountId;
use crate::context::Context;
use crate::place::{Place, PolicyLevel, Receptive};

/// Individual permission flags.
///
/// Each permission is a single bit in a u16 bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Permission {
    // ── Posts ────────────────────────────────────────────────────────────
    /// Read posts
    ReadPost = 1 << 0,
    /// Write posts
    WritePost = 1 << 1,
    /// Remove posts
    RemovePost = 1 << 2,

    // ── Places ───────────────────────────────────────────────────────────
    /// Create sub-places
    AddPlace = 1 << 3,
    /// Remove this place
    RemovePlace = 1 << 4,
    /// See the place's settings
    SeePlace = 1 << 5,

    // ── Members ──────────────────────────────────────────────────────────
    /// Add members
    AddMembers = 1 << 6,
    /// Remove members
    RemoveMembers = 1 << 7,
    /// List members
    SeeMembers = 1 << 8,

    // ── Administration ───────────────────────────────────────────────────
    /// Change settings
    Control = 1 << 9,
}

impl Permission {
    /// Every permission, in map order.
    pub const ALL: [Permission; 10] = [
        Permission::ReadPost,
        Permission::WritePost,
        Permission::RemovePost,
        Permission::AddPlace,
        Permission::RemovePlace,
        Permission::SeePlace,
        Permission::AddMembers,
        Permission::RemoveMembers,
        Permission::SeeMembers,
        Permission::Control,
    ];

    /// Key used in the permission map.
    pub fn key(&self) -> &'static str {
        match self {
            Permission::ReadPost => "read-post",
            Permission::WritePost => "write-post",
            Permission::RemovePost => "remove-post",
            Permission::AddPlace => "add-place",
            Permission::RemovePlace => "remove-place",
            Permission::SeePlace => "see-place",
            Permission::AddMembers => "add-members",
            Permission::RemoveMembers => "remove-members",
            Permission::SeeMembers => "see-members",
            Permission::Control => "control",
        }
    }
}

/// A set of permissions represented as a bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Access(u16);

impl Access {
    /// No permissions.
    pub const NONE: Access = Access(0);

    /// All ten permissions.
    pub const ALL: Access = Access((1 << 10) - 1);

    /// Get the raw bitfield value.
    pub fn bits(&self) -> u16 {
        self.0
    }

    /// Check if a specific permission is set.
    pub fn has(&self, perm: Permission) -> bool {
        self.0 & (perm as u16) != 0
    }

    /// Add a permission.
    pub fn add(&mut self, perm: Permission) {
        self.0 |= perm as u16;
    }

    /// Remove a permission.
    pub fn remove(&mut self, perm: Permission) {
        self.0 &= !(perm as u16);
    }

    /// Add `perm` when `granted` holds.
    fn grant_if(&mut self, perm: Permission, granted: bool) {
        if granted {
            self.add(perm);
        }
    }

    /// Exhaustive permission map; every key is present.
    pub fn to_map(&self) -> BTreeMap<&'static str, bool> {
        Permission::ALL
            .iter()
            .map(|perm| (perm.key(), self.has(*perm)))
            .collect()
    }
}

/// Computes [`Access`] for (place, account) pairs.
#[derive(Clone)]
pub struct AccessControlEngine {
    ctx: Context,
}

impl AccessControlEngine {
    /// Create a new engine.
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Permission set of `account_id` in `place`.
    ///
    /// Never fails: when the grand place cannot be loaded the account is
    /// treated as not being a member of it.
    pub fn get_access(&self, place: &Place, account_id: &AccountId) -> Access {
        if place.is_creator(account_id) {
            return creator_access(place);
        }
        if place.is_keyholder(account_id) {
            return keyholder_access(place);
        }
        self.non_member_access(place, account_id)
    }

    fn non_member_access(&self, place: &Place, account_id: &AccountId) -> Access {
        let mut access = Access::NONE;

        let needs_grand = !place.privacy.locked || place.privacy.receptive == Receptive::Internal;
        let grand_member = needs_grand && self.is_grand_parent_member(place, account_id);

        if !place.privacy.locked && grand_member {
            access.add(Permission::ReadPost);
            access.add(Permission::SeeMembers);
        }

        let can_write = match place.privacy.receptive {
            Receptive::Off => false,
            Receptive::Internal => grand_member,
            Receptive::External => true,
        };
        access.grant_if(Permission::WritePost, can_write);

        access
    }

    fn is_grand_parent_member(&self, place: &Place, account_id: &AccountId) -> bool {
        // A grand place is its own grand parent and the account is not a member
        if place.grand_parent_id == place.id {
            return false;
        }
        match self.ctx.load_place(&place.grand_parent_id) {
            Ok(Some(grand)) => grand.is_member(account_id),
            Ok(None) => {
                tracing::debug!(
                    place_id = %place.id,
                    grand_parent_id = %place.grand_parent_id,
                    "Grand place missing, treating account as non-member"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    place_id = %place.id,
                    grand_parent_id = %place.grand_parent_id,
                    error = %e,
                    "Failed to load grand place, treating account as non-member"
                );
                false
            }
        }
    }
}

fn creator_access(place: &Place) -> Access {
    let mut access = Access::ALL;
    if place.is_personal() {
        if place.grand_parent_id == place.id {
            access.remove(Permission::RemovePlace);
        }
        access.remove(Permission::SeeMembers);
    } else if !place.privacy.locked {
        access.remove(Permission::AddPlace);
    }
    access
}

fn keyholder_access(place: &Place) -> Access {
    let mut access = Access::NONE;
    access.add(Permission::ReadPost);
    access.add(Permission::SeeMembers);
    access.grant_if(
        Permission::AddMembers,
        place.policy.add_member == PolicyLevel::Everyone,
    );
    access.grant_if(
        Permission::AddPlace,
        place.privacy.locked && place.policy.add_place == PolicyLevel::Everyone,
    );
    access.grant_if(
        Permission::WritePost,
        place.policy.add_post == PolicyLevel::Everyone,
    );
    access
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_access_bits() {
        let mut a = Access::NONE;
        assert!(!a.has(Permission::ReadPost));
        a.add(Permission::ReadPost);
        a.add(Permission::Control);
        assert!(a.has(Permission::ReadPost));
        assert!(a.has(Permission::Control));
        a.remove(Permission::ReadPost);
        assert!(!a.has(Permission::ReadPost));
        assert!(Permission::ALL.iter().all(|p| Access::ALL.has(*p)));
    }

    #[test]
    fn test_map_is_exhaustive() {
        let map = Access::NONE.to_map();
        assert_eq!(map.len(), 10);
        assert!(map.values().all(|v| !v));
        assert!(map.contains_key("see-members"));
        assert_eq!(Access::ALL.to_map().values().filter(|v| **v).count(), 10);
    }

    #[tokio::test]
    async fn test_creator_of_personal_grand_place() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let home = env.personal_place("alice", &alice);

        let access = env.access().get_access(&home, &alice);
        assert!(access.has(Permission::Control));
        assert!(access.has(Permission::AddPlace));
        assert!(!access.has(Permission::RemovePlace));
        assert!(!access.has(Permission::SeeMembers));
    }

    #[tokio::test]
    async fn test_creator_of_personal_sub_place_may_remove_it() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let home = env.personal_place("alice", &alice);
        let notes = env.personal_child(&home, "notes", &alice);

        let access = env.access().get_access(&notes, &alice);
        assert!(access.has(Permission::RemovePlace));
        assert!(!access.has(Permission::SeeMembers));
    }

    #[tokio::test]
    async fn test_creator_of_shared_places() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let sales = env.grand_place("sales", &alice);
        let lounge = env.unlocked_child(&sales, "lounge", &alice);

        let grand_access = env.access().get_access(&sales, &alice);
        assert_eq!(grand_access, Access::ALL);

        let lounge = env.reload(&lounge.id);
        let lounge_access = env.access().get_access(&lounge, &alice);
        assert!(!lounge_access.has(Permission::AddPlace));
        assert!(lounge_access.has(Permission::RemovePlace));
    }

    #[tokio::test]
    async fn test_keyholder_follows_policy() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let bob = env.account("bob");
        let mut sales = env.grand_place("sales", &alice);
        env.membership().add_keyholder(&sales.id, &bob).unwrap();
        sales = env.reload(&sales.id);

        sales.policy.add_post = PolicyLevel::Creators;
        sales.policy.add_member = PolicyLevel::Creators;
        sales.policy.add_place = PolicyLevel::Creators;
        let access = env.access().get_access(&sales, &bob);
        assert!(access.has(Permission::ReadPost));
        assert!(access.has(Permission::SeeMembers));
        assert!(!access.has(Permission::WritePost));
        assert!(!access.has(Permission::AddMembers));
        assert!(!access.has(Permission::AddPlace));
        assert!(!access.has(Permission::SeePlace));
        assert!(!access.has(Permission::Control));

        sales.policy.add_post = PolicyLevel::Everyone;
        sales.policy.add_member = PolicyLevel::Everyone;
        sales.policy.add_place = PolicyLevel::Everyone;
        let access = env.access().get_access(&sales, &bob);
        assert!(access.has(Permission::WritePost));
        assert!(access.has(Permission::AddMembers));
        assert!(access.has(Permission::AddPlace));

        sales.privacy.locked = false;
        let access = env.access().get_access(&sales, &bob);
        assert!(!access.has(Permission::AddPlace));
    }

    #[tokio::test]
    async fn test_non_member_receptive_modes() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let bob = env.account("bob");
        let carol = env.account("carol");
        let sales = env.grand_place("sales", &alice);
        env.membership().add_keyholder(&sales.id, &bob).unwrap();
        let mut lounge = env.unlocked_child(&sales, "lounge", &alice);

        lounge.privacy.receptive = Receptive::Off;
        let bob_access = env.access().get_access(&lounge, &bob);
        assert!(bob_access.has(Permission::ReadPost));
        assert!(bob_access.has(Permission::SeeMembers));
        assert!(!bob_access.has(Permission::WritePost));
        assert_eq!(env.access().get_access(&lounge, &carol), Access::NONE);

        lounge.privacy.receptive = Receptive::Internal;
        assert!(env.access().get_access(&lounge, &bob).has(Permission::WritePost));
        assert!(!env.access().get_access(&lounge, &carol).has(Permission::WritePost));

        lounge.privacy.receptive = Receptive::External;
        let carol_access = env.access().get_access(&lounge, &carol);
        assert!(carol_access.has(Permission::WritePost));
        assert!(!carol_access.has(Permission::ReadPost));
    }

    #[tokio::test]
    async fn test_locked_place_grants_nothing_to_grand_members() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let bob = env.account("bob");
        let sales = env.grand_place("sales", &alice);
        env.membership().add_keyholder(&sales.id, &bob).unwrap();
        let eu = env.locked_child(&sales, "eu", &alice);

        assert_eq!(env.access().get_access(&eu, &bob), Access::NONE);
    }

    #[tokio::test]
    async fn test_missing_grand_place_fails_closed() {
        let env = testing::env().await;
        let alice = env.account("alice");
        let bob = env.account("bob");
        let sales = env.grand_place("sales", &alice);
        env.membership().add_keyholder(&sales.id, &bob).unwrap();
        let mut lounge = env.unlocked_child(&sales, "lounge", &alice);

        lounge.grand_parent_id = crate::place::PlaceId::parse("vanished").unwrap();
        let access = env.access().get_access(&lounge, &bob);
        assert_eq!(access, Access::NONE);
    }
}
