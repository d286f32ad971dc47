//! # Place Module
//!
//! The place entity: a node of the place tree with its privacy, policy,
//! limits, counters and membership lists.
//!
//! ## Tree Shape
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            PLACE TREE                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  level 0          sales                      (grand place)             │
//! │                  /     \                                                │
//! │  level 1   sales.eu   sales.lounge           (locked / unlocked child) │
//! │               |                                                         │
//! │  level 2   sales.eu.uk                       (locked only)             │
//! │                                                                         │
//! │  Unlocked children live only at level 1 and inherit their readership   │
//! │  from the grand place. Locked places are joined explicitly.            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod hierarchy;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::error::{Error, Result};

/// Maximum length of one dotted-path segment.
pub const MAX_SEGMENT_LEN: usize = 32;

/// Dotted-path place identifier, e.g. `sales.eu.uk`.
///
/// The path encodes the position in the tree: depth is the number of
/// segments and the first segment names the grand place.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceId(String);

impl PlaceId {
    /// Parse and validate a dotted-path ID.
    ///
    /// Every segment must be 1..=32 characters of `[A-Za-z0-9_-]` starting
    /// with an alphanumeric character.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::InvalidPlaceId("empty".to_string()));
        }
        for segment in raw.split('.') {
            if !is_valid_segment(segment) {
                return Err(Error::InvalidPlaceId(raw.to_string()));
            }
        }
        Ok(Self(raw.to_string()))
    }

    /// Wrap a value read back from storage, which was validated on insert.
    pub(crate) fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    /// The ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments, root first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Build the ID of a direct child: `self + "." + segment`.
    pub fn child(&self, segment: &str) -> Result<Self> {
        if !is_valid_segment(segment) {
            return Err(Error::InvalidPlaceId(format!("{}.{}", self.0, segment)));
        }
        Ok(Self(format!("{}.{}", self.0, segment)))
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PlaceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub(crate) fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    segment.len() <= MAX_SEGMENT_LEN
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

// ============================================================================
// VALUE TYPES
// ============================================================================

/// Whether a place belongs to one account or is shared by a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceType {
    /// One creator, no keyholders, always locked
    Personal,
    /// Team place
    Shared,
}

impl PlaceType {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceType::Personal => "personal",
            PlaceType::Shared => "shared",
        }
    }

    /// Parse the storage representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "personal" => Some(PlaceType::Personal),
            "shared" => Some(PlaceType::Shared),
            _ => None,
        }
    }
}

/// Who outside the membership may write into a place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Receptive {
    /// Nobody outside the membership
    Off,
    /// Members of the grand place
    Internal,
    /// Anyone
    External,
}

impl Receptive {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Receptive::Off => "off",
            Receptive::Internal => "internal",
            Receptive::External => "external",
        }
    }

    /// Parse the storage representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "off" => Some(Receptive::Off),
            "internal" => Some(Receptive::Internal),
            "external" => Some(Receptive::External),
            _ => None,
        }
    }
}

/// Who a policy grants an action to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyLevel {
    /// Nobody
    NoOne,
    /// Creators only
    Creators,
    /// Creators and keyholders
    Everyone,
}

impl PolicyLevel {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyLevel::NoOne => "noone",
            PolicyLevel::Creators => "creators",
            PolicyLevel::Everyone => "everyone",
        }
    }

    /// Parse the storage representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "noone" => Some(PolicyLevel::NoOne),
            "creators" => Some(PolicyLevel::Creators),
            "everyone" => Some(PolicyLevel::Everyone),
            _ => None,
        }
    }
}

/// Role an account holds in a place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// Highest-privilege member
    Creator,
    /// Standard member, bounded by policy
    Keyholder,
}

impl MemberRole {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Creator => "creator",
            MemberRole::Keyholder => "keyholder",
        }
    }

    /// Parse the storage representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "creator" => Some(MemberRole::Creator),
            "keyholder" => Some(MemberRole::Keyholder),
            _ => None,
        }
    }
}

/// Privacy settings of a place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Privacy {
    /// Locked places are joined explicitly; unlocked ones inherit readers
    /// from the grand place.
    pub locked: bool,
    /// Whether the place shows up in search
    pub search: bool,
    /// Write access for non-members
    pub receptive: Receptive,
}

/// Policy settings of a place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Who may post
    pub add_post: PolicyLevel,
    /// Who may create sub-places
    pub add_place: PolicyLevel,
    /// Who may add members
    pub add_member: PolicyLevel,
}

/// Capacity limits of a place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    /// Maximum number of creators
    pub creators: i64,
    /// Maximum number of keyholders
    pub keyholders: i64,
    /// Maximum number of children
    pub children: i64,
    /// Storage quota in bytes
    pub quota: i64,
}

/// Aggregate counters of a place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    /// Number of creators
    pub creators: i64,
    /// Number of keyholders
    pub keyholders: i64,
    /// Number of children (locked and unlocked)
    pub children: i64,
    /// Number of unlocked children
    pub unlocked_children: i64,
    /// Number of posts placed here
    pub posts: i64,
    /// Bytes used
    pub quota: i64,
}

// ============================================================================
// PLACE
// ============================================================================

/// A node of the place tree, fully loaded with its membership lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Dotted-path ID
    pub id: PlaceId,
    /// Personal or shared
    pub place_type: PlaceType,
    /// Display name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Direct parent, `None` for grand places. Fixed at creation.
    pub parent_id: Option<PlaceId>,
    /// Root of this place's tree. Fixed at creation.
    pub grand_parent_id: PlaceId,
    /// 0 for grand places
    pub level: u8,
    /// Privacy settings
    pub privacy: Privacy,
    /// Policy settings
    pub policy: Policy,
    /// Capacity limits
    pub limit: Limit,
    /// Aggregate counters
    pub counter: Counter,
    /// Creators, in join order
    pub creator_ids: Vec<AccountId>,
    /// Keyholders, in join order
    pub keyholder_ids: Vec<AccountId>,
    /// Level-1 unlocked children (grand places only)
    pub unlocked_children_ids: Vec<PlaceId>,
    /// Notification group handle
    pub group_id: Option<String>,
    /// Creation time (Unix seconds)
    pub created_at: i64,
    /// Last update (Unix seconds)
    pub updated_at: i64,
}

impl Place {
    /// Whether this is a root place.
    pub fn is_grand_place(&self) -> bool {
        self.level == 0
    }

    /// Whether this is a personal place.
    pub fn is_personal(&self) -> bool {
        self.place_type == PlaceType::Personal
    }

    /// Whether the account is a creator here.
    pub fn is_creator(&self, account_id: &AccountId) -> bool {
        self.creator_ids.iter().any(|id| id == account_id)
    }

    /// Whether the account is a keyholder here.
    pub fn is_keyholder(&self, account_id: &AccountId) -> bool {
        self.keyholder_ids.iter().any(|id| id == account_id)
    }

    /// Whether the account is a creator or keyholder here.
    pub fn is_member(&self, account_id: &AccountId) -> bool {
        self.is_creator(account_id) || self.is_keyholder(account_id)
    }

    /// All members, creators first.
    pub fn members(&self) -> impl Iterator<Item = &AccountId> {
        self.creator_ids.iter().chain(self.keyholder_ids.iter())
    }

    /// Whether another creator fits under `Limit.Creators`.
    pub fn has_creator_capacity(&self) -> bool {
        (self.creator_ids.len() as i64) < self.limit.creators
    }

    /// Whether another keyholder fits under `Limit.Keyholders`.
    pub fn has_keyholder_capacity(&self) -> bool {
        (self.keyholder_ids.len() as i64) < self.limit.keyholders
    }

    /// Whether another child fits under `Limit.Children`.
    pub fn has_child_capacity(&self) -> bool {
        self.counter.children < self.limit.children
    }

    /// Total children that block removal.
    pub fn blocking_children(&self) -> i64 {
        self.counter.children + self.counter.unlocked_children
    }

    /// List every broken structural invariant, empty when the place is sound.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let depth = self.id.segments().count();

        if self.level as usize + 1 != depth {
            violations.push(format!("level {} does not match depth {}", self.level, depth));
        }
        if (self.level == 0) != (self.grand_parent_id == self.id) {
            violations.push("grand parent does not match level".to_string());
        }
        if self.is_personal() {
            if !self.privacy.locked {
                violations.push("personal place is unlocked".to_string());
            }
            if self.creator_ids.len() != 1 {
                violations.push(format!(
                    "personal place has {} creators",
                    self.creator_ids.len()
                ));
            }
            if !self.keyholder_ids.is_empty() || self.limit.keyholders != 0 {
                violations.push("personal place admits keyholders".to_string());
            }
        }
        if self.creator_ids.len() as i64 > self.limit.creators {
            violations.push("creators exceed limit".to_string());
        }
        if self.keyholder_ids.len() as i64 > self.limit.keyholders {
            violations.push("keyholders exceed limit".to_string());
        }
        if self.counter.children > self.limit.children {
            violations.push("children exceed limit".to_string());
        }
        if self.creator_ids.iter().any(|id| self.is_keyholder(id)) {
            violations.push("account is both creator and keyholder".to_string());
        }
        if !self.unlocked_children_ids.is_empty() && !self.is_grand_place() {
            violations.push("unlocked children listed on a non-grand place".to_string());
        }
        violations
    }
}
