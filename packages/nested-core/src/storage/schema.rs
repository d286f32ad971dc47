//! # Database Schema
//!
//! SQL schema definitions for the Nested core database.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐    ┌─────────────────┐      ┌─────────────────┐    │
//! │  │     places      │    │  place_members  │      │    accounts     │    │
//! │  ├─────────────────┤    ├─────────────────┤      ├─────────────────┤    │
//! │  │ id (dotted)     │◄───│ place_id        │  ┌──►│ id              │    │
//! │  │ parent_id       │    │ account_id      │──┘   │ name            │    │
//! │  │ grand_parent_id │    │ role            │      └────────┬────────┘    │
//! │  │ privacy_*       │    └─────────────────┘               │             │
//! │  │ policy_*        │                            ┌─────────┴────────┐    │
//! │  │ limit_*         │    ┌─────────────────┐     │  account_places  │    │
//! │  │ counter_*       │    │ unread_counters │     │ account_bookmarks│    │
//! │  └─────────────────┘    ├─────────────────┤     └──────────────────┘    │
//! │                         │ account_id      │                             │
//! │  ┌─────────────────┐    │ place_id        │      ┌─────────────────┐    │
//! │  │   post_places   │    │ count >= 0      │      │   post_reads    │    │
//! │  ├─────────────────┤    └─────────────────┘      ├─────────────────┤    │
//! │  │ post_id         │                             │ account_id      │    │
//! │  │ place_id        │                             │ place_id        │    │
//! │  └─────────────────┘                             │ post_id         │    │
//! │                                                  └─────────────────┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `place_members` and `account_places` are the two sides of the membership
//! index. They are only ever written together, inside one transaction.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Places
-- One row per tree node. parent_id / grand_parent_id are fixed at creation.
CREATE TABLE IF NOT EXISTS places (
    id TEXT PRIMARY KEY,
    place_type TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    parent_id TEXT,
    grand_parent_id TEXT NOT NULL,
    level INTEGER NOT NULL,
    privacy_locked INTEGER NOT NULL DEFAULT 1,
    privacy_search INTEGER NOT NULL DEFAULT 1,
    privacy_receptive TEXT NOT NULL DEFAULT 'off',
    policy_add_post TEXT NOT NULL DEFAULT 'creators',
    policy_add_place TEXT NOT NULL DEFAULT 'creators',
    policy_add_member TEXT NOT NULL DEFAULT 'creators',
    limit_creators INTEGER NOT NULL,
    limit_keyholders INTEGER NOT NULL,
    limit_children INTEGER NOT NULL,
    limit_quota INTEGER NOT NULL,
    counter_creators INTEGER NOT NULL DEFAULT 0,
    counter_keyholders INTEGER NOT NULL DEFAULT 0,
    counter_children INTEGER NOT NULL DEFAULT 0,
    counter_unlocked_children INTEGER NOT NULL DEFAULT 0,
    counter_posts INTEGER NOT NULL DEFAULT 0,
    counter_quota INTEGER NOT NULL DEFAULT 0,
    group_id TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_places_parent ON places(parent_id);
CREATE INDEX IF NOT EXISTS idx_places_grand_parent ON places(grand_parent_id);

-- Place membership
-- The composite key keeps creator and keyholder sets disjoint.
CREATE TABLE IF NOT EXISTS place_members (
    place_id TEXT NOT NULL,
    account_id TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('creator', 'keyholder')),
    joined_at INTEGER NOT NULL,
    PRIMARY KEY (place_id, account_id)
);
CREATE INDEX IF NOT EXISTS idx_place_members_account ON place_members(account_id);

-- Level-1 unlocked children of a grand place
CREATE TABLE IF NOT EXISTS place_unlocked_children (
    grand_place_id TEXT NOT NULL,
    child_id TEXT NOT NULL,
    added_at INTEGER NOT NULL,
    PRIMARY KEY (grand_place_id, child_id)
);

-- Accounts
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Account side of the membership index (AccessPlaceIDs)
CREATE TABLE IF NOT EXISTS account_places (
    account_id TEXT NOT NULL,
    place_id TEXT NOT NULL,
    added_at INTEGER NOT NULL,
    PRIMARY KEY (account_id, place_id)
);
CREATE INDEX IF NOT EXISTS idx_account_places_place ON account_places(place_id);

-- Bookmarked places
CREATE TABLE IF NOT EXISTS account_bookmarks (
    account_id TEXT NOT NULL,
    place_id TEXT NOT NULL,
    added_at INTEGER NOT NULL,
    PRIMARY KEY (account_id, place_id)
);
CREATE INDEX IF NOT EXISTS idx_account_bookmarks_place ON account_bookmarks(place_id);

-- Posts known to the core (content lives elsewhere)
CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY,
    sender_id TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Which places a post is located in
CREATE TABLE IF NOT EXISTS post_places (
    post_id TEXT NOT NULL,
    place_id TEXT NOT NULL,
    PRIMARY KEY (post_id, place_id)
);
CREATE INDEX IF NOT EXISTS idx_post_places_place ON post_places(place_id);

-- Unread counters, one per (account, place)
CREATE TABLE IF NOT EXISTS unread_counters (
    account_id TEXT NOT NULL,
    place_id TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0),
    PRIMARY KEY (account_id, place_id)
);

-- Unread markers, deleted once read
CREATE TABLE IF NOT EXISTS post_reads (
    account_id TEXT NOT NULL,
    place_id TEXT NOT NULL,
    post_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (account_id, place_id, post_id)
);
CREATE INDEX IF NOT EXISTS idx_post_reads_post ON post_reads(post_id, place_id);
CREATE INDEX IF NOT EXISTS idx_post_reads_place ON post_reads(place_id);

-- Activity history per place
CREATE TABLE IF NOT EXISTS place_activities (
    id TEXT PRIMARY KEY,
    place_id TEXT NOT NULL,
    actor_id TEXT NOT NULL,
    action TEXT NOT NULL,
    member_id TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_place_activities_place ON place_activities(place_id, created_at);

-- Connection strength (ranking)
CREATE TABLE IF NOT EXISTS place_connections (
    account_id TEXT NOT NULL,
    place_id TEXT NOT NULL,
    score INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (account_id, place_id)
);

CREATE TABLE IF NOT EXISTS account_connections (
    account_id TEXT NOT NULL,
    other_id TEXT NOT NULL,
    score INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (account_id, other_id)
);

-- Process-wide aggregate counters
CREATE TABLE IF NOT EXISTS system_counters (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL DEFAULT 0
);
"#;
