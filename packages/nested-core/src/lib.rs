//! # Nested Core
//!
//! Authorization and consistency core of a hierarchical team-communication
//! platform: places arranged in a tree, creator / keyholder membership,
//! computed permissions and per-account unread counters.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         NESTED CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │   Place     │  │   Access    │  │ Membership  │  │ Read Track.  │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - Entity    │  │ - Creator   │  │ - Add       │  │ - Fan-out    │   │
//! │  │ - Hierarchy │  │ - Keyholder │  │ - Promote   │  │ - Mark read  │   │
//! │  │ - Invariants│  │ - Receptive │  │ - Demote    │  │ - Counters   │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘   │
//! │         │                │                │                │           │
//! │         └────────────────┴───────┬────────┴────────────────┘           │
//! │                                  │                                      │
//! │  ┌─────────────┐  ┌─────────────┐│┌─────────────────────────────────┐  │
//! │  │  Lifecycle  │  │   Storage   ││ │           Context               │  │
//! │  │             │  │             ││ │                                 │  │
//! │  │ - Create x4 │  │ - SQLite    │◄┘ │ - Cache (read-through)         │  │
//! │  │ - Remove    │  │ - Tx        │   │ - Events, groups, counters     │  │
//! │  └─────────────┘  └─────────────┘   └─────────────────────────────────┘  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`place`] - The place entity and dotted-path hierarchy
//! - [`account`] - Accounts, access lists and bookmarks
//! - [`access`] - Permission computation
//! - [`membership`] - Creator / keyholder transitions
//! - [`read_tracking`] - Unread counters and markers
//! - [`posts`] - Post placement
//! - [`lifecycle`] - Place creation and removal
//! - [`reconcile`] - Counter recomputation and orphan sweeping
//! - [`storage`] - SQLite entity store
//!
//! ## Consistency Model
//!
//! Every multi-row mutation runs in one SQLite transaction. Counters only
//! move through `x = x + n` statements, unread counters only by the number
//! of marker rows actually inserted or deleted. Cached blobs are
//! invalidated after commit and never patched.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod access;
pub mod account;
pub mod cache;
pub mod config;
pub mod context;
pub mod counters;
pub mod error;
pub mod events;
pub mod groups;
pub mod lifecycle;
pub mod membership;
pub mod place;
pub mod posts;
pub mod read_tracking;
pub mod reconcile;
pub mod storage;
pub mod time;

#[cfg(test)]
mod testing;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use access::{Access, AccessControlEngine, Permission};
pub use account::{Account, AccountId, AccountService};
pub use config::CoreConfig;
pub use context::Context;
pub use error::{Error, Result};
pub use lifecycle::{PlaceKind, PlaceLifecycle};
pub use membership::MembershipEngine;
pub use place::hierarchy::is_sub_place;
pub use place::{Place, PlaceId};
pub use posts::{PostId, PostIndex};
pub use read_tracking::ReadTrackingEngine;
pub use reconcile::{ReconcileReport, Reconciler};

// ============================================================================
// CORE INSTANCE
// ============================================================================

/// Every engine, wired to one shared [`Context`].
///
/// ## Wiring
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                           CORE WIRING                                   │
/// ├─────────────────────────────────────────────────────────────────────────┤
/// │                                                                         │
/// │   CoreConfig ──► Context::open ──► NestedCore::new                     │
/// │                                      │                                  │
/// │                                      ├── access                         │
/// │                                      ├── accounts                       │
/// │                                      ├── membership                     │
/// │                                      ├── reads                          │
/// │                                      ├── posts                          │
/// │                                      ├── lifecycle                      │
/// │                                      └── reconciler                     │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Clone)]
pub struct NestedCore {
    /// Shared handles
    pub ctx: Context,
    /// Permission computation
    pub access: AccessControlEngine,
    /// Account registration and bookmarks
    pub accounts: AccountService,
    /// Membership transitions
    pub membership: MembershipEngine,
    /// Unread counters
    pub reads: ReadTrackingEngine,
    /// Post placement
    pub posts: PostIndex,
    /// Place creation and removal
    pub lifecycle: PlaceLifecycle,
    /// Counter reconciliation
    pub reconciler: Reconciler,
}

impl NestedCore {
    /// Wire every engine to `ctx`.
    pub fn new(ctx: Context) -> Self {
        Self {
            access: AccessControlEngine::new(ctx.clone()),
            accounts: AccountService::new(ctx.clone()),
            membership: MembershipEngine::new(ctx.clone()),
            reads: ReadTrackingEngine::new(ctx.clone()),
            posts: PostIndex::new(ctx.clone()),
            lifecycle: PlaceLifecycle::new(ctx.clone()),
            reconciler: Reconciler::new(ctx.clone()),
            ctx,
        }
    }

    /// Open a fully local core.
    ///
    /// ## Example
    ///
    /// ```ignore
    /// use nested_core::{CoreConfig, NestedCore};
    ///
    /// let core = NestedCore::open(CoreConfig::from_env()).await?;
    /// ```
    pub async fn open(config: CoreConfig) -> Result<Self> {
        tracing::info!("Opening Nested Core v{}", env!("CARGO_PKG_VERSION"));
        let ctx = Context::open(config).await?;
        Ok(Self::new(ctx))
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Nested Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================
