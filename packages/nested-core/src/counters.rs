//! Process-wide aggregate counters (place statistics).

use crate::error::Result;

/// Personal places created minus removed.
pub const PERSONAL_PLACES: &str = "places.personal";
/// Shared grand places created minus removed.
pub const GRAND_PLACES: &str = "places.grand";
/// Locked sub-places created minus removed.
pub const LOCKED_PLACES: &str = "places.locked";
/// Unlocked places created minus removed.
pub const UNLOCKED_PLACES: &str = "places.unlocked";

/// Aggregate statistics collaborator.
pub trait SystemCounters: Send + Sync {
    /// Atomically add `delta` to the named counter.
    fn increment(&self, name: &str, delta: i64) -> Result<()>;

    /// Current value, 0 for unknown counters.
    fn get(&self, name: &str) -> Result<i64>;
}
