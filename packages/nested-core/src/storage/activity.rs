//! Per-place activity history.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::place::PlaceId;

/// One entry of a place's activity history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Record ID
    pub id: String,
    /// Place the activity happened in
    pub place_id: String,
    /// Account that performed it
    pub actor_id: String,
    /// Action name, e.g. `member_joined`
    pub action: String,
    /// Affected member, if any
    pub member_id: Option<String>,
    /// Unix seconds
    pub created_at: i64,
}

/// Append an activity record.
pub(crate) fn insert(
    conn: &Connection,
    place: &PlaceId,
    actor_id: &str,
    action: &str,
    member_id: Option<&str>,
    now: i64,
) -> Result<()> {
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO place_activities (id, place_id, actor_id, action, member_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![id, place.as_str(), actor_id, action, member_id, now],
    )?;
    Ok(())
}

/// Most recent activity of a place, newest first.
pub(crate) fn for_place(conn: &Connection, place: &PlaceId, limit: usize) -> Result<Vec<ActivityRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, place_id, actor_id, action, member_id, created_at
         FROM place_activities WHERE place_id = ?
         ORDER BY created_at DESC, rowid DESC LIMIT ?",
    )?;
    let rows = stmt.query_map(params![place.as_str(), limit as i64], |row| {
        Ok(ActivityRecord {
            id: row.get(0)?,
            place_id: row.get(1)?,
            actor_id: row.get(2)?,
            action: row.get(3)?,
            member_id: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Delete a place's history.
pub(crate) fn delete_for_place(conn: &Connection, place: &PlaceId) -> Result<usize> {
    let n = conn.execute("DELETE FROM place_activities WHERE place_id = ?", params![place.as_str()])?;
    Ok(n)
}
