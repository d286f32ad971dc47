//! Post rows and the places each post is located in.

use rusqlite::{params, Connection, OptionalExtension};

use crate::account::AccountId;
use crate::error::Result;
use crate::place::PlaceId;

/// Insert a post row. Returns false if it was already known.
pub(crate) fn insert(conn: &Connection, post_id: &str, sender: &AccountId, now: i64) -> Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO posts (id, sender_id, created_at) VALUES (?, ?, ?)",
        params![post_id, sender.as_str(), now],
    )?;
    Ok(n == 1)
}

/// Sender of a post.
pub(crate) fn sender(conn: &Connection, post_id: &str) -> Result<Option<AccountId>> {
    let sender = conn
        .query_row("SELECT sender_id FROM posts WHERE id = ?", params![post_id], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    Ok(sender.map(AccountId::from_stored))
}

/// Place a post in a place. Returns false if it was already there.
pub(crate) fn attach(conn: &Connection, post_id: &str, place: &PlaceId) -> Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO post_places (post_id, place_id) VALUES (?, ?)",
        params![post_id, place.as_str()],
    )?;
    Ok(n == 1)
}

/// Take a post out of a place. Returns false if it was not there.
pub(crate) fn detach(conn: &Connection, post_id: &str, place: &PlaceId) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM post_places WHERE post_id = ? AND place_id = ?",
        params![post_id, place.as_str()],
    )?;
    Ok(n == 1)
}

/// Places a post is located in.
pub(crate) fn places_of(conn: &Connection, post_id: &str) -> Result<Vec<PlaceId>> {
    let mut stmt = conn.prepare("SELECT place_id FROM post_places WHERE post_id = ? ORDER BY place_id")?;
    let rows = stmt.query_map(params![post_id], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(PlaceId::from_stored(row?));
    }
    Ok(out)
}

/// Number of posts located in a place.
pub(crate) fn count_in_place(conn: &Connection, place: &PlaceId) -> Result<i64> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM post_places WHERE place_id = ?",
        params![place.as_str()],
        |row| row.get(0),
    )?;
    Ok(n)
}

/// Drop a place from every post and delete posts left in no place.
///
/// Returns the number of posts deleted outright.
pub(crate) fn purge_place(conn: &Connection, place: &PlaceId) -> Result<usize> {
    conn.execute("DELETE FROM post_places WHERE place_id = ?", params![place.as_str()])?;
    let deleted = conn.execute(
        "DELETE FROM posts WHERE id NOT IN (SELECT DISTINCT post_id FROM post_places)",
        [],
    )?;
    Ok(deleted)
}

/// Delete a post row once it is located nowhere.
pub(crate) fn delete_if_orphaned(conn: &Connection, post_id: &str) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM posts WHERE id = ?1 AND NOT EXISTS (SELECT 1 FROM post_places WHERE post_id = ?1)",
        params![post_id],
    )?;
    Ok(n == 1)
}
