//! Unread counters and unread markers.
//!
//! A `post_reads` row is the marker "this account has not read this post in
//! this place". Its primary key makes marker inserts idempotent, and every
//! counter change is derived from the number of marker rows actually
//! inserted or deleted.

use rusqlite::{params, Connection, OptionalExtension};

use crate::account::AccountId;
use crate::error::Result;
use crate::place::PlaceId;

/// Insert an unread marker. Returns false if it already existed.
pub(crate) fn insert_marker(
    conn: &Connection,
    account: &AccountId,
    place: &PlaceId,
    post_id: &str,
    now: i64,
) -> Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO post_reads (account_id, place_id, post_id, created_at) VALUES (?, ?, ?, ?)",
        params![account.as_str(), place.as_str(), post_id, now],
    )?;
    Ok(n == 1)
}

/// Delete every marker the account holds in a place. Returns the number deleted.
pub(crate) fn delete_markers_in_place(conn: &Connection, account: &AccountId, place: &PlaceId) -> Result<i64> {
    let n = conn.execute(
        "DELETE FROM post_reads WHERE account_id = ? AND place_id = ?",
        params![account.as_str(), place.as_str()],
    )?;
    Ok(n as i64)
}

/// Delete every marker of a post in one place, returning the accounts that held one.
pub(crate) fn delete_markers_for_post(conn: &Connection, place: &PlaceId, post_id: &str) -> Result<Vec<AccountId>> {
    let mut stmt = conn.prepare(
        "DELETE FROM post_reads WHERE place_id = ? AND post_id = ? RETURNING account_id",
    )?;
    let rows = stmt.query_map(params![place.as_str(), post_id], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(AccountId::from_stored(row?));
    }
    Ok(out)
}

/// Delete the account's markers for a post in every place, returning those places.
pub(crate) fn delete_markers_for_account_post(
    conn: &Connection,
    account: &AccountId,
    post_id: &str,
) -> Result<Vec<PlaceId>> {
    let mut stmt = conn.prepare(
        "DELETE FROM post_reads WHERE account_id = ? AND post_id = ? RETURNING place_id",
    )?;
    let rows = stmt.query_map(params![account.as_str(), post_id], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(PlaceId::from_stored(row?));
    }
    Ok(out)
}

/// Places in which some account still has a marker for the post.
pub(crate) fn places_with_markers(conn: &Connection, post_id: &str) -> Result<Vec<PlaceId>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT place_id FROM post_reads WHERE post_id = ? ORDER BY place_id",
    )?;
    let rows = stmt.query_map(params![post_id], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(PlaceId::from_stored(row?));
    }
    Ok(out)
}

/// Number of markers the account holds in a place.
pub(crate) fn count_markers(conn: &Connection, account: &AccountId, place: &PlaceId) -> Result<i64> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM post_reads WHERE account_id = ? AND place_id = ?",
        params![account.as_str(), place.as_str()],
        |row| row.get(0),
    )?;
    Ok(n)
}

/// Every `(account, place, markers)` triple, for reconciliation.
pub(crate) fn marker_totals(conn: &Connection) -> Result<Vec<(AccountId, PlaceId, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT account_id, place_id, COUNT(*) FROM post_reads GROUP BY account_id, place_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (a, p, n) = row?;
        out.push((AccountId::from_stored(a), PlaceId::from_stored(p), n));
    }
    Ok(out)
}

// ── Counters ─────────────────────────────────────────────────────────

/// Add `delta` to a counter, creating it when absent. Never goes below zero.
pub(crate) fn bump_counter(conn: &Connection, account: &AccountId, place: &PlaceId, delta: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO unread_counters (account_id, place_id, count) VALUES (?1, ?2, MAX(?3, 0))
         ON CONFLICT(account_id, place_id) DO UPDATE SET count = MAX(count + ?3, 0)",
        params![account.as_str(), place.as_str(), delta],
    )?;
    Ok(())
}

/// Overwrite a counter, creating it when absent.
pub(crate) fn set_counter(conn: &Connection, account: &AccountId, place: &PlaceId, count: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO unread_counters (account_id, place_id, count) VALUES (?1, ?2, MAX(?3, 0))
         ON CONFLICT(account_id, place_id) DO UPDATE SET count = MAX(?3, 0)",
        params![account.as_str(), place.as_str(), count],
    )?;
    Ok(())
}

/// Current counter, `None` when the account has no counter for the place.
pub(crate) fn get_counter(conn: &Connection, account: &AccountId, place: &PlaceId) -> Result<Option<i64>> {
    let count = conn
        .query_row(
            "SELECT count FROM unread_counters WHERE account_id = ? AND place_id = ?",
            params![account.as_str(), place.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(count)
}

/// Every counter the account holds, ordered by place.
pub(crate) fn counters_for_account(conn: &Connection, account: &AccountId) -> Result<Vec<(PlaceId, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT place_id, count FROM unread_counters WHERE account_id = ? ORDER BY place_id",
    )?;
    let rows = stmt.query_map(params![account.as_str()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (place, count) = row?;
        out.push((PlaceId::from_stored(place), count));
    }
    Ok(out)
}

/// Every counter in the store, for reconciliation.
pub(crate) fn all_counters(conn: &Connection) -> Result<Vec<(AccountId, PlaceId, i64)>> {
    let mut stmt = conn.prepare("SELECT account_id, place_id, count FROM unread_counters")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (a, p, n) = row?;
        out.push((AccountId::from_stored(a), PlaceId::from_stored(p), n));
    }
    Ok(out)
}

/// Delete the account's counter for a place.
pub(crate) fn delete_counter(conn: &Connection, account: &AccountId, place: &PlaceId) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM unread_counters WHERE account_id = ? AND place_id = ?",
        params![account.as_str(), place.as_str()],
    )?;
    Ok(n == 1)
}

// ── Cleanup ──────────────────────────────────────────────────────────

/// Delete all counters and markers of a place. Returns `(counters, markers)` deleted.
pub(crate) fn purge_place(conn: &Connection, place: &PlaceId) -> Result<(usize, usize)> {
    let counters = conn.execute("DELETE FROM unread_counters WHERE place_id = ?", params![place.as_str()])?;
    let markers = conn.execute("DELETE FROM post_reads WHERE place_id = ?", params![place.as_str()])?;
    Ok((counters, markers))
}

/// Delete counters and markers whose place no longer exists.
pub(crate) fn sweep_orphans(conn: &Connection) -> Result<(usize, usize)> {
    let counters = conn.execute(
        "DELETE FROM unread_counters WHERE place_id NOT IN (SELECT id FROM places)",
        [],
    )?;
    let markers = conn.execute(
        "DELETE FROM post_reads WHERE place_id NOT IN (SELECT id FROM places)",
        [],
    )?;
    Ok((counters, markers))
}
