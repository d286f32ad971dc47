//! Account rows, the account side of the membership index, bookmarks and
//! connection scores.

use rusqlite::{params, Connection, OptionalExtension};

use crate::account::{Account, AccountId};
use crate::error::Result;
use crate::place::PlaceId;

/// Insert a new account. Returns false if the ID is taken.
pub(crate) fn insert(conn: &Connection, account: &Account) -> Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO accounts (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        params![
            account.id.as_str(),
            account.name,
            account.created_at,
            account.updated_at
        ],
    )?;
    Ok(n == 1)
}

/// Load an account with its access and bookmark lists.
pub(crate) fn get(conn: &Connection, id: &AccountId) -> Result<Option<Account>> {
    let account = conn
        .query_row(
            "SELECT id, name, created_at, updated_at FROM accounts WHERE id = ?",
            params![id.as_str()],
            |row| {
                Ok(Account {
                    id: AccountId::from_stored(row.get(0)?),
                    name: row.get(1)?,
                    access_place_ids: Vec::new(),
                    bookmarked_place_ids: Vec::new(),
                    created_at: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            },
        )
        .optional()?;

    let Some(mut account) = account else {
        return Ok(None);
    };
    account.access_place_ids = place_list(conn, "account_places", id)?;
    account.bookmarked_place_ids = place_list(conn, "account_bookmarks", id)?;
    Ok(Some(account))
}

/// Whether an account row exists.
pub(crate) fn exists(conn: &Connection, id: &AccountId) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM accounts WHERE id = ?", params![id.as_str()], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

fn place_list(conn: &Connection, table: &str, id: &AccountId) -> Result<Vec<PlaceId>> {
    let sql = format!(
        "SELECT place_id FROM {} WHERE account_id = ? ORDER BY added_at, rowid",
        table
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![id.as_str()], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(PlaceId::from_stored(row?));
    }
    Ok(out)
}

// ── Access places ────────────────────────────────────────────────────

/// Record that the account can access a place.
pub(crate) fn add_access_place(conn: &Connection, id: &AccountId, place: &PlaceId, now: i64) -> Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO account_places (account_id, place_id, added_at) VALUES (?, ?, ?)",
        params![id.as_str(), place.as_str(), now],
    )?;
    Ok(n == 1)
}

/// Drop a place from the account's access list.
pub(crate) fn remove_access_place(conn: &Connection, id: &AccountId, place: &PlaceId) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM account_places WHERE account_id = ? AND place_id = ?",
        params![id.as_str(), place.as_str()],
    )?;
    Ok(n == 1)
}

/// Accounts whose access list names the place.
pub(crate) fn accounts_with_access(conn: &Connection, place: &PlaceId) -> Result<Vec<AccountId>> {
    let mut stmt = conn.prepare("SELECT account_id FROM account_places WHERE place_id = ? ORDER BY account_id")?;
    let rows = stmt.query_map(params![place.as_str()], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(AccountId::from_stored(row?));
    }
    Ok(out)
}

// ── Bookmarks ────────────────────────────────────────────────────────

/// Bookmark a place.
pub(crate) fn add_bookmark(conn: &Connection, id: &AccountId, place: &PlaceId, now: i64) -> Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO account_bookmarks (account_id, place_id, added_at) VALUES (?, ?, ?)",
        params![id.as_str(), place.as_str(), now],
    )?;
    Ok(n == 1)
}

/// Remove a bookmark.
pub(crate) fn remove_bookmark(conn: &Connection, id: &AccountId, place: &PlaceId) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM account_bookmarks WHERE account_id = ? AND place_id = ?",
        params![id.as_str(), place.as_str()],
    )?;
    Ok(n == 1)
}

/// Remove a place from every account's access list and bookmarks.
///
/// Returns the accounts that were touched.
pub(crate) fn strip_place(conn: &Connection, place: &PlaceId) -> Result<Vec<AccountId>> {
    let mut stmt = conn.prepare(
        "SELECT account_id FROM account_places WHERE place_id = ?1
         UNION SELECT account_id FROM account_bookmarks WHERE place_id = ?1",
    )?;
    let rows = stmt.query_map(params![place.as_str()], |row| row.get::<_, String>(0))?;
    let mut touched = Vec::new();
    for row in rows {
        touched.push(AccountId::from_stored(row?));
    }

    conn.execute("DELETE FROM account_places WHERE place_id = ?", params![place.as_str()])?;
    conn.execute("DELETE FROM account_bookmarks WHERE place_id = ?", params![place.as_str()])?;
    conn.execute("DELETE FROM place_connections WHERE place_id = ?", params![place.as_str()])?;
    Ok(touched)
}

// ── Connections ──────────────────────────────────────────────────────

/// Add to the account-place connection score.
pub(crate) fn bump_place_connection(conn: &Connection, id: &AccountId, place: &PlaceId, delta: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO place_connections (account_id, place_id, score) VALUES (?1, ?2, ?3)
         ON CONFLICT(account_id, place_id) DO UPDATE SET score = score + ?3",
        params![id.as_str(), place.as_str(), delta],
    )?;
    Ok(())
}

/// Add to the connection score between two accounts, in both directions.
pub(crate) fn bump_account_connection(conn: &Connection, a: &AccountId, b: &AccountId, delta: i64) -> Result<()> {
    if a == b {
        return Ok(());
    }
    for (from, to) in [(a, b), (b, a)] {
        conn.execute(
            "INSERT INTO account_connections (account_id, other_id, score) VALUES (?1, ?2, ?3)
             ON CONFLICT(account_id, other_id) DO UPDATE SET score = score + ?3",
            params![from.as_str(), to.as_str(), delta],
        )?;
    }
    Ok(())
}

/// Account-place connection score, 0 when never connected.
pub(crate) fn place_connection(conn: &Connection, id: &AccountId, place: &PlaceId) -> Result<i64> {
    let score = conn
        .query_row(
            "SELECT score FROM place_connections WHERE account_id = ? AND place_id = ?",
            params![id.as_str(), place.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(score.unwrap_or(0))
}

/// Account-account connection score, 0 when never connected.
pub(crate) fn account_connection(conn: &Connection, id: &AccountId, other: &AccountId) -> Result<i64> {
    let score = conn
        .query_row(
            "SELECT score FROM account_connections WHERE account_id = ? AND other_id = ?",
            params![id.as_str(), other.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(score.unwrap_or(0))
}
