//! Place rows, membership rows and unlocked-children rows.

use rusqlite::{params, Connection, OptionalExtension};

use super::column_enum;
use crate::account::AccountId;
use crate::error::Result;
use crate::place::{
    Counter, Limit, MemberRole, Place, PlaceId, PlaceType, Policy, PolicyLevel, Privacy,
    Receptive,
};

/// Counter columns that may be bumped atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CounterField {
    Creators,
    Keyholders,
    Children,
    UnlockedChildren,
    Posts,
}

impl CounterField {
    fn column(&self) -> &'static str {
        match self {
            CounterField::Creators => "counter_creators",
            CounterField::Keyholders => "counter_keyholders",
            CounterField::Children => "counter_children",
            CounterField::UnlockedChildren => "counter_unlocked_children",
            CounterField::Posts => "counter_posts",
        }
    }
}

const PLACE_COLUMNS: &str = "id, place_type, name, description, parent_id, grand_parent_id, level,
    privacy_locked, privacy_search, privacy_receptive,
    policy_add_post, policy_add_place, policy_add_member,
    limit_creators, limit_keyholders, limit_children, limit_quota,
    counter_creators, counter_keyholders, counter_children, counter_unlocked_children,
    counter_posts, counter_quota, group_id, created_at, updated_at";

/// Insert a new place row. Membership lists on `place` are ignored.
pub(crate) fn insert(conn: &Connection, place: &Place) -> Result<()> {
    conn.execute(
        "INSERT INTO places (id, place_type, name, description, parent_id, grand_parent_id, level,
            privacy_locked, privacy_search, privacy_receptive,
            policy_add_post, policy_add_place, policy_add_member,
            limit_creators, limit_keyholders, limit_children, limit_quota,
            group_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            place.id.as_str(),
            place.place_type.as_str(),
            place.name,
            place.description,
            place.parent_id.as_ref().map(|p| p.as_str()),
            place.grand_parent_id.as_str(),
            place.level,
            place.privacy.locked,
            place.privacy.search,
            place.privacy.receptive.as_str(),
            place.policy.add_post.as_str(),
            place.policy.add_place.as_str(),
            place.policy.add_member.as_str(),
            place.limit.creators,
            place.limit.keyholders,
            place.limit.children,
            place.limit.quota,
            place.group_id,
            place.created_at,
            place.updated_at,
        ],
    )?;
    Ok(())
}

/// Whether a place row exists.
pub(crate) fn exists(conn: &Connection, id: &PlaceId) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM places WHERE id = ?", params![id.as_str()], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

/// Load a place together with its membership and unlocked-children lists.
pub(crate) fn get(conn: &Connection, id: &PlaceId) -> Result<Option<Place>> {
    let sql = format!("SELECT {} FROM places WHERE id = ?", PLACE_COLUMNS);
    let place = conn
        .query_row(&sql, params![id.as_str()], |row| {
            let parent: Option<String> = row.get(4)?;
            Ok(Place {
                id: PlaceId::from_stored(row.get(0)?),
                place_type: column_enum(row, 1, PlaceType::parse)?,
                name: row.get(2)?,
                description: row.get(3)?,
                parent_id: parent.map(PlaceId::from_stored),
                grand_parent_id: PlaceId::from_stored(row.get(5)?),
                level: row.get(6)?,
                privacy: Privacy {
                    locked: row.get(7)?,
                    search: row.get(8)?,
                    receptive: column_enum(row, 9, Receptive::parse)?,
                },
                policy: Policy {
                    add_post: column_enum(row, 10, PolicyLevel::parse)?,
                    add_place: column_enum(row, 11, PolicyLevel::parse)?,
                    add_member: column_enum(row, 12, PolicyLevel::parse)?,
                },
                limit: Limit {
                    creators: row.get(13)?,
                    keyholders: row.get(14)?,
                    children: row.get(15)?,
                    quota: row.get(16)?,
                },
                counter: Counter {
                    creators: row.get(17)?,
                    keyholders: row.get(18)?,
                    children: row.get(19)?,
                    unlocked_children: row.get(20)?,
                    posts: row.get(21)?,
                    quota: row.get(22)?,
                },
                creator_ids: Vec::new(),
                keyholder_ids: Vec::new(),
                unlocked_children_ids: Vec::new(),
                group_id: row.get(23)?,
                created_at: row.get(24)?,
                updated_at: row.get(25)?,
            })
        })
        .optional()?;

    let Some(mut place) = place else {
        return Ok(None);
    };

    for (account_id, role) in members(conn, id)? {
        match role {
            MemberRole::Creator => place.creator_ids.push(account_id),
            MemberRole::Keyholder => place.keyholder_ids.push(account_id),
        }
    }
    place.unlocked_children_ids = unlocked_children(conn, id)?;

    Ok(Some(place))
}

/// Delete a place row and the unlocked-children rows it owns.
pub(crate) fn delete(conn: &Connection, id: &PlaceId) -> Result<bool> {
    conn.execute(
        "DELETE FROM place_unlocked_children WHERE grand_place_id = ?",
        params![id.as_str()],
    )?;
    let n = conn.execute("DELETE FROM places WHERE id = ?", params![id.as_str()])?;
    Ok(n == 1)
}

/// Set the notification group handle.
pub(crate) fn set_group(conn: &Connection, id: &PlaceId, group_id: &str, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE places SET group_id = ?, updated_at = ? WHERE id = ?",
        params![group_id, now, id.as_str()],
    )?;
    Ok(())
}

/// Atomically add `delta` to a counter column, clamping at zero.
pub(crate) fn bump_counter(
    conn: &Connection,
    id: &PlaceId,
    field: CounterField,
    delta: i64,
    now: i64,
) -> Result<()> {
    let column = field.column();
    let sql = format!(
        "UPDATE places SET {col} = MAX({col} + ?, 0), updated_at = ? WHERE id = ?",
        col = column
    );
    conn.execute(&sql, params![delta, now, id.as_str()])?;
    Ok(())
}

/// Overwrite a counter column (reconciliation only).
pub(crate) fn set_counter(conn: &Connection, id: &PlaceId, field: CounterField, value: i64) -> Result<()> {
    let sql = format!("UPDATE places SET {} = ? WHERE id = ?", field.column());
    conn.execute(&sql, params![value, id.as_str()])?;
    Ok(())
}

/// IDs of every place.
pub(crate) fn all_ids(conn: &Connection) -> Result<Vec<PlaceId>> {
    let mut stmt = conn.prepare("SELECT id FROM places ORDER BY id")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(PlaceId::from_stored(row?));
    }
    Ok(ids)
}

/// Direct children as `(id, locked)` pairs.
pub(crate) fn children(conn: &Connection, parent: &PlaceId) -> Result<Vec<(PlaceId, bool)>> {
    let mut stmt = conn.prepare("SELECT id, privacy_locked FROM places WHERE parent_id = ? ORDER BY id")?;
    let rows = stmt.query_map(params![parent.as_str()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, locked) = row?;
        out.push((PlaceId::from_stored(id), locked));
    }
    Ok(out)
}

// ── Members ──────────────────────────────────────────────────────────

/// Members in join order.
pub(crate) fn members(conn: &Connection, id: &PlaceId) -> Result<Vec<(AccountId, MemberRole)>> {
    let mut stmt = conn.prepare(
        "SELECT account_id, role FROM place_members WHERE place_id = ? ORDER BY joined_at, rowid",
    )?;
    let rows = stmt.query_map(params![id.as_str()], |row| {
        Ok((
            AccountId::from_stored(row.get(0)?),
            column_enum(row, 1, MemberRole::parse)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Insert a membership row. Returns false if the account already holds a role.
pub(crate) fn add_member(
    conn: &Connection,
    id: &PlaceId,
    account: &AccountId,
    role: MemberRole,
    now: i64,
) -> Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO place_members (place_id, account_id, role, joined_at) VALUES (?, ?, ?, ?)",
        params![id.as_str(), account.as_str(), role.as_str(), now],
    )?;
    Ok(n == 1)
}

/// Move an account from one role to the other. Returns false if it did not hold `from`.
pub(crate) fn change_role(
    conn: &Connection,
    id: &PlaceId,
    account: &AccountId,
    from: MemberRole,
    to: MemberRole,
) -> Result<bool> {
    let n = conn.execute(
        "UPDATE place_members SET role = ? WHERE place_id = ? AND account_id = ? AND role = ?",
        params![to.as_str(), id.as_str(), account.as_str(), from.as_str()],
    )?;
    Ok(n == 1)
}

/// Delete a membership row. Returns false if the account did not hold `role`.
pub(crate) fn remove_member(
    conn: &Connection,
    id: &PlaceId,
    account: &AccountId,
    role: MemberRole,
) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM place_members WHERE place_id = ? AND account_id = ? AND role = ?",
        params![id.as_str(), account.as_str(), role.as_str()],
    )?;
    Ok(n == 1)
}

/// Delete every membership row of a place and zero its member counters.
pub(crate) fn clear_members(conn: &Connection, id: &PlaceId, now: i64) -> Result<Vec<AccountId>> {
    let removed: Vec<AccountId> = members(conn, id)?.into_iter().map(|(a, _)| a).collect();
    conn.execute("DELETE FROM place_members WHERE place_id = ?", params![id.as_str()])?;
    conn.execute(
        "UPDATE places SET counter_creators = 0, counter_keyholders = 0, updated_at = ? WHERE id = ?",
        params![now, id.as_str()],
    )?;
    Ok(removed)
}

/// Count membership rows per role, for reconciliation.
pub(crate) fn count_members(conn: &Connection, id: &PlaceId, role: MemberRole) -> Result<i64> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM place_members WHERE place_id = ? AND role = ?",
        params![id.as_str(), role.as_str()],
        |row| row.get(0),
    )?;
    Ok(n)
}

// ── Unlocked children ────────────────────────────────────────────────

/// Unlocked children of a grand place, in insertion order.
pub(crate) fn unlocked_children(conn: &Connection, grand: &PlaceId) -> Result<Vec<PlaceId>> {
    let mut stmt = conn.prepare(
        "SELECT child_id FROM place_unlocked_children WHERE grand_place_id = ? ORDER BY added_at, rowid",
    )?;
    let rows = stmt.query_map(params![grand.as_str()], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(PlaceId::from_stored(row?));
    }
    Ok(out)
}

/// Record an unlocked child on its grand place.
pub(crate) fn add_unlocked_child(conn: &Connection, grand: &PlaceId, child: &PlaceId, now: i64) -> Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO place_unlocked_children (grand_place_id, child_id, added_at) VALUES (?, ?, ?)",
        params![grand.as_str(), child.as_str(), now],
    )?;
    Ok(n == 1)
}

/// Drop an unlocked child from its grand place.
pub(crate) fn remove_unlocked_child(conn: &Connection, grand: &PlaceId, child: &PlaceId) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM place_unlocked_children WHERE grand_place_id = ? AND child_id = ?",
        params![grand.as_str(), child.as_str()],
    )?;
    Ok(n == 1)
}
