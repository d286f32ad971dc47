//! # Place Hierarchy
//!
//! Pure functions over dotted-path IDs. These are only needed when a place
//! is created (to fix its parent / grand parent columns) and for the
//! ancestor test; everything else reads the stored `parent_id` and
//! `grand_parent_id` fields instead of re-parsing the path.

use super::PlaceId;

/// Number of segments in the path.
pub fn depth(id: &PlaceId) -> usize {
    id.segments().count()
}

/// `depth - 1`; 0 for grand places. Saturates at `u8::MAX`.
pub fn level(id: &PlaceId) -> u8 {
    u8::try_from(depth(id).saturating_sub(1)).unwrap_or(u8::MAX)
}

/// The path minus its last segment, `None` for level-0 IDs.
pub fn parent_id(id: &PlaceId) -> Option<PlaceId> {
    id.as_str()
        .rfind('.')
        .map(|idx| PlaceId::from_stored(id.as_str()[..idx].to_string()))
}

/// The first segment of the path.
pub fn grand_parent_id(id: &PlaceId) -> PlaceId {
    let root = id.segments().next().unwrap_or_default();
    PlaceId::from_stored(root.to_string())
}

/// True iff `b` lies anywhere below `a` (any depth difference).
///
/// Matching is segment-aware: `sales` is not an ancestor of `salesforce`.
pub fn is_sub_place(a: &str, b: &str) -> bool {
    b.len() > a.len() + 1 && b.starts_with(a) && b.as_bytes()[a.len()] == b'.' && !a.is_empty()
}

/// Every ancestor of `id`, nearest first, ending with the grand place.
pub fn ancestors(id: &PlaceId) -> Vec<PlaceId> {
    let mut out = Vec::new();
    let mut current = parent_id(id);
    while let Some(parent) = current {
        current = parent_id(&parent);
        out.push(parent);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> PlaceId {
        PlaceId::parse(raw).unwrap()
    }

    #[test]
    fn test_is_sub_place() {
        assert!(is_sub_place("sales", "sales.eu"));
        assert!(is_sub_place("sales", "sales.eu.uk"));
        assert!(!is_sub_place("sales", "salesforce"));
        assert!(!is_sub_place("sales", "sales"));
        assert!(!is_sub_place("sales.eu", "sales"));
        assert!(!is_sub_place("", ".x"));
    }

    #[test]
    fn test_parent_id() {
        assert_eq!(parent_id(&id("sales.eu.uk")), Some(id("sales.eu")));
        assert_eq!(parent_id(&id("sales.eu")), Some(id("sales")));
        assert_eq!(parent_id(&id("sales")), None);
    }

    #[test]
    fn test_grand_parent_and_level() {
        assert_eq!(grand_parent_id(&id("sales.eu.uk")), id("sales"));
        assert_eq!(grand_parent_id(&id("sales")), id("sales"));
        assert_eq!(level(&id("sales")), 0);
        assert_eq!(level(&id("sales.eu.uk")), 2);
        assert_eq!(depth(&id("sales.eu.uk")), 3);
    }

    #[test]
    fn test_level_saturates_for_very_deep_paths() {
        let deep = id(&vec!["s"; 257].join("."));
        assert_eq!(depth(&deep), 257);
        assert_eq!(level(&deep), u8::MAX);
    }

    #[test]
    fn test_ancestors_nearest_first() {
        assert_eq!(ancestors(&id("a.b.c")), vec![id("a.b"), id("a")]);
        assert!(ancestors(&id("a")).is_empty());
    }
}
