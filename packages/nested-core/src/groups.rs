//! Notification group collaborator.
//!
//! The core only needs an opaque recipient-group handle per place; it never
//! looks inside.

use dashmap::DashMap;

use crate::error::Result;
use crate::place::PlaceId;

/// Creates notification groups.
pub trait GroupDirectory: Send + Sync {
    /// Create the recipient group for a place and return its handle.
    fn create_group(&self, place_id: &PlaceId, name: &str) -> Result<String>;
}

/// In-process group directory.
#[derive(Debug, Default)]
pub struct LocalGroupDirectory {
    groups: DashMap<String, (PlaceId, String)>,
}

impl LocalGroupDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up which place a group handle belongs to.
    pub fn place_of(&self, group_id: &str) -> Option<PlaceId> {
        self.groups.get(group_id).map(|entry| entry.0.clone())
    }
}

impl GroupDirectory for LocalGroupDirectory {
    fn create_group(&self, place_id: &PlaceId, name: &str) -> Result<String> {
        let group_id = uuid::Uuid::new_v4().simple().to_string();
        self.groups
            .insert(group_id.clone(), (place_id.clone(), name.to_string()));
        Ok(group_id)
    }
}
