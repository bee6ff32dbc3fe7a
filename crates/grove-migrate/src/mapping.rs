//! Source group id to target group mapping.

use std::collections::HashMap;

use serde::Serialize;

use crate::types::TargetGroup;

/// Key of the pre-seeded root entry.
pub const ROOT_KEY: u64 = 0;

/// Target side of a mapping entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedGroup {
    pub target_id: u64,
    pub target_full_path: String,
}

impl From<&TargetGroup> for MappedGroup {
    fn from(group: &TargetGroup) -> Self {
        Self {
            target_id: group.id,
            target_full_path: group.full_path.clone(),
        }
    }
}

/// Write-once map from source group id to target group.
///
/// Entry [`ROOT_KEY`] always points at the migration's target root.
#[derive(Debug, Clone, Serialize)]
pub struct GroupMapping {
    entries: HashMap<u64, MappedGroup>,
}

impl GroupMapping {
    /// Create a mapping seeded with the target root.
    pub fn new(root: &TargetGroup) -> Self {
        let mut entries = HashMap::new();
        entries.insert(ROOT_KEY, MappedGroup::from(root));
        Self { entries }
    }

    /// The target root entry.
    pub fn root(&self) -> &MappedGroup {
        &self.entries[&ROOT_KEY]
    }

    pub fn get(&self, source_id: u64) -> Option<&MappedGroup> {
        self.entries.get(&source_id)
    }

    pub fn contains(&self, source_id: u64) -> bool {
        self.entries.contains_key(&source_id)
    }

    /// Record an entry. Returns `false` and keeps the old value if the id is
    /// already mapped.
    pub fn insert(&mut self, source_id: u64, target: MappedGroup) -> bool {
        match self.entries.entry(source_id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(target);
                true
            }
        }
    }

    /// Number of entries, root included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &MappedGroup)> {
        self.entries.iter()
    }
}
