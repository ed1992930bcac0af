//! Source id → sink id mapping for parent records.

use std::collections::BTreeMap;

use crate::sink::SinkId;

/// Sink ids of the parents migrated in this run, keyed by source id.
///
/// Filled by the orchestrator while it joins parent tasks, then shared
/// read-only with child tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierMap {
    entries: BTreeMap<u64, SinkId>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a parent. Returns the previous sink id if one was stored.
    pub fn insert(&mut self, source_id: u64, sink_id: SinkId) -> Option<SinkId> {
        self.entries.insert(source_id, sink_id)
    }

    pub fn get(&self, source_id: u64) -> Option<SinkId> {
        self.entries.get(&source_id).copied()
    }

    pub fn contains(&self, source_id: u64) -> bool {
        self.entries.contains_key(&source_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, SinkId)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }
}

impl FromIterator<(u64, SinkId)> for IdentifierMap {
    fn from_iter<I: IntoIterator<Item = (u64, SinkId)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
