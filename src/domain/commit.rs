//! CommitRegistryEntry: one record of a revision created during a run.

use serde::{Deserialize, Serialize};

use super::store::now_ms;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRegistryEntry {
    pub task_id: String,
    pub iteration: u32,
    pub revision_hash: String,
    pub tag_name: Option<String>,
    pub message: String,
    pub timestamp: i64,
}

impl CommitRegistryEntry {
    pub fn new(
        task_id: impl Into<String>,
        iteration: u32,
        revision_hash: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            iteration,
            revision_hash: revision_hash.into(),
            tag_name: None,
            message: message.into(),
            timestamp: now_ms(),
        }
    }

    pub fn with_tag(mut self, tag_name: impl Into<String>) -> Self {
        self.tag_name = Some(tag_name.into());
        self
    }
}

/// Per-run registry keyed by (task_id, iteration); at most one entry per key.
#[derive(Debug, Clone, Default)]
pub struct CommitRegistry {
    entries: Vec<CommitRegistryEntry>,
}

impl CommitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the entry unless one already exists for (task_id, iteration).
    /// Returns false when the slot was already taken.
    pub fn record(&mut self, entry: CommitRegistryEntry) -> bool {
        let exists = self
            .entries
            .iter()
            .any(|e| e.task_id == entry.task_id && e.iteration == entry.iteration);
        if exists {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn for_task(&self, task_id: &str) -> Vec<&CommitRegistryEntry> {
        self.entries.iter().filter(|e| e.task_id == task_id).collect()
    }

    pub fn revision_for(&self, task_id: &str, iteration: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.task_id == task_id && e.iteration == iteration)
            .map(|e| e.revision_hash.as_str())
    }

    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| e.tag_name.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_rejects_duplicate_slot() {
        let mut reg = CommitRegistry::new();
        assert!(reg.record(CommitRegistryEntry::new("t1", 1, "abc", "msg")));
        assert!(!reg.record(CommitRegistryEntry::new("t1", 1, "def", "msg2")));
    }

    #[test]
    fn revision_for_looks_up_by_task_and_iteration() {
        let mut reg = CommitRegistry::new();
        reg.record(CommitRegistryEntry::new("t1", 1, "abc", "msg"));
        assert_eq!(reg.revision_for("t1", 1), Some("abc"));
        assert_eq!(reg.revision_for("t1", 2), None);
    }
}
