//! Diff: a derived comparison between two revisions. Never the source of truth.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub kind: FileChangeKind,
    pub additions: usize,
    pub deletions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diff {
    pub from_revision: String,
    pub to_revision: String,
    pub files: Vec<FileChange>,
    pub raw: String,
}

impl Diff {
    pub fn new(from_revision: impl Into<String>, to_revision: impl Into<String>) -> Self {
        Self {
            from_revision: from_revision.into(),
            to_revision: to_revision.into(),
            files: Vec::new(),
            raw: String::new(),
        }
    }

    pub fn total_additions(&self) -> usize {
        self.files.iter().map(|f| f.additions).sum()
    }

    pub fn total_deletions(&self) -> usize {
        self.files.iter().map(|f| f.deletions).sum()
    }

    pub fn summary(&self) -> String {
        if self.files.is_empty() {
            return "no changes".to_string();
        }
        format!(
            "{} file(s) changed, +{} -{}",
            self.files.len(),
            self.total_additions(),
            self.total_deletions()
        )
    }
}
