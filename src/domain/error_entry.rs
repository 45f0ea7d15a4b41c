//! ErrorEntry: a single observation fed into the ErrorAggregator.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Build,
    Lint,
    Test,
    Review,
    Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub path: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub code: Option<String>,
    pub fix_suggestion: Option<String>,
    pub iteration: u32,
}

impl ErrorEntry {
    pub fn new(kind: ErrorKind, severity: Severity, message: impl Into<String>, iteration: u32) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            path: None,
            line: None,
            column: None,
            code: None,
            fix_suggestion: None,
            iteration,
        }
    }

    pub fn with_location(mut self, path: impl Into<String>, line: u32) -> Self {
        self.path = Some(path.into());
        self.line = Some(line);
        self
    }

    /// Deduplication key: (kind, message, path, line). On a duplicate,
    /// the caller keeps whichever entry has the higher iteration.
    pub fn dedup_key(&self) -> (ErrorKind, String, Option<String>, Option<u32>) {
        (self.kind, self.message.clone(), self.path.clone(), self.line)
    }
}
