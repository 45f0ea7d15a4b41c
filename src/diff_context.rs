//! DiffContextBuilder: turns revision-system output into a bounded,
//! formatted diff suitable for feeding into an agent's context.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::collab::RevisionSystem;
use crate::domain::{Diff, FileChange, FileChangeKind};

const CHARS_PER_TOKEN: usize = 4;
const DEFAULT_MAX_TOKENS: usize = 5_000;
const DEFAULT_MAX_LINES_PER_FILE: usize = 50;

#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub max_tokens: usize,
    pub full_hunks: bool,
    pub max_lines_per_file: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            full_hunks: true,
            max_lines_per_file: DEFAULT_MAX_LINES_PER_FILE,
        }
    }
}

pub struct DiffContextBuilder {
    revisions: Arc<dyn RevisionSystem>,
}

impl DiffContextBuilder {
    pub fn new(revisions: Arc<dyn RevisionSystem>) -> Self {
        Self { revisions }
    }

    /// Diff from `from_rev` to `to_rev`, defaulting `to_rev` to the
    /// working copy tip. Unknown-revision errors degrade to an empty
    /// Diff carrying an explanatory text rather than propagating.
    pub async fn diff_between(&self, from_rev: &str, to_rev: Option<&str>) -> Diff {
        let to_rev = match to_rev {
            Some(rev) => rev.to_string(),
            None => match self.revisions.head().await {
                Ok(head) => head,
                Err(e) => {
                    warn!(%e, "DiffContextBuilder::diff_between: failed to resolve working copy tip");
                    return Self::empty_diff(from_rev, "HEAD", &e.to_string());
                }
            },
        };

        let raw = match self
            .revisions
            .run(&["diff", "--numstat", from_rev, &to_rev])
            .await
        {
            Ok(output) => output,
            Err(e) => {
                debug!(%e, "DiffContextBuilder::diff_between: numstat failed");
                return Self::empty_diff(from_rev, &to_rev, &e.to_string());
            }
        };

        let full = self
            .revisions
            .run(&["diff", from_rev, &to_rev])
            .await
            .unwrap_or_default();

        let mut diff = Diff::new(from_rev, to_rev);
        diff.raw = full;
        diff.files = Self::parse_numstat(&raw);
        diff
    }

    /// Diff from `base_rev` to the current working copy tip.
    pub async fn cumulative_diff(&self, base_rev: &str) -> Diff {
        self.diff_between(base_rev, None).await
    }

    fn empty_diff(from_rev: &str, to_rev: &str, reason: &str) -> Diff {
        let mut diff = Diff::new(from_rev, to_rev);
        diff.raw = format!("(diff unavailable: {reason})");
        diff
    }

    fn parse_numstat(numstat: &str) -> Vec<FileChange> {
        numstat
            .lines()
            .filter(|l| !l.is_empty())
            .filter_map(|line| {
                let mut parts = line.splitn(3, '\t');
                let additions = parts.next()?;
                let deletions = parts.next()?;
                let path = parts.next()?.to_string();

                let (additions, deletions) = if additions == "-" || deletions == "-" {
                    (0, 0)
                } else {
                    (additions.parse().unwrap_or(0), deletions.parse().unwrap_or(0))
                };

                let kind = if path.contains("=>") {
                    FileChangeKind::Renamed
                } else if additions > 0 && deletions == 0 {
                    FileChangeKind::Added
                } else if additions == 0 && deletions > 0 {
                    FileChangeKind::Deleted
                } else {
                    FileChangeKind::Modified
                };

                Some(FileChange {
                    path,
                    kind,
                    additions,
                    deletions,
                })
            })
            .collect()
    }

    /// Renders a Diff as text bounded by `options.max_tokens`, truncating
    /// per-file hunk content at line boundaries with an explicit marker.
    pub fn format(diff: &Diff, options: &FormatOptions) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Diff {}..{}: {}\n",
            diff.from_revision,
            diff.to_revision,
            diff.summary()
        ));

        if !options.full_hunks {
            for file in &diff.files {
                out.push_str(&format!(
                    "  {:?} {} (+{}/-{})\n",
                    file.kind, file.path, file.additions, file.deletions
                ));
            }
            return Self::truncate_to_budget(&out, options.max_tokens);
        }

        for file_lines in Self::split_into_files(&diff.raw) {
            if file_lines.len() > options.max_lines_per_file {
                for line in file_lines.iter().take(options.max_lines_per_file) {
                    out.push_str(line);
                    out.push('\n');
                }
                out.push_str("... (content truncated)\n");
            } else {
                for line in file_lines {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }

        Self::truncate_to_budget(&out, options.max_tokens)
    }

    /// Splits a raw unified diff into per-file line groups on `diff --git`
    /// headers, so the per-file line cap can't let one large file starve
    /// the rest of the diff.
    fn split_into_files(raw: &str) -> Vec<Vec<&str>> {
        let mut files: Vec<Vec<&str>> = Vec::new();
        for line in raw.lines() {
            if files.is_empty() || line.starts_with("diff --git ") {
                files.push(vec![line]);
            } else {
                files.last_mut().expect("just pushed or non-empty").push(line);
            }
        }
        files
    }

    fn truncate_to_budget(text: &str, max_tokens: usize) -> String {
        let budget_chars = max_tokens * CHARS_PER_TOKEN;
        if text.len() <= budget_chars {
            return text.to_string();
        }
        let mut truncated = String::new();
        for line in text.lines() {
            if truncated.len() + line.len() + 1 > budget_chars {
                truncated.push_str("... (content truncated)\n");
                break;
            }
            truncated.push_str(line);
            truncated.push('\n');
        }
        truncated
    }
}
