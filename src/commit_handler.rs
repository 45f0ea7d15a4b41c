//! IterationCommitHandler (C3): turns the end of a successful iteration
//! into a revision, and can roll one back if a later iteration regresses.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::collab::{RevisionError, RevisionSystem};
use crate::domain::{CommitRegistry, CommitRegistryEntry};

const DEFAULT_MESSAGE_PREFIX: &str = "nexus:";
const DEFAULT_TAG_PREFIX: &str = "nexus-iter";
const WRAP_WIDTH: usize = 72;

#[derive(Debug, Error)]
pub enum CommitHandlerError {
    #[error("nothing to commit for task {0} iteration {1}")]
    NoChanges(String, u32),
    #[error("revision system error: {0}")]
    Revision(#[from] RevisionError),
}

fn short_id(task_id: &str) -> &str {
    &task_id[..task_id.len().min(8)]
}

/// Commits and rolls back the working copy on behalf of a single run,
/// keeping a `CommitRegistry` of what it did so escalation / rollback can
/// refer back to a precise (task, iteration) -> revision mapping.
pub struct IterationCommitHandler {
    revisions: Arc<dyn RevisionSystem>,
    registry: CommitRegistry,
    message_prefix: String,
    tag_prefix: String,
}

impl IterationCommitHandler {
    pub fn new(revisions: Arc<dyn RevisionSystem>) -> Self {
        Self {
            revisions,
            registry: CommitRegistry::new(),
            message_prefix: DEFAULT_MESSAGE_PREFIX.to_string(),
            tag_prefix: DEFAULT_TAG_PREFIX.to_string(),
        }
    }

    pub fn with_prefixes(mut self, message_prefix: impl Into<String>, tag_prefix: impl Into<String>) -> Self {
        self.message_prefix = message_prefix.into();
        self.tag_prefix = tag_prefix.into();
        self
    }

    fn format_message(&self, task_id: &str, iteration: u32, summary: Option<&str>) -> String {
        let base = format!("{} Task {} - Iteration {}", self.message_prefix, short_id(task_id), iteration);

        let summary = match summary {
            Some(s) if !s.is_empty() => s,
            _ => return base,
        };

        let one_line = format!("{base}: {summary}");
        if one_line.len() <= WRAP_WIDTH {
            return one_line;
        }

        format!("{base}\n\n{summary}")
    }

    /// Stages everything in the working copy and commits. A clean working
    /// copy is an error unless `force_commit` asks for an empty commit
    /// anyway (used by checkpoint/escalation flows).
    pub async fn commit(
        &mut self,
        task_id: &str,
        iteration: u32,
        summary: Option<&str>,
        force_commit: bool,
    ) -> Result<CommitRegistryEntry, CommitHandlerError> {
        self.revisions.run(&["add", "-A"]).await?;

        let dirty = self.revisions.dirty().await?;
        if !dirty && !force_commit {
            return Err(CommitHandlerError::NoChanges(task_id.to_string(), iteration));
        }

        let message = self.format_message(task_id, iteration, summary);
        let mut commit_args = vec!["commit", "-m", message.as_str()];
        if !dirty {
            commit_args.push("--allow-empty");
        }
        self.revisions.run(&commit_args).await?;

        let revision = self.revisions.head().await?;
        let mut entry = CommitRegistryEntry::new(task_id, iteration, revision.clone(), message);

        let tag_name = format!("{}-{}-{}", self.tag_prefix, short_id(task_id), iteration);
        match self.revisions.run(&["tag", "-f", &tag_name, &revision]).await {
            Ok(_) => {
                entry = entry.with_tag(tag_name.clone());
                info!(task_id, iteration, tag = %tag_name, "IterationCommitHandler::commit: tagged");
            }
            Err(e) => warn!(%e, task_id, iteration, "IterationCommitHandler::commit: tagging failed, continuing untagged"),
        }

        self.registry.record(entry.clone());
        Ok(entry)
    }

    /// Resets the working copy to the revision recorded for `target_iteration`,
    /// drops later registry entries, and removes untracked files the later
    /// iterations introduced.
    pub async fn rollback(&mut self, task_id: &str, target_iteration: u32) -> Result<(), CommitHandlerError> {
        let revision = self
            .registry
            .revision_for(task_id, target_iteration)
            .ok_or_else(|| CommitHandlerError::NoChanges(task_id.to_string(), target_iteration))?
            .to_string();

        self.revisions.run(&["reset", "--hard", &revision]).await?;
        self.revisions.run(&["clean", "-fd"]).await?;

        self.registry = std::mem::take(&mut self.registry)
            .for_task(task_id)
            .into_iter()
            .filter(|e| e.iteration <= target_iteration)
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .fold(CommitRegistry::new(), |mut reg, e| {
                reg.record(e);
                reg
            });

        Ok(())
    }

    pub fn revision_for(&self, task_id: &str, iteration: u32) -> Option<&str> {
        self.registry.revision_for(task_id, iteration)
    }

    pub fn registry(&self) -> &CommitRegistry {
        &self.registry
    }
}
