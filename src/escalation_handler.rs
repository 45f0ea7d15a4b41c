//! EscalationHandler (C4): the terminal path when a run can't complete on
//! its own — checkpoints the working copy, writes a report to disk, and
//! notifies observers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, warn};

use crate::collab::{EventSink, Filesystem, FilesystemError, RevisionError, RevisionSystem};
use crate::domain::{ErrorEntry, EscalationReason, EscalationReport};

#[derive(Debug, Error)]
pub enum EscalationError {
    #[error("revision system error: {0}")]
    Revision(#[from] RevisionError),
    #[error("filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),
    #[error("failed to serialize escalation report: {0}")]
    Serialize(#[from] serde_json::Error),
}

const CHECKPOINT_TAG_PREFIX: &str = "nexus-checkpoint";

fn short_id(task_id: &str) -> &str {
    &task_id[..task_id.len().min(8)]
}

pub struct EscalationHandler {
    revisions: Arc<dyn RevisionSystem>,
    filesystem: Arc<dyn Filesystem>,
    events: Arc<dyn EventSink>,
    escalations_dir: PathBuf,
}

impl EscalationHandler {
    pub fn new(
        revisions: Arc<dyn RevisionSystem>,
        filesystem: Arc<dyn Filesystem>,
        events: Arc<dyn EventSink>,
        escalations_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            revisions,
            filesystem,
            events,
            escalations_dir: escalations_dir.into(),
        }
    }

    /// Commits any uncommitted work under a `[checkpoint]` message, tags
    /// it (re-tagging is idempotent: `-f` moves an existing tag forward),
    /// and returns the revision the checkpoint landed on.
    pub async fn create_checkpoint(&self, task_id: &str) -> Result<String, EscalationError> {
        self.revisions.run(&["add", "-A"]).await?;

        if self.revisions.dirty().await? {
            let message = format!("[checkpoint] Task {}", short_id(task_id));
            self.revisions.run(&["commit", "-m", &message]).await?;
        }

        let revision = self.revisions.head().await?;
        let tag_name = Self::checkpoint_tag(task_id);
        if let Err(e) = self.revisions.run(&["tag", "-f", &tag_name, &revision]).await {
            warn!(%e, task_id, "EscalationHandler::create_checkpoint: tagging failed, continuing untagged");
        }

        Ok(revision)
    }

    /// Full escalation flow: checkpoint, assemble the report, persist it
    /// to disk as JSON and Markdown, and notify the event sink.
    pub async fn escalate(
        &self,
        task_id: &str,
        reason: EscalationReason,
        iterations_completed: u32,
        timeout_minutes: u64,
        errors: &[ErrorEntry],
    ) -> Result<EscalationReport, EscalationError> {
        let checkpoint_revision = match self.create_checkpoint(task_id).await {
            Ok(rev) => Some(rev),
            Err(e) => {
                error!(%e, task_id, "EscalationHandler::escalate: checkpoint failed, escalating without one");
                None
            }
        };

        let report = EscalationReport::new(
            task_id,
            reason,
            iterations_completed,
            timeout_minutes,
            errors,
            checkpoint_revision,
        );

        self.filesystem.mkdir(&self.escalations_dir, true).await?;
        self.write_report(&report).await?;
        self.notify(&report).await;

        Ok(report)
    }

    fn checkpoint_tag(task_id: &str) -> String {
        format!("{}-{}", CHECKPOINT_TAG_PREFIX, short_id(task_id))
    }

    async fn write_report(&self, report: &EscalationReport) -> Result<(), EscalationError> {
        let json_path = self.escalations_dir.join(format!("{}.json", short_id(&report.task_id)));
        let json = serde_json::to_string_pretty(report)?;
        self.filesystem.write_file(&json_path, &json).await?;

        let md_path = self.escalations_dir.join(format!("{}.md", short_id(&report.task_id)));
        self.filesystem.write_file(&md_path, &Self::render_markdown(report)).await?;

        Ok(())
    }

    fn render_markdown(report: &EscalationReport) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Escalation: {}\n\n", report.task_id));
        out.push_str("## Overview\n\n");
        out.push_str("| Field | Value |\n|---|---|\n");
        out.push_str(&format!("| Reason | {:?} |\n", report.reason));
        out.push_str(&format!("| Iterations completed | {} |\n", report.iterations_completed));
        out.push_str(&format!(
            "| Checkpoint revision | {} |\n",
            report.checkpoint_revision.as_deref().unwrap_or("(none)")
        ));
        out.push_str(&format!("| Created at | {} |\n\n", report.created_at));

        out.push_str("## Summary\n\n");
        out.push_str(&report.summary);
        out.push_str("\n\n");

        out.push_str("## Last Errors\n\n```\n");
        if report.last_errors.is_empty() {
            out.push_str("(none recorded)\n");
        } else {
            for e in &report.last_errors {
                out.push_str(e);
                out.push('\n');
            }
        }
        out.push_str("```\n\n");

        out.push_str("## Suggested Actions\n\n");
        for action in &report.suggested_actions {
            out.push_str(&format!("- {action}\n"));
        }
        out.push('\n');

        out.push_str("## Recovery\n\n");
        out.push_str("By revision hash:\n\n```\n");
        out.push_str(&format!(
            "git checkout {}\n",
            report.checkpoint_revision.as_deref().unwrap_or("<checkpoint-revision>")
        ));
        out.push_str("```\n\n");
        out.push_str("By checkpoint tag:\n\n```\n");
        out.push_str(&format!("git checkout {}\n", Self::checkpoint_tag(&report.task_id)));
        out.push_str("```\n");

        out
    }

    async fn notify(&self, report: &EscalationReport) {
        self.events
            .emit(
                "task.escalated",
                serde_json::json!({
                    "taskId": report.task_id,
                    "reason": format!("{:?}", report.reason),
                    "iterationsCompleted": report.iterations_completed,
                }),
            )
            .await;
    }

    pub fn escalations_dir(&self) -> &Path {
        &self.escalations_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{StdFilesystem, TracingEventSink};
    use std::sync::Mutex;
    use tempfile::tempdir;
    use tokio::process::Command;

    async fn init_repo(dir: &Path) {
        Command::new("git").args(["init"]).current_dir(dir).output().await.unwrap();
        Command::new("git")
            .args(["config", "user.email", "test@test.com"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        Command::new("git")
            .args(["config", "user.name", "Test"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        Command::new("git")
            .args(["commit", "--allow-empty", "-m", "initial"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
    }

    #[derive(Default)]
    struct FakeRevisionSystem {
        head: Mutex<String>,
        dirty: Mutex<bool>,
    }

    #[async_trait::async_trait]
    impl RevisionSystem for FakeRevisionSystem {
        async fn run(&self, args: &[&str]) -> Result<String, RevisionError> {
            if args.first() == Some(&"commit") {
                *self.head.lock().unwrap() = "checkpoint-rev".to_string();
                *self.dirty.lock().unwrap() = false;
            }
            Ok(String::new())
        }
        async fn head(&self) -> Result<String, RevisionError> {
            Ok(self.head.lock().unwrap().clone())
        }
        async fn dirty(&self) -> Result<bool, RevisionError> {
            Ok(*self.dirty.lock().unwrap())
        }
    }

    #[tokio::test]
    async fn escalate_writes_json_and_markdown() {
        let dir = tempdir().unwrap();
        init_repo(dir.path()).await;

        let revisions = Arc::new(crate::collab::ShellGitRevisionSystem::new(dir.path()));
        let handler = EscalationHandler::new(
            revisions,
            Arc::new(StdFilesystem),
            Arc::new(TracingEventSink),
            dir.path().join("escalations"),
        );

        let errors = vec![ErrorEntry::new(
            crate::domain::ErrorKind::Build,
            crate::domain::Severity::Error,
            "boom",
            5,
        )];
        let report = handler
            .escalate("0123456789abcdef", EscalationReason::MaxIterations, 5, 60, &errors)
            .await
            .unwrap();

        let json_path = handler.escalations_dir().join("01234567.json");
        let md_path = handler.escalations_dir().join("01234567.md");
        assert!(tokio::fs::metadata(&json_path).await.is_ok());
        assert!(tokio::fs::metadata(&md_path).await.is_ok());
        assert_eq!(report.task_id, "0123456789abcdef");
    }

    #[tokio::test]
    async fn checkpoint_tags_even_with_fake_revision_system() {
        let fake = Arc::new(FakeRevisionSystem {
            head: Mutex::new("rev-0".into()),
            dirty: Mutex::new(true),
        });
        let dir = tempdir().unwrap();
        let handler = EscalationHandler::new(
            fake,
            Arc::new(StdFilesystem),
            Arc::new(TracingEventSink),
            dir.path().join("escalations"),
        );
        let rev = handler.create_checkpoint("t1").await.unwrap();
        assert_eq!(rev, "checkpoint-rev");
    }

    #[test]
    fn markdown_recovery_section_has_one_example_by_revision_and_one_by_tag() {
        let errors = vec![ErrorEntry::new(crate::domain::ErrorKind::Test, crate::domain::Severity::Error, "err", 3)];
        let report = EscalationReport::new(
            "0123456789abcdef",
            EscalationReason::Timeout,
            3,
            60,
            &errors,
            Some("rev1".to_string()),
        );
        let md = EscalationHandler::render_markdown(&report);
        assert!(md.contains("git checkout rev1"));
        assert!(md.contains(&format!("git checkout {}", EscalationHandler::checkpoint_tag("0123456789abcdef"))));
    }

    #[test]
    fn markdown_sections_are_in_fixed_order() {
        let errors = vec![ErrorEntry::new(crate::domain::ErrorKind::Test, crate::domain::Severity::Error, "err", 3)];
        let report = EscalationReport::new("t1", EscalationReason::Timeout, 3, 60, &errors, Some("rev1".to_string()));
        let md = EscalationHandler::render_markdown(&report);
        let overview = md.find("## Overview").unwrap();
        let summary = md.find("## Summary").unwrap();
        let errors = md.find("## Last Errors").unwrap();
        let actions = md.find("## Suggested Actions").unwrap();
        let recovery = md.find("## Recovery").unwrap();
        assert!(overview < summary && summary < errors && errors < actions && actions < recovery);
    }
}
