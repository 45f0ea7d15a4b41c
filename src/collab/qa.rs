//! QARunner: the project-specific plug-in point IterationEngine drives
//! each iteration. Every step is optional and idempotent with respect to
//! the working copy.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, Clone, Default)]
pub struct BuildResult {
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct LintResult {
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub fixable: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TestResult {
    pub success: bool,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewResult {
    pub approved: bool,
    pub comments: Vec<String>,
    pub suggestions: Vec<String>,
    pub blockers: Vec<String>,
}

/// Each method returns `None` when the project has no such step configured;
/// `IterationEngine`'s QA subsequencing policy treats an absent step as
/// vacuously passing.
#[async_trait]
pub trait QaRunner: Send + Sync {
    async fn build(&self, task_id: &str, work_dir: &Path) -> Option<BuildResult>;
    async fn lint(&self, task_id: &str, work_dir: &Path) -> Option<LintResult>;
    async fn test(&self, task_id: &str, work_dir: &Path) -> Option<TestResult>;
    async fn review(&self, task_id: &str, work_dir: &Path) -> Option<ReviewResult>;
}

/// A runner with every step absent, for standalone operation and tests
/// exercising the engine's own control flow.
pub struct NoopQaRunner;

#[async_trait]
impl QaRunner for NoopQaRunner {
    async fn build(&self, _task_id: &str, _work_dir: &Path) -> Option<BuildResult> {
        None
    }
    async fn lint(&self, _task_id: &str, _work_dir: &Path) -> Option<LintResult> {
        None
    }
    async fn test(&self, _task_id: &str, _work_dir: &Path) -> Option<TestResult> {
        None
    }
    async fn review(&self, _task_id: &str, _work_dir: &Path) -> Option<ReviewResult> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_runner_reports_every_step_absent() {
        let runner = NoopQaRunner;
        let dir = Path::new("/tmp");
        assert!(runner.build("t1", dir).await.is_none());
        assert!(runner.lint("t1", dir).await.is_none());
        assert!(runner.test("t1", dir).await.is_none());
        assert!(runner.review("t1", dir).await.is_none());
    }
}
