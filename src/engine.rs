//! IterationEngine (C6): the Ralph loop. Every iteration rebuilds its
//! context from scratch, runs the agent once, subsequences QA with a
//! short-circuit on the first failing step, commits whatever the agent
//! produced, and feeds the result through self-assessment before
//! deciding whether to continue, replan, or escalate.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time as tokio_time;
use tracing::info;

use crate::agent::{AgentError, AgentRunner};
use crate::assessment::{AgentReplanRequest, DynamicReplanner, ReplanDecision, SelfAssessmentEngine};
use crate::collab::{EventSink, IterationContext, ProgressStrategy, QaRunner};
use crate::commit_handler::IterationCommitHandler;
use crate::context_builder::{ContextSources, FreshContextBuilder};
use crate::diff_context::DiffContextBuilder;
use crate::domain::{
    now_ms, EscalationReason, EscalationReport, ErrorEntry, ErrorKind, IterationRecord, QaStepResult, RunPhase, RunState,
    Severity, TaskRun, TaskSpec,
};
use crate::error_aggregator::ErrorAggregator;
use crate::escalation_handler::{EscalationError, EscalationHandler};
use crate::tools::ToolContext;

/// How long the pause barrier waits for a `changed()` notification before
/// re-checking the current signal. Bounds the wait so a dropped sender
/// can't leave a run parked forever.
const PAUSE_POLL_CEILING: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct IterationEngineConfig {
    pub max_iterations: u32,
    pub max_error_entries: usize,
    pub repeated_failure_threshold: usize,
    pub token_budget: usize,
    pub system_prompt: String,
    pub commit_each_iteration: bool,
    pub include_diff_context: bool,
    pub include_previous_errors: bool,
    pub escalate_after: u32,
    pub timeout_minutes: u64,
}

impl Default for IterationEngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_error_entries: 100,
            repeated_failure_threshold: 3,
            token_budget: 5_000,
            system_prompt: "You are an autonomous coding agent operating inside a sandboxed git worktree.".to_string(),
            commit_each_iteration: true,
            include_diff_context: true,
            include_previous_errors: true,
            escalate_after: 20,
            timeout_minutes: 60,
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    Escalated(EscalationReport),
    Replan(ReplanDecision),
    AgentFailed(AgentError),
    Aborted,
}

/// Control signal observed at iteration boundaries. `abort(taskId)` and
/// pause/resume at the Coordinator level are expressed by sending on the
/// paired [`RunControl`]; in-flight QA/agent calls are never interrupted
/// mid-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Running,
    Paused,
    Aborted,
}

/// Handle a caller keeps to pause, resume, or abort a run in progress.
/// Cloning a `RunControl` and its receiver is cheap; every clone of the
/// receiver observes the same signal.
#[derive(Clone)]
pub struct RunControl {
    tx: watch::Sender<ControlSignal>,
}

impl RunControl {
    pub fn new() -> (Self, watch::Receiver<ControlSignal>) {
        let (tx, rx) = watch::channel(ControlSignal::Running);
        (Self { tx }, rx)
    }

    pub fn pause(&self) {
        let _ = self.tx.send(ControlSignal::Paused);
    }

    pub fn resume(&self) {
        let _ = self.tx.send(ControlSignal::Running);
    }

    pub fn abort(&self) {
        let _ = self.tx.send(ControlSignal::Aborted);
    }
}

pub struct IterationEngine {
    qa: Arc<dyn QaRunner>,
    agent: Arc<dyn AgentRunner>,
    context_builder: FreshContextBuilder,
    diff_builder: DiffContextBuilder,
    escalation: Arc<EscalationHandler>,
    events: Arc<dyn EventSink>,
    assessment: SelfAssessmentEngine,
    progress: Mutex<Box<dyn ProgressStrategy>>,
    config: IterationEngineConfig,
}

impl IterationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        qa: Arc<dyn QaRunner>,
        agent: Arc<dyn AgentRunner>,
        context_builder: FreshContextBuilder,
        diff_builder: DiffContextBuilder,
        escalation: Arc<EscalationHandler>,
        events: Arc<dyn EventSink>,
        progress: Box<dyn ProgressStrategy>,
        config: IterationEngineConfig,
    ) -> Self {
        let assessment = SelfAssessmentEngine::new(config.escalate_after, config.repeated_failure_threshold);
        Self {
            qa,
            agent,
            context_builder,
            diff_builder,
            escalation,
            events,
            assessment,
            progress: Mutex::new(progress),
            config,
        }
    }

    fn qa_errors(kind: ErrorKind, errors: &[String], warnings: &[String], iteration: u32) -> Vec<ErrorEntry> {
        errors
            .iter()
            .map(|m| ErrorEntry::new(kind, Severity::Error, m.clone(), iteration))
            .chain(warnings.iter().map(|m| ErrorEntry::new(kind, Severity::Warning, m.clone(), iteration)))
            .collect()
    }

    /// Runs build -> lint -> test -> review, short-circuiting after the
    /// first step whose runner is configured and fails. Steps with no
    /// configured runner are treated as vacuously passing.
    async fn run_qa(
        &self,
        task_id: &str,
        work_dir: &Path,
        iteration: u32,
        errors: &mut ErrorAggregator,
    ) -> (bool, [QaStepResult; 4]) {
        let mut steps = [
            QaStepResult::default(),
            QaStepResult::default(),
            QaStepResult::default(),
            QaStepResult::default(),
        ];

        if let Some(build) = self.qa.build(task_id, work_dir).await {
            errors.add(Self::qa_errors(ErrorKind::Build, &build.errors, &build.warnings, iteration));
            steps[0] = QaStepResult {
                ran: true,
                success: build.success,
                error_count: build.errors.len(),
                warning_count: build.warnings.len(),
            };
            if !build.success {
                return (false, steps);
            }
        }

        if let Some(lint) = self.qa.lint(task_id, work_dir).await {
            errors.add(Self::qa_errors(ErrorKind::Lint, &lint.errors, &lint.warnings, iteration));
            steps[1] = QaStepResult {
                ran: true,
                success: lint.success,
                error_count: lint.errors.len(),
                warning_count: lint.warnings.len(),
            };
            if !lint.success {
                return (false, steps);
            }
        }

        if let Some(test) = self.qa.test(task_id, work_dir).await {
            errors.add(Self::qa_errors(ErrorKind::Test, &test.errors, &[], iteration));
            steps[2] = QaStepResult {
                ran: true,
                success: test.success,
                error_count: test.errors.len(),
                warning_count: 0,
            };
            if !test.success {
                return (false, steps);
            }
        }

        if let Some(review) = self.qa.review(task_id, work_dir).await {
            errors.add(Self::qa_errors(ErrorKind::Review, &review.blockers, &review.comments, iteration));
            steps[3] = QaStepResult {
                ran: true,
                success: review.approved,
                error_count: review.blockers.len(),
                warning_count: review.comments.len(),
            };
            if !review.approved {
                return (false, steps);
            }
        }

        (true, steps)
    }

    /// One-line render of a completed iteration's QA results, fed into the
    /// next iteration's context pack as `last_qa_summary`.
    fn render_qa_summary(steps: &[QaStepResult; 4]) -> String {
        const NAMES: [&str; 4] = ["build", "lint", "test", "review"];
        steps
            .iter()
            .zip(NAMES)
            .map(|(step, name)| {
                if !step.ran {
                    format!("{name}: not run")
                } else if step.success {
                    format!("{name}: ok")
                } else if step.error_count > 0 {
                    format!("{name}: {} error(s)", step.error_count)
                } else {
                    format!("{name}: failed")
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    async fn candidates(work_dir: &Path, task: &TaskSpec) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for path in task.touched_paths() {
            let full = work_dir.join(path);
            if let Ok(content) = tokio::fs::read_to_string(&full).await {
                out.push((path.clone(), content));
            }
        }
        out
    }

    /// Runs iterations until the task completes, needs to replan, must
    /// escalate, or is aborted. `commit_handler` is scoped to this single
    /// run: its registry only ever needs to track this task's own commits.
    /// `control`, if given, is checked at every iteration boundary for a
    /// pause or abort request; in-flight QA/agent calls are never
    /// interrupted mid-step.
    pub async fn run_task(
        &self,
        task: &TaskSpec,
        run: &mut TaskRun,
        commit_handler: &mut IterationCommitHandler,
        tool_ctx: &ToolContext,
        work_dir: &Path,
        agent_request: Option<&AgentReplanRequest>,
        mut control: Option<watch::Receiver<ControlSignal>>,
    ) -> RunOutcome {
        if let Some(request) = agent_request {
            let decision = DynamicReplanner::decide_from_agent_request(task, request);
            if !matches!(decision, ReplanDecision::Continue) {
                return RunOutcome::Replan(decision);
            }
        }

        let mut errors = ErrorAggregator::new(self.config.max_error_entries);
        let mut previous_score: Option<f32> = None;
        let mut last_qa_summary: Option<String> = None;
        let base_revision = run.base_revision().unwrap_or("HEAD").to_string();
        let run_started = Instant::now();
        let timeout = Duration::from_secs(60 * self.config.timeout_minutes);

        loop {
            if let Some(rx) = control.as_mut() {
                loop {
                    let signal = *rx.borrow();
                    match signal {
                        ControlSignal::Aborted => {
                            run.set_state(RunState::Aborted);
                            return RunOutcome::Aborted;
                        }
                        ControlSignal::Paused => {
                            run.pause();
                            let _ = tokio_time::timeout(PAUSE_POLL_CEILING, rx.changed()).await;
                        }
                        ControlSignal::Running => {
                            run.resume();
                            break;
                        }
                    }
                }
            }

            if run_started.elapsed() >= timeout {
                let observed_errors: Vec<ErrorEntry> = errors.unique().into_iter().cloned().collect();
                return match self
                    .escalation
                    .escalate(
                        task.id(),
                        EscalationReason::Timeout,
                        run.iteration(),
                        self.config.timeout_minutes,
                        &observed_errors,
                    )
                    .await
                {
                    Ok(report) => {
                        run.set_state(RunState::Escalated);
                        RunOutcome::Escalated(report)
                    }
                    Err(e) => {
                        run.set_error(format!("escalation failed: {e}"));
                        RunOutcome::Escalated(Self::fallback_report(task.id(), e))
                    }
                };
            }

            let iteration = run.begin_iteration();
            self.events
                .emit("task.iteration.started", serde_json::json!({"taskId": task.id(), "iteration": iteration}))
                .await;

            run.set_phase(RunPhase::Coding);
            let started = Instant::now();

            let diff = if self.config.include_diff_context {
                Some(self.diff_builder.cumulative_diff(&base_revision).await)
            } else {
                None
            };

            let previous_diff = if self.config.include_diff_context && iteration > 1 {
                match commit_handler.revision_for(task.id(), iteration - 1).map(str::to_string) {
                    Some(prev_rev) => Some(self.diff_builder.diff_between(&prev_rev, None).await),
                    None => {
                        // commitEachIteration was false for the previous pass, so
                        // there's no revision to diff against; fall back to the
                        // cumulative diff and say so.
                        let mut fallback = self.diff_builder.cumulative_diff(&base_revision).await;
                        fallback.raw = format!(
                            "(per-iteration diff unavailable, no commit for iteration {})\n\n{}",
                            iteration - 1,
                            fallback.raw
                        );
                        Some(fallback)
                    }
                }
            } else {
                None
            };

            let prior_errors: Vec<String> = if self.config.include_previous_errors {
                errors.unique().iter().map(|e| e.message.clone()).collect()
            } else {
                Vec::new()
            };

            let candidates = Self::candidates(work_dir, task).await;
            let progress_so_far = self.progress.lock().expect("progress strategy lock poisoned").get_progress();
            let sources = ContextSources {
                conversation_history: if progress_so_far.is_empty() { None } else { Some(progress_so_far) },
                ..Default::default()
            };
            let context = self
                .context_builder
                .build(
                    task,
                    diff,
                    previous_diff,
                    prior_errors,
                    last_qa_summary.clone(),
                    sources,
                    &candidates,
                    format!("{}-{}", task.id(), iteration),
                )
                .await;

            let step = match self.agent.run_step(&self.config.system_prompt, &context, tool_ctx).await {
                Ok(step) => step,
                Err(e) => {
                    run.set_error(e.to_string());
                    return RunOutcome::AgentFailed(e);
                }
            };

            run.set_phase(RunPhase::Building);
            let (qa_passed, qa_steps) = self.run_qa(task.id(), work_dir, iteration, &mut errors).await;
            last_qa_summary = Some(Self::render_qa_summary(&qa_steps));

            run.set_phase(RunPhase::Committing);
            let revision = if self.config.commit_each_iteration && !step.files_changed.is_empty() {
                let summary = if step.files_changed.len() == 1 {
                    format!("Modified {}", step.files_changed[0])
                } else {
                    format!("Modified {} files", step.files_changed.len())
                };
                match commit_handler.commit(task.id(), iteration, Some(&summary), false).await {
                    Ok(entry) => Some(entry.revision_hash),
                    Err(_) => None,
                }
            } else {
                None
            };

            let duration_ms = started.elapsed().as_millis() as u64;
            self.progress.lock().expect("progress strategy lock poisoned").record(&IterationContext {
                iteration,
                qa_summary: last_qa_summary.clone().unwrap_or_default(),
                passed: qa_passed,
                agent_output: step.text_output.clone(),
                duration_ms,
                files_changed: step.files_changed.clone(),
            });

            run.push_iteration(IterationRecord {
                iteration,
                phase: RunPhase::Committing,
                agent_output: step.text_output.clone(),
                files_changed: step.files_changed.clone(),
                build: qa_steps[0].clone(),
                lint: qa_steps[1].clone(),
                test: qa_steps[2].clone(),
                review: qa_steps[3].clone(),
                duration_ms,
                input_tokens: step.tokens_used.input_tokens,
                output_tokens: step.tokens_used.output_tokens,
                revision,
                timestamp: now_ms(),
            });

            if qa_passed {
                run.set_phase(RunPhase::Finalizing);
                run.set_state(RunState::Completed);
                self.events
                    .emit("task.completed", serde_json::json!({"taskId": task.id(), "iteration": iteration}))
                    .await;
                return RunOutcome::Completed;
            }

            let assessment = self.assessment.assess(iteration, qa_passed, step.files_changed.len(), &errors, previous_score);
            previous_score = Some(assessment.progress_score);

            let decision = DynamicReplanner::decide(task, &assessment, iteration);
            if let ReplanDecision::Escalate(reason) = decision {
                let observed_errors: Vec<ErrorEntry> = errors.unique().into_iter().cloned().collect();
                return match self
                    .escalation
                    .escalate(task.id(), reason, iteration, self.config.timeout_minutes, &observed_errors)
                    .await
                {
                    Ok(report) => {
                        run.set_state(RunState::Escalated);
                        RunOutcome::Escalated(report)
                    }
                    Err(e) => {
                        run.set_error(format!("escalation failed: {e}"));
                        RunOutcome::Escalated(Self::fallback_report(task.id(), e))
                    }
                };
            }
            if !matches!(decision, ReplanDecision::Continue) {
                return RunOutcome::Replan(decision);
            }

            info!(task_id = task.id(), iteration, "IterationEngine::run_task: continuing to next iteration");
        }
    }

    fn fallback_report(task_id: &str, error: EscalationError) -> EscalationReport {
        let errors = vec![ErrorEntry::new(
            ErrorKind::Runtime,
            Severity::Error,
            format!("escalation handler failed: {error}"),
            0,
        )];
        EscalationReport::new(task_id, EscalationReason::BlockingError, 0, 0, &errors, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{MockLlmClient, NoopQaRunner, ShellGitRevisionSystem, StdFilesystem, TracingEventSink};
    use crate::domain::{EstimatedEffort, Priority};
    use crate::tools::ToolExecutor;
    use std::sync::Arc as StdArc;
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
        Command::new("git").args(["config", "user.name", "Test"]).current_dir(dir).output().await.unwrap();
        Command::new("git")
            .args(["commit", "--allow-empty", "-m", "initial"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
    }

    fn task() -> TaskSpec {
        TaskSpec::new(
            "add logging",
            "add a startup log line",
            vec![],
            vec![],
            vec![],
            EstimatedEffort::Small,
            "coder",
            Priority::Normal,
        )
    }

    #[tokio::test]
    async fn run_task_completes_when_qa_has_no_configured_steps() {
        let dir = tempdir().unwrap();
        init_repo(dir.path()).await;

        let revisions: StdArc<dyn crate::collab::RevisionSystem> = StdArc::new(ShellGitRevisionSystem::new(dir.path()));
        let embeddings = StdArc::new(crate::collab::HashEmbeddingsService::default());
        let context_builder = FreshContextBuilder::new(embeddings, 5_000);
        let diff_builder = DiffContextBuilder::new(revisions.clone());
        let escalation = StdArc::new(EscalationHandler::new(
            revisions.clone(),
            StdArc::new(StdFilesystem),
            StdArc::new(TracingEventSink),
            dir.path().join("escalations"),
        ));

        let llm: StdArc<dyn crate::collab::LlmClient> = StdArc::new(MockLlmClient);
        let tools = StdArc::new(ToolExecutor::standard());
        let agent: StdArc<dyn AgentRunner> = StdArc::new(crate::agent::LlmAgentRunner::new(llm, tools, 512));

        let engine = IterationEngine::new(
            StdArc::new(NoopQaRunner),
            agent,
            context_builder,
            diff_builder,
            escalation,
            StdArc::new(TracingEventSink),
            Box::new(crate::collab::CapturedProgress::default()),
            IterationEngineConfig::default(),
        );

        let task = task();
        let mut run = TaskRun::new(task.id().to_string());
        let mut commit_handler = IterationCommitHandler::new(revisions);
        let tool_ctx = ToolContext::new(dir.path().to_path_buf(), "exec-1".to_string());

        let outcome = engine
            .run_task(&task, &mut run, &mut commit_handler, &tool_ctx, dir.path(), None, None)
            .await;

        assert!(matches!(outcome, RunOutcome::Completed));
        assert_eq!(run.state(), RunState::Completed);
        assert_eq!(run.iteration(), 1);
    }

    struct AlwaysFailTestQaRunner;

    #[async_trait::async_trait]
    impl crate::collab::QaRunner for AlwaysFailTestQaRunner {
        async fn build(&self, _task_id: &str, _work_dir: &Path) -> Option<crate::collab::BuildResult> {
            None
        }
        async fn lint(&self, _task_id: &str, _work_dir: &Path) -> Option<crate::collab::LintResult> {
            None
        }
        async fn test(&self, _task_id: &str, _work_dir: &Path) -> Option<crate::collab::TestResult> {
            Some(crate::collab::TestResult {
                success: false,
                passed: 0,
                failed: 1,
                skipped: 0,
                errors: vec!["null deref at x.rs:42".to_string()],
                duration: std::time::Duration::default(),
            })
        }
        async fn review(&self, _task_id: &str, _work_dir: &Path) -> Option<crate::collab::ReviewResult> {
            None
        }
    }

    fn engine_with(
        qa: StdArc<dyn QaRunner>,
        revisions: StdArc<dyn crate::collab::RevisionSystem>,
        escalations_dir: std::path::PathBuf,
        config: IterationEngineConfig,
    ) -> IterationEngine {
        let embeddings = StdArc::new(crate::collab::HashEmbeddingsService::default());
        let context_builder = FreshContextBuilder::new(embeddings, config.token_budget);
        let diff_builder = DiffContextBuilder::new(revisions.clone());
        let escalation = StdArc::new(EscalationHandler::new(
            revisions,
            StdArc::new(StdFilesystem),
            StdArc::new(TracingEventSink),
            escalations_dir,
        ));
        let llm: StdArc<dyn crate::collab::LlmClient> = StdArc::new(MockLlmClient);
        let tools = StdArc::new(ToolExecutor::standard());
        let agent: StdArc<dyn AgentRunner> = StdArc::new(crate::agent::LlmAgentRunner::new(llm, tools, 512));
        IterationEngine::new(
            qa,
            agent,
            context_builder,
            diff_builder,
            escalation,
            StdArc::new(TracingEventSink),
            Box::new(crate::collab::CapturedProgress::default()),
            config,
        )
    }

    #[tokio::test]
    async fn abort_signal_stops_the_run_before_any_iteration() {
        let dir = tempdir().unwrap();
        init_repo(dir.path()).await;
        let revisions: StdArc<dyn crate::collab::RevisionSystem> = StdArc::new(ShellGitRevisionSystem::new(dir.path()));

        let engine = engine_with(
            StdArc::new(AlwaysFailTestQaRunner),
            revisions.clone(),
            dir.path().join("escalations"),
            IterationEngineConfig::default(),
        );

        let task = task();
        let mut run = TaskRun::new(task.id().to_string());
        let mut commit_handler = IterationCommitHandler::new(revisions);
        let tool_ctx = ToolContext::new(dir.path().to_path_buf(), "exec-1".to_string());

        let (control, rx) = RunControl::new();
        control.abort();

        let outcome = engine
            .run_task(&task, &mut run, &mut commit_handler, &tool_ctx, dir.path(), None, Some(rx))
            .await;

        assert!(matches!(outcome, RunOutcome::Aborted));
        assert_eq!(run.state(), RunState::Aborted);
        assert_eq!(run.iteration(), 0);
    }

    #[tokio::test]
    async fn zero_minute_timeout_escalates_before_first_iteration_completes() {
        let dir = tempdir().unwrap();
        init_repo(dir.path()).await;
        let revisions: StdArc<dyn crate::collab::RevisionSystem> = StdArc::new(ShellGitRevisionSystem::new(dir.path()));

        let mut config = IterationEngineConfig::default();
        config.timeout_minutes = 0;

        let engine = engine_with(StdArc::new(AlwaysFailTestQaRunner), revisions.clone(), dir.path().join("escalations"), config);

        let task = task();
        let mut run = TaskRun::new(task.id().to_string());
        let mut commit_handler = IterationCommitHandler::new(revisions);
        let tool_ctx = ToolContext::new(dir.path().to_path_buf(), "exec-1".to_string());

        let outcome = engine
            .run_task(&task, &mut run, &mut commit_handler, &tool_ctx, dir.path(), None, None)
            .await;

        match outcome {
            RunOutcome::Escalated(report) => assert!(matches!(report.reason, EscalationReason::Timeout)),
            other => panic!("expected timeout escalation, got {other:?}"),
        }
        assert_eq!(run.state(), RunState::Escalated);
    }

    #[tokio::test]
    async fn repeated_test_failure_escalates_with_previous_diff_context() {
        let dir = tempdir().unwrap();
        init_repo(dir.path()).await;
        let revisions: StdArc<dyn crate::collab::RevisionSystem> = StdArc::new(ShellGitRevisionSystem::new(dir.path()));

        let mut config = IterationEngineConfig::default();
        config.repeated_failure_threshold = 2;

        let engine = engine_with(StdArc::new(AlwaysFailTestQaRunner), revisions.clone(), dir.path().join("escalations"), config);

        let task = task();
        let mut run = TaskRun::new(task.id().to_string());
        let mut commit_handler = IterationCommitHandler::new(revisions);
        let tool_ctx = ToolContext::new(dir.path().to_path_buf(), "exec-1".to_string());

        let outcome = engine
            .run_task(&task, &mut run, &mut commit_handler, &tool_ctx, dir.path(), None, None)
            .await;

        match outcome {
            RunOutcome::Escalated(report) => assert!(matches!(report.reason, EscalationReason::RepeatedFailures)),
            other => panic!("expected repeated-failures escalation, got {other:?}"),
        }
        assert!(run.iteration() >= 2);
    }
}
