//! Coordinator (C9): the top-level driver. Decomposes a job into tasks,
//! feeds them through the TaskQueue wave by wave, leases an agent and
//! worktree per ready task from the AgentPool, and hands each lease to a
//! fresh IterationEngine. Replan decisions flow back into the queue;
//! escalations are collected and returned to the caller.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::agent::AgentRunner;
use crate::assessment::ReplanDecision;
use crate::collab::{
    CapturedProgress, Decomposer, EmbeddingsService, EventSink, Filesystem, QaRunner, RevisionSystem,
    ShellGitRevisionSystem,
};
use crate::context_builder::FreshContextBuilder;
use crate::diff_context::DiffContextBuilder;
use crate::domain::{AgentType, EscalationReason, EscalationReport, TaskRun};
use crate::engine::{IterationEngine, IterationEngineConfig, RunOutcome};
use crate::escalation_handler::EscalationHandler;
use crate::pool::{AgentPool, PoolConfig, PoolError};
use crate::queue::{QueueError, TaskQueue};
use crate::tools::ToolContext;
use crate::worktree::WorktreeManager;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("decomposition failed: {0}")]
    Decompose(#[from] eyre::Report),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub engine: IterationEngineConfig,
    pub pool: PoolConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            engine: IterationEngineConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

/// Result of running a whole job to exhaustion: every task either landed
/// in `completed_task_ids` or produced an entry in `escalations`.
#[derive(Debug, Default)]
pub struct JobOutcome {
    pub completed_task_ids: Vec<String>,
    pub escalations: Vec<EscalationReport>,
}

pub struct Coordinator {
    decomposer: Arc<dyn Decomposer>,
    qa: Arc<dyn QaRunner>,
    agent: Arc<dyn AgentRunner>,
    embeddings: Arc<dyn EmbeddingsService>,
    filesystem: Arc<dyn Filesystem>,
    events: Arc<dyn EventSink>,
    pool: AgentPool,
    escalations_dir: PathBuf,
    config: CoordinatorConfig,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        decomposer: Arc<dyn Decomposer>,
        qa: Arc<dyn QaRunner>,
        agent: Arc<dyn AgentRunner>,
        embeddings: Arc<dyn EmbeddingsService>,
        filesystem: Arc<dyn Filesystem>,
        events: Arc<dyn EventSink>,
        worktrees: Arc<WorktreeManager>,
        escalations_dir: impl Into<PathBuf>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            decomposer,
            qa,
            agent,
            embeddings,
            filesystem,
            events,
            pool: AgentPool::new(config.pool.clone(), worktrees),
            escalations_dir: escalations_dir.into(),
            config,
        }
    }

    /// Decompose `job_spec` and drive every resulting task to completion or
    /// escalation. Returns once the queue has no pending or running work
    /// left.
    pub async fn run_job(&self, job_spec: &str) -> Result<JobOutcome, CoordinatorError> {
        let specs = self.decomposer.decompose(job_spec).await?;
        let mut queue = TaskQueue::new();
        queue.submit(specs)?;

        let mut outcome = JobOutcome::default();

        while queue.has_pending() {
            let wave: Vec<_> = queue.ready_wave().into_iter().cloned().collect();
            if wave.is_empty() {
                // Nothing ready but work remains: every outstanding task is
                // blocked on a dependency that will never complete (e.g. a
                // prior escalation). Surface what's left as stuck rather
                // than spin.
                warn!(pending = ?queue.stats(), "coordinator: no ready tasks but queue is not empty, stopping");
                break;
            }

            for task in wave {
                queue.mark_running(task.id());
                self.events
                    .emit("task.dispatched", serde_json::json!({"taskId": task.id()}))
                    .await;

                let agent_type = AgentType::new(task.preferred_agent_type());
                let exec_id = task.id().to_string();
                let leased = self.pool.acquire(&agent_type, &exec_id).await?;
                let work_dir = PathBuf::from(leased.working_copy());

                let revisions: Arc<dyn RevisionSystem> = Arc::new(ShellGitRevisionSystem::new(work_dir.clone()));
                let base_revision = revisions.head().await.unwrap_or_else(|_| "HEAD".to_string());

                let engine = IterationEngine::new(
                    self.qa.clone(),
                    self.agent.clone(),
                    FreshContextBuilder::new(self.embeddings.clone(), self.config.engine.token_budget),
                    DiffContextBuilder::new(revisions.clone()),
                    Arc::new(EscalationHandler::new(
                        revisions.clone(),
                        self.filesystem.clone(),
                        self.events.clone(),
                        self.escalations_dir.clone(),
                    )),
                    self.events.clone(),
                    Box::new(CapturedProgress::default()),
                    self.config.engine.clone(),
                );

                let mut run = TaskRun::new(task.id().to_string())
                    .with_base_revision(base_revision)
                    .with_working_copy(work_dir.to_string_lossy().to_string());
                let mut commit_handler = crate::commit_handler::IterationCommitHandler::new(revisions);
                let tool_ctx = ToolContext::new(work_dir.clone(), exec_id.clone());

                let run_outcome = engine
                    .run_task(&task, &mut run, &mut commit_handler, &tool_ctx, &work_dir, None, None)
                    .await;

                self.pool.release(leased, &exec_id).await?;

                self.apply_outcome(&mut queue, &task, run.iteration(), run_outcome, &mut outcome);
            }
        }

        Ok(outcome)
    }

    fn apply_outcome(
        &self,
        queue: &mut TaskQueue,
        task: &crate::domain::TaskSpec,
        iterations_completed: u32,
        run_outcome: RunOutcome,
        outcome: &mut JobOutcome,
    ) {
        match run_outcome {
            RunOutcome::Completed => {
                queue.mark_complete(task.id());
                outcome.completed_task_ids.push(task.id().to_string());
            }
            RunOutcome::Escalated(report) => {
                queue.mark_failed(task.id());
                outcome.escalations.push(report);
            }
            RunOutcome::AgentFailed(err) => {
                queue.mark_failed(task.id());
                let errors = vec![crate::domain::ErrorEntry::new(
                    crate::domain::ErrorKind::Runtime,
                    crate::domain::Severity::Error,
                    err.to_string(),
                    iterations_completed,
                )];
                outcome.escalations.push(EscalationReport::new(
                    task.id(),
                    EscalationReason::BlockingError,
                    iterations_completed,
                    self.config.engine.timeout_minutes,
                    &errors,
                    None,
                ));
            }
            RunOutcome::Aborted => {
                // An external abort leaves the task's queue state untouched;
                // a future run_job invocation (or a rescope) can pick it
                // back up without treating it as a failure.
                warn!(task = task.id(), "coordinator: task run aborted, leaving queue entry as running");
            }
            RunOutcome::Replan(ReplanDecision::Continue) => {
                // The engine only returns Replan for Split/Rescope/Escalate;
                // treat an unexpected Continue as a completed hand-off.
                queue.mark_complete(task.id());
                outcome.completed_task_ids.push(task.id().to_string());
            }
            RunOutcome::Replan(ReplanDecision::Split(parts)) => {
                // The split parts replace this task's remaining work; mark
                // it complete so anything depending on it is unblocked, and
                // submit the parts as fresh queue entries.
                queue.mark_complete(task.id());
                if let Err(e) = queue.submit(parts) {
                    warn!(task = task.id(), error = %e, "coordinator: failed to submit split parts");
                }
            }
            RunOutcome::Replan(ReplanDecision::Rescope(spec)) => {
                // Rescope keeps the same task id, so resubmitting just
                // resets that node back to Pending with the revised spec.
                if let Err(e) = queue.submit(vec![spec]) {
                    warn!(task = task.id(), error = %e, "coordinator: failed to resubmit rescoped task");
                }
            }
            RunOutcome::Replan(ReplanDecision::Escalate(reason)) => {
                queue.mark_failed(task.id());
                outcome.escalations.push(EscalationReport::new(
                    task.id(),
                    reason,
                    iterations_completed,
                    self.config.engine.timeout_minutes,
                    &[],
                    None,
                ));
            }
        }
    }
}
