//! TaskRun: the mutable execution record for a single TaskSpec attempt.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::id::generate_id;
use super::store::{now_ms, IndexValue, Record};

/// Lifecycle state of a TaskRun. Monotonic except `Running <-> Paused`;
/// the four terminal variants are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Escalated,
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Escalated | RunState::Aborted
        )
    }
}

/// Point in the per-iteration QA pipeline. Observation only, never used
/// for control flow decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Initializing,
    Coding,
    Building,
    Linting,
    Testing,
    Reviewing,
    Committing,
    Finalizing,
}

/// Outcome of a single QA step, used inside an IterationRecord.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaStepResult {
    pub ran: bool,
    pub success: bool,
    pub error_count: usize,
    pub warning_count: usize,
}

/// One completed pass through the iteration loop body. Appended once,
/// never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub phase: RunPhase,
    pub agent_output: String,
    pub files_changed: Vec<String>,
    pub build: QaStepResult,
    pub lint: QaStepResult,
    pub test: QaStepResult,
    pub review: QaStepResult,
    pub duration_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub revision: Option<String>,
    pub timestamp: i64,
}

/// One execution attempt of a TaskSpec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    id: String,
    task_spec_id: String,
    parent: Option<String>,
    working_copy: Option<String>,
    state: RunState,
    phase: RunPhase,
    iteration: u32,
    base_revision: Option<String>,
    last_revision: Option<String>,
    context: Value,
    iterations: Vec<IterationRecord>,
    last_error: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TaskRun {
    pub fn new(task_spec_id: impl Into<String>) -> Self {
        let now = now_ms();
        let task_spec_id = task_spec_id.into();
        Self {
            id: generate_id("run", &task_spec_id),
            task_spec_id,
            parent: None,
            working_copy: None,
            state: RunState::Running,
            phase: RunPhase::Initializing,
            iteration: 0,
            base_revision: None,
            last_revision: None,
            context: Value::Null,
            iterations: Vec::new(),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_base_revision(mut self, revision: impl Into<String>) -> Self {
        self.base_revision = Some(revision.into());
        self
    }

    pub fn with_working_copy(mut self, handle: impl Into<String>) -> Self {
        self.working_copy = Some(handle.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn task_spec_id(&self) -> &str {
        &self.task_spec_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn base_revision(&self) -> Option<&str> {
        self.base_revision.as_deref()
    }

    pub fn last_revision(&self) -> Option<&str> {
        self.last_revision.as_deref()
    }

    pub fn working_copy(&self) -> Option<&str> {
        self.working_copy.as_deref()
    }

    pub fn iterations(&self) -> &[IterationRecord] {
        &self.iterations
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, RunState::Running | RunState::Paused)
    }

    /// Transition the observed phase. Never gates control flow; pure bookkeeping.
    pub fn set_phase(&mut self, phase: RunPhase) {
        debug!(run_id = %self.id, ?phase, "TaskRun::set_phase");
        self.phase = phase;
        self.updated_at = now_ms();
    }

    /// Move to a new state. No-op once terminal, matching the sticky-terminal invariant.
    pub fn set_state(&mut self, state: RunState) {
        if self.state.is_terminal() {
            debug!(run_id = %self.id, "TaskRun::set_state: ignored, already terminal");
            return;
        }
        debug!(run_id = %self.id, from = ?self.state, to = ?state, "TaskRun::set_state");
        self.state = state;
        self.updated_at = now_ms();
    }

    pub fn pause(&mut self) {
        if self.state == RunState::Running {
            self.set_state(RunState::Paused);
        }
    }

    pub fn resume(&mut self) {
        if self.state == RunState::Paused {
            self.set_state(RunState::Running);
        }
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.updated_at = now_ms();
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn set_context_value(&mut self, key: impl Into<String>, value: Value) {
        if !self.context.is_object() {
            self.context = Value::Object(serde_json::Map::new());
        }
        if let Some(obj) = self.context.as_object_mut() {
            obj.insert(key.into(), value);
        }
        self.updated_at = now_ms();
    }

    pub fn context(&self) -> &Value {
        &self.context
    }

    /// Advance to the next iteration number. Only place `iteration` increments.
    pub fn begin_iteration(&mut self) -> u32 {
        self.iteration += 1;
        self.phase = RunPhase::Initializing;
        self.updated_at = now_ms();
        self.iteration
    }

    pub fn push_iteration(&mut self, record: IterationRecord) {
        if let Some(rev) = &record.revision {
            self.last_revision = Some(rev.clone());
        }
        self.iterations.push(record);
        self.updated_at = now_ms();
    }

    pub fn total_tokens(&self) -> (u64, u64) {
        self.iterations
            .iter()
            .fold((0, 0), |(i, o), rec| (i + rec.input_tokens, o + rec.output_tokens))
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.iterations.iter().map(|r| r.duration_ms).sum()
    }
}

impl Record for TaskRun {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "task_runs"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut m = HashMap::new();
        m.insert(
            "state".to_string(),
            IndexValue::String(format!("{:?}", self.state).to_lowercase()),
        );
        m.insert(
            "task_spec_id".to_string(),
            IndexValue::String(self.task_spec_id.clone()),
        );
        if let Some(parent) = &self.parent {
            m.insert("parent".to_string(), IndexValue::String(parent.clone()));
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_starts_running_initializing() {
        let run = TaskRun::new("abc-task-foo");
        assert_eq!(run.state(), RunState::Running);
        assert_eq!(run.phase(), RunPhase::Initializing);
        assert_eq!(run.iteration(), 0);
    }

    #[test]
    fn begin_iteration_increments_once_per_call() {
        let mut run = TaskRun::new("abc-task-foo");
        assert_eq!(run.begin_iteration(), 1);
        assert_eq!(run.begin_iteration(), 2);
    }

    #[test]
    fn terminal_state_is_sticky() {
        let mut run = TaskRun::new("abc-task-foo");
        run.set_state(RunState::Completed);
        run.set_state(RunState::Failed);
        assert_eq!(run.state(), RunState::Completed);
    }

    #[test]
    fn pause_resume_round_trip() {
        let mut run = TaskRun::new("abc-task-foo");
        run.pause();
        assert_eq!(run.state(), RunState::Paused);
        run.resume();
        assert_eq!(run.state(), RunState::Running);
    }

    #[test]
    fn push_iteration_updates_last_revision_and_totals() {
        let mut run = TaskRun::new("abc-task-foo");
        run.push_iteration(IterationRecord {
            iteration: 1,
            phase: RunPhase::Committing,
            agent_output: "did stuff".into(),
            files_changed: vec!["a.rs".into()],
            build: QaStepResult::default(),
            lint: QaStepResult::default(),
            test: QaStepResult::default(),
            review: QaStepResult::default(),
            duration_ms: 500,
            input_tokens: 100,
            output_tokens: 50,
            revision: Some("deadbeef".into()),
            timestamp: now_ms(),
        });
        assert_eq!(run.last_revision(), Some("deadbeef"));
        assert_eq!(run.total_tokens(), (100, 50));
        assert_eq!(run.total_duration_ms(), 500);
    }

    #[test]
    fn serde_roundtrip() {
        let run = TaskRun::new("abc-task-foo");
        let json = serde_json::to_string(&run).unwrap();
        let back: TaskRun = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), run.id());
    }
}
