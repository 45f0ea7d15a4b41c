//! EscalationReport: the terminal artifact produced when a run cannot complete on its own.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error_entry::{ErrorEntry, ErrorKind};
use super::id::generate_id;
use super::store::{now_ms, IndexValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    MaxIterations,
    Timeout,
    RepeatedFailures,
    BlockingError,
    AgentRequest,
}

impl EscalationReason {
    /// Human-readable first line of a report summary. `max_iterations`
    /// and `timeout` parameterize the stem with the limit that was hit.
    pub fn summary(self, iterations_completed: u32, timeout_minutes: u64) -> String {
        match self {
            EscalationReason::MaxIterations => {
                format!("reached the maximum iteration limit of {iterations_completed}")
            }
            EscalationReason::Timeout => format!("exceeded the time limit of {timeout_minutes} minutes"),
            EscalationReason::RepeatedFailures => "encountered the same error repeatedly".to_string(),
            EscalationReason::BlockingError => {
                "encountered a blocking error that cannot be resolved automatically".to_string()
            }
            EscalationReason::AgentRequest => "explicitly requested human assistance".to_string(),
        }
    }

    fn base_actions(self) -> Vec<&'static str> {
        match self {
            EscalationReason::MaxIterations => vec![
                "review the last diff and finish the remaining work by hand",
                "split the task into smaller TaskSpecs and resubmit",
            ],
            EscalationReason::Timeout => vec![
                "increase the run's timeout budget",
                "check whether a QA step is hanging",
            ],
            EscalationReason::RepeatedFailures => vec![
                "inspect the recurring error for a missing dependency or fixture",
                "rescope the task description to rule out the blocked approach",
            ],
            EscalationReason::BlockingError => vec!["resolve the blocking error manually, then resume the run"],
            EscalationReason::AgentRequest => vec!["read the agent's request and provide the missing context"],
        }
    }

    /// Suggested actions derived from the reason plus the kinds of errors
    /// actually observed: build errors append a dependency-check
    /// suggestion, test errors a "review expected behavior" suggestion.
    /// Always ends with a restore-via-checkpoint action.
    pub fn suggested_actions(self, error_kinds: &[ErrorKind]) -> Vec<String> {
        let mut actions: Vec<String> = self.base_actions().into_iter().map(String::from).collect();

        if error_kinds.contains(&ErrorKind::Build) {
            actions.push("check for a missing or mismatched dependency".to_string());
        }
        if error_kinds.contains(&ErrorKind::Test) {
            actions.push("review the expected behavior covered by the failing test".to_string());
        }

        actions.push("restore via the checkpoint if the run needs to be rolled back".to_string());
        actions
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationReport {
    id: String,
    pub task_id: String,
    pub reason: EscalationReason,
    pub iterations_completed: u32,
    pub summary: String,
    pub last_errors: Vec<String>,
    pub suggested_actions: Vec<String>,
    pub checkpoint_revision: Option<String>,
    pub created_at: i64,
}

impl EscalationReport {
    /// `errors` are the observed errors the run escalated with; their
    /// messages (capped at 10) become `last_errors` and their kinds
    /// shape `suggested_actions`.
    pub fn new(
        task_id: impl Into<String>,
        reason: EscalationReason,
        iterations_completed: u32,
        timeout_minutes: u64,
        errors: &[ErrorEntry],
        checkpoint_revision: Option<String>,
    ) -> Self {
        let task_id = task_id.into();
        let last_errors: Vec<String> = errors.iter().take(10).map(|e| e.message.clone()).collect();
        let error_kinds: Vec<ErrorKind> = errors.iter().map(|e| e.kind).collect();
        Self {
            id: generate_id("escalation", &task_id),
            summary: reason.summary(iterations_completed, timeout_minutes),
            suggested_actions: reason.suggested_actions(&error_kinds),
            task_id,
            reason,
            iterations_completed,
            last_errors,
            checkpoint_revision,
            created_at: now_ms(),
        }
    }
}

impl Record for EscalationReport {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.created_at
    }

    fn collection_name() -> &'static str {
        "escalation_reports"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut m = HashMap::new();
        m.insert("task_id".to_string(), IndexValue::String(self.task_id.clone()));
        m.insert(
            "reason".to_string(),
            IndexValue::String(format!("{:?}", self.reason).to_lowercase()),
        );
        m
    }
}
