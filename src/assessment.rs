//! SelfAssessmentEngine + DynamicReplanner (C10): the per-iteration
//! feedback loop that decides whether a task keeps going as-is, splits,
//! rescopes, or escalates.

use crate::domain::{EscalationReason, EstimatedEffort, Priority, TaskSpec};
use crate::error_aggregator::ErrorAggregator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockerClass {
    None,
    UnknownApi,
    MissingDependency,
    AmbiguousRequirement,
    RepeatedFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproachJudgement {
    Continue,
    Switch,
    Split,
    Escalate,
}

/// Produced at the end of every iteration. `progress_score` is expected to
/// be monotone non-decreasing across a task's iterations; a drop from the
/// previous score is a signal worth surfacing, not an error in itself.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub progress_score: f32,
    pub blocker: BlockerClass,
    pub judgement: ApproachJudgement,
    pub regressed: bool,
}

/// An agent can short-circuit the auto-assessment by emitting one of
/// these during its step; it feeds the same decision pipeline as an
/// auto-produced Assessment.
#[derive(Debug, Clone)]
pub struct AgentReplanRequest {
    pub reason: String,
    pub suggestion: Option<String>,
    pub blockers: Vec<String>,
    pub complexity_detail: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ReplanDecision {
    Continue,
    Split(Vec<TaskSpec>),
    Rescope(TaskSpec),
    Escalate(EscalationReason),
}

/// Scores progress from the signals an iteration produced: QA pass/fail
/// transitions, new-vs-repeated errors, and file-change volume.
pub struct SelfAssessmentEngine {
    max_iterations: u32,
    repeated_failure_threshold: usize,
}

impl SelfAssessmentEngine {
    pub fn new(max_iterations: u32, repeated_failure_threshold: usize) -> Self {
        Self {
            max_iterations,
            repeated_failure_threshold,
        }
    }

    /// `previous_score` is `None` on the first iteration.
    pub fn assess(
        &self,
        iteration: u32,
        qa_all_passed: bool,
        files_changed: usize,
        errors: &ErrorAggregator,
        previous_score: Option<f32>,
    ) -> Assessment {
        let error_penalty = (errors.len() as f32 * 0.05).min(0.6);
        let progress_signal = if qa_all_passed {
            1.0
        } else if files_changed > 0 {
            0.3 + (files_changed as f32 * 0.02).min(0.3)
        } else {
            0.1
        };
        let progress_score = (progress_signal - error_penalty).clamp(0.0, 1.0);

        let regressed = previous_score.map(|p| progress_score < p - 0.05).unwrap_or(false);

        let worst_repeat = errors
            .unique()
            .iter()
            .map(|e| errors.occurrences(e.kind, &e.message))
            .max()
            .unwrap_or(0);

        let blocker = if worst_repeat >= self.repeated_failure_threshold {
            BlockerClass::RepeatedFailure
        } else if !qa_all_passed && files_changed == 0 && iteration > 1 {
            BlockerClass::AmbiguousRequirement
        } else {
            BlockerClass::None
        };

        let judgement = if qa_all_passed {
            ApproachJudgement::Continue
        } else if blocker == BlockerClass::RepeatedFailure || iteration >= self.max_iterations {
            ApproachJudgement::Escalate
        } else if blocker == BlockerClass::AmbiguousRequirement && iteration >= 4 {
            // No file changes for several iterations in a row reads as the
            // task being too coarse-grained for one agent pass, not as a
            // dead end worth escalating yet.
            ApproachJudgement::Split
        } else if regressed && iteration > 2 {
            ApproachJudgement::Switch
        } else {
            ApproachJudgement::Continue
        };

        Assessment {
            progress_score,
            blocker,
            judgement,
            regressed,
        }
    }
}

/// Turns an Assessment (or an agent-originated request) into a concrete
/// ReplanDecision. Splits/rescopes are only ever applied at an iteration
/// boundary by the engine — this type just decides what to do, it does
/// not schedule when.
pub struct DynamicReplanner;

impl DynamicReplanner {
    pub fn decide(task: &TaskSpec, assessment: &Assessment, iteration: u32) -> ReplanDecision {
        match assessment.judgement {
            ApproachJudgement::Continue => ReplanDecision::Continue,
            ApproachJudgement::Escalate => ReplanDecision::Escalate(Self::reason_for(assessment, iteration)),
            ApproachJudgement::Switch => ReplanDecision::Rescope(Self::rescoped(task)),
            ApproachJudgement::Split => ReplanDecision::Split(Self::split(task)),
        }
    }

    pub fn decide_from_agent_request(task: &TaskSpec, request: &AgentReplanRequest) -> ReplanDecision {
        if !request.blockers.is_empty() {
            return ReplanDecision::Escalate(EscalationReason::AgentRequest);
        }
        if request.complexity_detail.is_some() {
            return ReplanDecision::Split(Self::split(task));
        }
        if let Some(suggestion) = &request.suggestion {
            let rescoped = TaskSpec::new(
                task.name(),
                format!("{}\n\nAgent-suggested revision: {}", task.description(), suggestion),
                task.touched_paths().to_vec(),
                task.acceptance_criteria().to_vec(),
                task.dependencies().to_vec(),
                task.estimated_effort(),
                task.preferred_agent_type(),
                task.priority(),
            )
            .with_id(task.id().to_string());
            return ReplanDecision::Rescope(rescoped);
        }
        ReplanDecision::Escalate(EscalationReason::AgentRequest)
    }

    fn reason_for(assessment: &Assessment, iteration: u32) -> EscalationReason {
        if assessment.blocker == BlockerClass::RepeatedFailure {
            EscalationReason::RepeatedFailures
        } else if iteration >= 1 {
            EscalationReason::MaxIterations
        } else {
            EscalationReason::BlockingError
        }
    }

    fn rescoped(task: &TaskSpec) -> TaskSpec {
        TaskSpec::new(
            task.name(),
            format!("{}\n\n(rescoped after stalled progress)", task.description()),
            task.touched_paths().to_vec(),
            task.acceptance_criteria().to_vec(),
            task.dependencies().to_vec(),
            task.estimated_effort(),
            task.preferred_agent_type(),
            task.priority(),
        )
        .with_id(task.id().to_string())
    }

    /// Splits a stalled task into two narrower successors sharing its
    /// dependencies; the Coordinator submits these to the queue in place
    /// of the task that requested the split.
    fn split(task: &TaskSpec) -> Vec<TaskSpec> {
        let effort = match task.estimated_effort() {
            EstimatedEffort::Large => EstimatedEffort::Medium,
            _ => EstimatedEffort::Small,
        };

        let first = TaskSpec::new(
            format!("{} (part 1)", task.name()),
            format!("{}\n\nFocus on the first half of this task.", task.description()),
            task.touched_paths().to_vec(),
            task.acceptance_criteria().to_vec(),
            task.dependencies().to_vec(),
            effort,
            task.preferred_agent_type(),
            task.priority(),
        );

        let second = TaskSpec::new(
            format!("{} (part 2)", task.name()),
            format!("{}\n\nFocus on the remainder of this task.", task.description()),
            task.touched_paths().to_vec(),
            task.acceptance_criteria().to_vec(),
            vec![first.id().to_string()],
            effort,
            task.preferred_agent_type(),
            Priority::Normal.max(task.priority()),
        );

        vec![first, second]
    }
}
