//! Nexus - the iteration-orchestration core of an autonomous software-construction system.
//!
//! A task specification goes in; a persistent per-task iteration loop (the
//! "Ralph loop") edits code, runs QA, aggregates failures, rebuilds context
//! for the next attempt, and either succeeds or escalates to a human.
//! Many such loops run concurrently, each isolated in its own git worktree,
//! coordinated by a [`coordinator::Coordinator`] that decomposes a job into
//! a dependency DAG and releases tasks wave-by-wave to a bounded
//! [`pool::AgentPool`].
//!
//! # Core Concepts
//!
//! - **Fresh context every iteration**: [`context_builder::FreshContextBuilder`] rebuilds the
//!   agent's context pack from scratch each pass to avoid drift and stale assumptions.
//! - **State in git, not memory**: progress is checkpointed via [`commit_handler::IterationCommitHandler`]
//!   commits and tags; [`domain::Store`] holds the in-process record of everything else.
//! - **Concrete QA, not LLM self-report**: completion is gated on [`collab::qa::QaRunner`] results.
//! - **Bounded, isolated concurrency**: [`worktree::WorktreeManager`] gives every lease its own
//!   working copy; [`pool::AgentPool`] caps concurrency per agent type.
//!
//! # Modules
//!
//! - [`domain`] - core entities: TaskSpec, TaskRun, Diff, ErrorEntry, CommitRegistryEntry, EscalationReport, AgentSlot
//! - [`collab`] - external interfaces (LLMClient, QARunner, RevisionSystem, Filesystem, EventSink, ...) and reference implementations
//! - [`diff_context`] - C1: DiffContextBuilder
//! - [`error_aggregator`] - C2: ErrorAggregator
//! - [`commit_handler`] - C3: IterationCommitHandler
//! - [`escalation_handler`] - C4: EscalationHandler
//! - [`context_builder`] - C5: FreshContextBuilder
//! - [`engine`] - C6: IterationEngine (the Ralph loop)
//! - [`queue`] - C7: TaskQueue + DependencyResolver
//! - [`pool`] - C8: AgentPool
//! - [`coordinator`] - C9: Coordinator
//! - [`assessment`] - C10: SelfAssessmentEngine + DynamicReplanner
//! - [`agent`] - agent-step runner abstraction used by the engine
//! - [`worktree`] - isolated working-copy management
//! - [`tools`] - tool surface exposed to agent implementations
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

#![allow(dead_code)]

pub mod agent;
pub mod assessment;
pub mod cli;
pub mod collab;
pub mod commit_handler;
pub mod config;
pub mod context_builder;
pub mod coordinator;
pub mod diff_context;
pub mod domain;
pub mod engine;
pub mod error_aggregator;
pub mod escalation_handler;
pub mod pool;
pub mod queue;
pub mod tools;
pub mod worktree;

// Re-export commonly used types.
pub use agent::{AgentError, AgentRunner, AgentStepResult, LlmAgentRunner};
pub use assessment::{
    AgentReplanRequest, ApproachJudgement, Assessment, BlockerClass, DynamicReplanner, ReplanDecision,
    SelfAssessmentEngine,
};
pub use commit_handler::{CommitHandlerError, IterationCommitHandler};
pub use config::Config;
pub use context_builder::{ContextPack, FreshContextBuilder, ValidationReport, ValidationStatus};
pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorError, JobOutcome};
pub use diff_context::{DiffContextBuilder, FormatOptions};
pub use domain::{
    AgentSlot, AgentType, CommitRegistry, CommitRegistryEntry, Diff, EscalationReason, EscalationReport, ErrorEntry,
    ErrorKind, FileChange, FileChangeKind, IterationRecord, Priority, QaStepResult, RunPhase, RunState, Severity,
    TaskSpec, TaskRun,
};
pub use engine::{ControlSignal, IterationEngine, IterationEngineConfig, RunControl, RunOutcome};
pub use error_aggregator::ErrorAggregator;
pub use escalation_handler::{EscalationError, EscalationHandler};
pub use pool::{AgentPool, LeasedSlot, PoolConfig, PoolError};
pub use queue::{QueueError, QueueStats, TaskQueue, TaskState};
pub use tools::{Tool, ToolContext, ToolError, ToolExecutor, ToolResult};
pub use worktree::{WorktreeConfig, WorktreeError, WorktreeInfo, WorktreeManager};
