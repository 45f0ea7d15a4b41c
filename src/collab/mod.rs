//! External interfaces the orchestration core consumes from collaborators.
//!
//! Each trait here lists a contract only; the shipped implementation
//! alongside it exists so the core is runnable and testable standalone,
//! not as production-grade infrastructure.

pub mod checkpoint;
pub mod decomposer;
pub mod embeddings;
pub mod events;
pub mod filesystem;
pub mod llm;
pub mod progress;
pub mod qa;
pub mod revision;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore};
pub use decomposer::{Decomposer, SingleTaskDecomposer};
pub use embeddings::{EmbeddingsService, HashEmbeddingsService};
pub use events::{EventSink, TracingEventSink};
pub use filesystem::{Filesystem, FilesystemError, StdFilesystem};
pub use llm::{
    CompletionRequest, CompletionResponse, ContentBlock, LlmClient, LlmError, Message, MessageContent, MockLlmClient,
    Role, StopReason, StreamChunk, TokenUsage, ToolCall, ToolDefinition,
};
pub use progress::{CapturedProgress, IterationContext, ProgressStrategy};
pub use qa::{BuildResult, LintResult, NoopQaRunner, QaRunner, ReviewResult, TestResult};
pub use revision::{RevisionError, RevisionSystem, ShellGitRevisionSystem};
