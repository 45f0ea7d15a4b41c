//! AgentRunner: the black-box agent step an IterationEngine invokes once
//! per iteration — hands the model a context pack and a tool executor,
//! drives the tool-calling loop to completion, and reports what changed.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::collab::{CompletionRequest, LlmClient, LlmError, Message, StopReason, TokenUsage};
use crate::context_builder::ContextPack;
use crate::tools::{ToolContext, ToolExecutor};

const MAX_TOOL_ROUNDS: usize = 25;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("agent exceeded {0} tool-calling rounds without reaching end_turn")]
    TooManyRounds(usize),
}

#[derive(Debug, Clone, Default)]
pub struct AgentStepResult {
    pub files_changed: Vec<String>,
    pub text_output: String,
    pub tokens_used: TokenUsage,
    pub rounds: usize,
}

#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run_step(
        &self,
        system_prompt: &str,
        context: &ContextPack,
        tool_ctx: &ToolContext,
    ) -> Result<AgentStepResult, AgentError>;
}

/// Drives a real LlmClient through a standard tool-calling loop: send the
/// context, execute any tool calls the model asks for, feed results back,
/// repeat until the model reaches `StopReason::EndTurn` or the round cap.
pub struct LlmAgentRunner {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolExecutor>,
    max_tokens: u32,
}

impl LlmAgentRunner {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<ToolExecutor>, max_tokens: u32) -> Self {
        Self { llm, tools, max_tokens }
    }

    fn render_context(context: &ContextPack) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Task: {}\n\n{}\n\n", context.task.name(), context.task.description()));

        if !context.task.acceptance_criteria().is_empty() {
            out.push_str("## Acceptance criteria\n");
            for c in context.task.acceptance_criteria() {
                out.push_str(&format!("- {c}\n"));
            }
            out.push('\n');
        }

        if let Some(map) = &context.project_map {
            out.push_str("## Project map\n");
            out.push_str(map);
            out.push_str("\n\n");
        }

        if let Some(summary) = &context.architecture_summary {
            out.push_str("## Architecture\n");
            out.push_str(summary);
            out.push_str("\n\n");
        }

        if let Some(history) = &context.conversation_history {
            out.push_str("## Progress so far\n");
            out.push_str(history);
            out.push_str("\n\n");
        }

        if let Some(diff) = &context.previous_diff {
            out.push_str("## Diff since previous iteration\n");
            out.push_str(&diff.raw);
            out.push_str("\n\n");
        }

        if let Some(diff) = &context.diff {
            out.push_str("## Cumulative diff since task start\n");
            out.push_str(&diff.raw);
            out.push_str("\n\n");
        }

        if let Some(summary) = &context.last_qa_summary {
            out.push_str("## Previous QA result\n");
            out.push_str(summary);
            out.push_str("\n\n");
        }

        if !context.prior_errors.is_empty() {
            out.push_str("## Outstanding errors\n");
            for e in &context.prior_errors {
                out.push_str(&format!("- {e}\n"));
            }
            out.push('\n');
        }

        if !context.snippets.is_empty() {
            out.push_str("## Relevant files\n");
            for s in &context.snippets {
                out.push_str(&format!("### {} (score {:.2})\n{}\n\n", s.path, s.score, s.content));
            }
        }

        if !context.retrieved_memories.is_empty() {
            out.push_str("## Memories\n");
            for m in &context.retrieved_memories {
                out.push_str(&format!("- {m}\n"));
            }
            out.push('\n');
        }

        out
    }

    fn touched_path(tool_name: &str, input: &serde_json::Value) -> Option<String> {
        if tool_name == "write" || tool_name == "edit" {
            input.get("path").and_then(serde_json::Value::as_str).map(str::to_string)
        } else {
            None
        }
    }
}

#[async_trait]
impl AgentRunner for LlmAgentRunner {
    async fn run_step(
        &self,
        system_prompt: &str,
        context: &ContextPack,
        tool_ctx: &ToolContext,
    ) -> Result<AgentStepResult, AgentError> {
        tool_ctx.clear_reads().await;

        let mut messages = vec![Message::user(Self::render_context(context))];
        let mut usage = TokenUsage::default();
        let mut files_changed: HashSet<String> = HashSet::new();
        let mut last_text = String::new();

        for round in 1..=MAX_TOOL_ROUNDS {
            let request = CompletionRequest {
                system_prompt: system_prompt.to_string(),
                messages: messages.clone(),
                tools: self.tools.definitions(),
                max_tokens: self.max_tokens,
            };

            let response = self.llm.chat(request).await?;
            usage.input_tokens += response.usage.input_tokens;
            usage.output_tokens += response.usage.output_tokens;
            usage.cache_read_tokens += response.usage.cache_read_tokens;
            usage.cache_creation_tokens += response.usage.cache_creation_tokens;

            if let Some(text) = &response.content {
                last_text = text.clone();
            }

            if response.tool_calls.is_empty() || response.stop_reason != StopReason::ToolUse {
                return Ok(AgentStepResult {
                    files_changed: files_changed.into_iter().collect(),
                    text_output: last_text,
                    tokens_used: usage,
                    rounds: round,
                });
            }

            messages.push(Message::assistant(last_text.clone()));

            let results = self.tools.execute_all(&response.tool_calls, tool_ctx).await;
            let mut blocks = Vec::new();
            for ((tool_use_id, result), call) in results.into_iter().zip(response.tool_calls.iter()) {
                if let Some(path) = Self::touched_path(&call.name, &call.input) {
                    if !result.is_error {
                        files_changed.insert(path);
                    }
                }
                blocks.push(crate::collab::ContentBlock::tool_result(tool_use_id, result.content, result.is_error));
            }
            messages.push(Message::user_blocks(blocks));
        }

        Err(AgentError::TooManyRounds(MAX_TOOL_ROUNDS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EstimatedEffort, Priority, TaskSpec};

    fn context() -> ContextPack {
        let task = TaskSpec::new(
            "add logging",
            "add a log line on startup",
            vec![],
            vec![],
            vec![],
            EstimatedEffort::Small,
            "coder",
            Priority::Normal,
        );
        ContextPack {
            context_id: "ctx-1".to_string(),
            task,
            diff: None,
            previous_diff: None,
            project_map: None,
            architecture_summary: None,
            patterns: None,
            public_apis: None,
            snippets: vec![],
            retrieved_memories: vec![],
            prior_errors: vec![],
            last_qa_summary: None,
            conversation_history: None,
            token_count: 0,
            token_budget: 5_000,
            omitted_sections: vec![],
        }
    }

    #[tokio::test]
    async fn mock_llm_step_ends_turn_without_tool_calls() {
        let llm = Arc::new(crate::collab::MockLlmClient);
        let tools = Arc::new(ToolExecutor::standard());
        let runner = LlmAgentRunner::new(llm, tools, 1024);

        let dir = tempfile::tempdir().unwrap();
        let tool_ctx = ToolContext::new(dir.path().to_path_buf(), "exec-1".to_string());

        let result = runner.run_step("you are an agent", &context(), &tool_ctx).await.unwrap();
        assert_eq!(result.rounds, 1);
        assert!(result.files_changed.is_empty());
    }
}
