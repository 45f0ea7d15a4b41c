//! Cross-iteration continuity without relying on LLM memory (supplements
//! C5). `FreshContextBuilder` rebuilds a stateless context pack every
//! iteration, so the engine must explicitly carry forward what happened in
//! earlier passes. `ProgressStrategy` abstracts how that's recorded and
//! rendered for the next iteration's conversation-history slot;
//! `CapturedProgress` is the default, capturing a bounded trailing window
//! of iterations rather than every pass since the run started.

use std::collections::VecDeque;

/// Outcome of one iteration, handed to a `ProgressStrategy` once QA and
/// commit have run.
#[derive(Debug, Clone)]
pub struct IterationContext {
    pub iteration: u32,
    pub qa_summary: String,
    pub passed: bool,
    pub agent_output: String,
    pub duration_ms: u64,
    pub files_changed: Vec<String>,
}

/// Strategy for accumulating progress across loop iterations.
///
/// Implementors define how iteration outcomes are recorded and formatted
/// for injection into the next iteration's context pack.
pub trait ProgressStrategy: Send + Sync {
    /// Record the outcome of an iteration, returning the formatted entry.
    fn record(&mut self, ctx: &IterationContext) -> String;

    /// Accumulated progress text for the next context pack. Empty string
    /// if nothing has been recorded yet.
    fn get_progress(&self) -> String;

    /// Reset all accumulated progress.
    fn clear(&mut self);

    /// Number of iterations currently recorded.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps the most recent `max_entries` iterations verbatim (agent output
/// truncated to `max_output_chars`), evicting the oldest on overflow.
/// Older history is less relevant than the last few attempts once a run
/// has gone on for a while.
#[derive(Debug, Clone)]
pub struct CapturedProgress {
    entries: VecDeque<String>,
    max_entries: usize,
    max_output_chars: usize,
}

impl CapturedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_entries: usize, max_output_chars: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries),
            max_entries,
            max_output_chars,
        }
    }

    fn truncate(output: &str, max_chars: usize) -> String {
        if output.len() <= max_chars {
            return output.to_string();
        }
        let target = output.len() - max_chars;
        let start = (target..=output.len()).find(|&i| output.is_char_boundary(i)).unwrap_or(output.len());
        format!("...[truncated]...\n{}", &output[start..])
    }
}

impl Default for CapturedProgress {
    fn default() -> Self {
        Self {
            entries: VecDeque::with_capacity(5),
            max_entries: 5,
            max_output_chars: 500,
        }
    }
}

impl ProgressStrategy for CapturedProgress {
    fn record(&mut self, ctx: &IterationContext) -> String {
        let files = if ctx.files_changed.is_empty() {
            "none".to_string()
        } else {
            ctx.files_changed.join(", ")
        };
        let output = Self::truncate(&ctx.agent_output, self.max_output_chars);

        let entry = format!(
            "## Iteration {}\n**QA:** {}\n**Files changed:** {}\n**Duration:** {}ms\n**Agent output:**\n```\n{}\n```\n\n",
            ctx.iteration,
            ctx.qa_summary,
            files,
            ctx.duration_ms,
            output.trim()
        );

        if self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        entry
    }

    fn get_progress(&self) -> String {
        self.entries.iter().cloned().collect::<Vec<_>>().join("")
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(iteration: u32, passed: bool, output: &str) -> IterationContext {
        IterationContext {
            iteration,
            qa_summary: "test: ok".to_string(),
            passed,
            agent_output: output.to_string(),
            duration_ms: 100,
            files_changed: vec!["src/lib.rs".to_string()],
        }
    }

    #[test]
    fn records_and_renders_an_iteration() {
        let mut progress = CapturedProgress::default();
        let entry = progress.record(&ctx(1, false, "test failed"));
        assert!(entry.contains("Iteration 1"));
        assert!(entry.contains("test failed"));
        assert_eq!(progress.len(), 1);
    }

    #[test]
    fn evicts_oldest_past_cap() {
        let mut progress = CapturedProgress::with_limits(3, 100);
        for i in 1..=5 {
            progress.record(&ctx(i, false, &format!("error {i}")));
        }
        assert_eq!(progress.len(), 3);
        let text = progress.get_progress();
        assert!(!text.contains("Iteration 1"));
        assert!(!text.contains("Iteration 2"));
        assert!(text.contains("Iteration 5"));
    }

    #[test]
    fn truncates_long_output_on_a_char_boundary() {
        let mut progress = CapturedProgress::with_limits(5, 50);
        let long_output = "é".repeat(200);
        let entry = progress.record(&ctx(1, false, &long_output));
        assert!(entry.contains("[truncated]"));
    }

    #[test]
    fn no_files_changed_is_reported() {
        let mut progress = CapturedProgress::default();
        let mut c = ctx(1, true, "ok");
        c.files_changed.clear();
        let entry = progress.record(&c);
        assert!(entry.contains("Files changed:** none"));
    }

    #[test]
    fn clear_empties_progress() {
        let mut progress = CapturedProgress::default();
        progress.record(&ctx(1, true, "ok"));
        progress.clear();
        assert!(progress.is_empty());
        assert!(progress.get_progress().is_empty());
    }
}
