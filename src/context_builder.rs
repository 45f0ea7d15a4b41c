//! FreshContextBuilder (C5): assembles the bounded context handed to an
//! agent at the start of every iteration. Nothing here is retained
//! between iterations — a ContextPack is rebuilt from scratch each time
//! so stale state can never leak forward.

use std::sync::Arc;

use crate::collab::EmbeddingsService;
use crate::domain::{Diff, TaskSpec};

const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone)]
pub struct CandidateSnippet {
    pub path: String,
    pub content: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ContextSources {
    pub project_map: Option<String>,
    pub architecture_summary: Option<String>,
    pub patterns: Option<String>,
    pub public_apis: Option<String>,
    pub retrieved_memories: Vec<String>,
    pub conversation_history: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContextPack {
    pub context_id: String,
    pub task: TaskSpec,
    pub diff: Option<Diff>,
    pub previous_diff: Option<Diff>,
    pub project_map: Option<String>,
    pub architecture_summary: Option<String>,
    pub patterns: Option<String>,
    pub public_apis: Option<String>,
    pub snippets: Vec<CandidateSnippet>,
    pub retrieved_memories: Vec<String>,
    pub prior_errors: Vec<String>,
    pub last_qa_summary: Option<String>,
    pub conversation_history: Option<String>,
    pub token_count: usize,
    pub token_budget: usize,
    pub omitted_sections: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    Valid,
    Warn,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct SectionBreakdown {
    pub name: &'static str,
    pub bytes: usize,
    pub tokens: usize,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub reason: Option<String>,
    pub sections: Vec<SectionBreakdown>,
}

/// Sections dropped first when over budget, in priority order
/// (lowest-priority first).
const DROP_ORDER: &[&str] = &["memories", "code_snippets", "patterns", "files", "docs", "map"];

fn estimate_tokens(text: &str) -> usize {
    text.len() / CHARS_PER_TOKEN
}

pub struct FreshContextBuilder {
    embeddings: Arc<dyn EmbeddingsService>,
    token_budget: usize,
}

impl FreshContextBuilder {
    pub fn new(embeddings: Arc<dyn EmbeddingsService>, token_budget: usize) -> Self {
        Self { embeddings, token_budget }
    }

    /// Builds a fresh ContextPack. `candidates` is the pool of files the
    /// project could surface; the builder embeds the task description and
    /// ranks candidates by cosine similarity, keeping as many as fit.
    /// `previous_diff` is the prior iteration's diff (absent on iteration 1
    /// or when no commit exists to diff against), `prior_errors` the
    /// aggregator's current unique errors, and `last_qa_summary` a
    /// one-line render of the previous iteration's QA results.
    #[allow(clippy::too_many_arguments)]
    pub async fn build(
        &self,
        task: &TaskSpec,
        diff: Option<Diff>,
        previous_diff: Option<Diff>,
        prior_errors: Vec<String>,
        last_qa_summary: Option<String>,
        sources: ContextSources,
        candidates: &[(String, String)],
        context_id: impl Into<String>,
    ) -> ContextPack {
        let query_text = format!("{} {}", task.name(), task.description());
        let query = self.embeddings.embed(&query_text).await;
        let candidate_texts: Vec<String> = candidates.iter().map(|(_, content)| content.clone()).collect();
        let candidate_vecs = self.embeddings.embed_batch(&candidate_texts).await;
        let ranked = self.embeddings.top_k(&query, &candidate_vecs, candidates.len());

        let snippets: Vec<CandidateSnippet> = ranked
            .into_iter()
            .map(|(idx, score)| CandidateSnippet {
                path: candidates[idx].0.clone(),
                content: candidates[idx].1.clone(),
                score,
            })
            .collect();

        let mut pack = ContextPack {
            context_id: context_id.into(),
            task: task.clone(),
            diff,
            previous_diff,
            project_map: sources.project_map,
            architecture_summary: sources.architecture_summary,
            patterns: sources.patterns,
            public_apis: sources.public_apis,
            snippets,
            retrieved_memories: sources.retrieved_memories,
            prior_errors,
            last_qa_summary,
            conversation_history: sources.conversation_history,
            token_count: 0,
            token_budget: self.token_budget,
            omitted_sections: Vec::new(),
        };

        self.fit_to_budget(&mut pack);
        pack
    }

    fn section_tokens(pack: &ContextPack, section: &str) -> usize {
        match section {
            "memories" => pack.retrieved_memories.iter().map(|m| estimate_tokens(m)).sum(),
            "code_snippets" => pack.snippets.iter().map(|s| estimate_tokens(&s.content)).sum(),
            "patterns" => pack.patterns.as_deref().map(estimate_tokens).unwrap_or(0),
            "files" => {
                pack.diff.as_ref().map(|d| estimate_tokens(&d.raw)).unwrap_or(0)
                    + pack.previous_diff.as_ref().map(|d| estimate_tokens(&d.raw)).unwrap_or(0)
            }
            "docs" => pack.public_apis.as_deref().map(estimate_tokens).unwrap_or(0)
                + pack.architecture_summary.as_deref().map(estimate_tokens).unwrap_or(0),
            "map" => pack.project_map.as_deref().map(estimate_tokens).unwrap_or(0),
            _ => 0,
        }
    }

    fn drop_section(pack: &mut ContextPack, section: &str) {
        match section {
            "memories" => pack.retrieved_memories.clear(),
            "code_snippets" => pack.snippets.clear(),
            "patterns" => pack.patterns = None,
            "files" => {
                pack.diff = None;
                pack.previous_diff = None;
            }
            "docs" => {
                pack.public_apis = None;
                pack.architecture_summary = None;
            }
            "map" => pack.project_map = None,
            _ => {}
        }
    }

    fn total_tokens(pack: &ContextPack) -> usize {
        estimate_tokens(pack.task.description())
            + pack.conversation_history.as_deref().map(estimate_tokens).unwrap_or(0)
            + pack.prior_errors.iter().map(|e| estimate_tokens(e)).sum::<usize>()
            + pack.last_qa_summary.as_deref().map(estimate_tokens).unwrap_or(0)
            + DROP_ORDER.iter().map(|s| Self::section_tokens(pack, s)).sum::<usize>()
    }

    /// Drops sections lowest-priority-first until the pack fits the
    /// configured token budget, recording what it dropped.
    fn fit_to_budget(&self, pack: &mut ContextPack) {
        for section in DROP_ORDER {
            if Self::total_tokens(pack) <= self.token_budget {
                break;
            }
            if Self::section_tokens(pack, section) > 0 {
                Self::drop_section(pack, section);
                pack.omitted_sections.push(section);
            }
        }
        pack.token_count = Self::total_tokens(pack);
    }

    /// Independent validity check over an assembled pack, used by the
    /// engine before handing a pack to the agent.
    pub fn validate(pack: &ContextPack) -> ValidationReport {
        let sections: Vec<SectionBreakdown> = DROP_ORDER
            .iter()
            .map(|name| {
                let tokens = Self::section_tokens(pack, name);
                SectionBreakdown {
                    name,
                    bytes: tokens * CHARS_PER_TOKEN,
                    tokens,
                }
            })
            .collect();

        if pack.task.description().is_empty() {
            return ValidationReport {
                status: ValidationStatus::Invalid,
                reason: Some("task description is empty".to_string()),
                sections,
            };
        }

        if pack.token_count > pack.token_budget {
            return ValidationReport {
                status: ValidationStatus::Warn,
                reason: Some(format!(
                    "token_count {} exceeds budget {} after omitting every droppable section",
                    pack.token_count, pack.token_budget
                )),
                sections,
            };
        }

        ValidationReport {
            status: ValidationStatus::Valid,
            reason: None,
            sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::HashEmbeddingsService;
    use crate::domain::{EstimatedEffort, Priority};

    fn task() -> TaskSpec {
        TaskSpec::new(
            "add retry logic",
            "wrap the http client in a retry wrapper for 5xx responses",
            vec!["src/http.rs".into()],
            vec!["retries on 5xx".into()],
            vec![],
            EstimatedEffort::Medium,
            "coder",
            Priority::Normal,
        )
    }

    fn builder(budget: usize) -> FreshContextBuilder {
        FreshContextBuilder::new(Arc::new(HashEmbeddingsService::default()), budget)
    }

    #[tokio::test]
    async fn build_ranks_candidates_by_relevance() {
        let candidates = vec![
            ("src/http.rs".to_string(), "http client retry 5xx logic".to_string()),
            ("src/unrelated.rs".to_string(), "completely unrelated module".to_string()),
        ];
        let pack = builder(5_000)
            .build(&task(), None, None, vec![], None, ContextSources::default(), &candidates, "ctx-1")
            .await;
        assert_eq!(pack.snippets[0].path, "src/http.rs");
    }

    #[tokio::test]
    async fn omits_low_priority_sections_when_over_budget() {
        let sources = ContextSources {
            retrieved_memories: vec!["x".repeat(10_000)],
            patterns: Some("y".repeat(10_000)),
            ..Default::default()
        };
        let pack = builder(10).build(&task(), None, None, vec![], None, sources, &[], "ctx-2").await;
        assert!(pack.omitted_sections.contains(&"memories"));
        assert!(pack.retrieved_memories.is_empty());
    }

    #[tokio::test]
    async fn validate_flags_empty_description_as_invalid() {
        let mut t = task();
        // TaskSpec has no direct mutator for description; simulate by building
        // a pack and then clearing its own copy for the validation check.
        let mut pack = builder(5_000).build(&t, None, None, vec![], None, ContextSources::default(), &[], "ctx-3").await;
        pack.task = {
            t = TaskSpec::new("", "", vec![], vec![], vec![], EstimatedEffort::Small, "coder", Priority::Low);
            t.clone()
        };
        let report = FreshContextBuilder::validate(&pack);
        assert_eq!(report.status, ValidationStatus::Invalid);
    }

    #[tokio::test]
    async fn validate_reports_breakdown_per_section() {
        let pack = builder(5_000).build(&task(), None, None, vec![], None, ContextSources::default(), &[], "ctx-4").await;
        let report = FreshContextBuilder::validate(&pack);
        assert_eq!(report.sections.len(), DROP_ORDER.len());
    }
}
