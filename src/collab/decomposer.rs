//! Decomposer: turns a natural-language job description into a
//! dependency-annotated set of TaskSpecs. The Coordinator depends only on
//! this narrow trait at `start(jobSpec)`, never on how specs are produced
//! (an LLM-driven decomposer is the real-world implementation and is out
//! of scope for the core).

use async_trait::async_trait;

use crate::domain::{EstimatedEffort, Priority, TaskSpec};

#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(&self, job_spec: &str) -> eyre::Result<Vec<TaskSpec>>;
}

/// Wraps the whole job description in a single TaskSpec with no
/// dependencies. Useful for standalone operation and for jobs too small
/// to warrant real decomposition.
pub struct SingleTaskDecomposer {
    pub preferred_agent_type: String,
}

impl Default for SingleTaskDecomposer {
    fn default() -> Self {
        Self {
            preferred_agent_type: "coder".to_string(),
        }
    }
}

#[async_trait]
impl Decomposer for SingleTaskDecomposer {
    async fn decompose(&self, job_spec: &str) -> eyre::Result<Vec<TaskSpec>> {
        let name = job_spec.lines().next().unwrap_or(job_spec).trim();
        Ok(vec![TaskSpec::new(
            name,
            job_spec,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            EstimatedEffort::Medium,
            self.preferred_agent_type.clone(),
            Priority::Normal,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_task_decomposer_produces_one_independent_task() {
        let decomposer = SingleTaskDecomposer::default();
        let specs = decomposer.decompose("add retry logic to the http client").await.unwrap();
        assert_eq!(specs.len(), 1);
        assert!(specs[0].dependencies().is_empty());
    }
}
