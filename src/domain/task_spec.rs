//! TaskSpec: the immutable unit of work produced by decomposition.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::id::{generate_id, DomainId};
use super::priority::Priority;
use super::store::{now_ms, IndexValue, Record};

/// Rough sizing hint carried from decomposition through scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatedEffort {
    Small,
    Medium,
    Large,
}

/// Immutable description of a unit of work. Created once at decomposition
/// time and never mutated; re-decomposition produces new TaskSpecs rather
/// than editing these in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    id: String,
    name: String,
    description: String,
    touched_paths: Vec<String>,
    acceptance_criteria: Vec<String>,
    dependencies: Vec<String>,
    estimated_effort: EstimatedEffort,
    preferred_agent_type: String,
    priority: Priority,
    created_at: i64,
}

impl TaskSpec {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        touched_paths: Vec<String>,
        acceptance_criteria: Vec<String>,
        dependencies: Vec<String>,
        estimated_effort: EstimatedEffort,
        preferred_agent_type: impl Into<String>,
        priority: Priority,
    ) -> Self {
        let name = name.into();
        let id = generate_id("task", &name);
        Self {
            id,
            name,
            description: description.into(),
            touched_paths,
            acceptance_criteria,
            dependencies,
            estimated_effort,
            preferred_agent_type: preferred_agent_type.into(),
            priority,
            created_at: now_ms(),
        }
    }

    pub fn with_id(mut self, id: impl Into<DomainId>) -> Self {
        self.id = id.into().as_str().to_string();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn touched_paths(&self) -> &[String] {
        &self.touched_paths
    }

    pub fn acceptance_criteria(&self) -> &[String] {
        &self.acceptance_criteria
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn estimated_effort(&self) -> EstimatedEffort {
        self.estimated_effort
    }

    pub fn preferred_agent_type(&self) -> &str {
        &self.preferred_agent_type
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// True when every dependency id is present in `completed`.
    pub fn is_ready(&self, completed: &[&str]) -> bool {
        self.dependencies
            .iter()
            .all(|dep| completed.contains(&dep.as_str()))
    }
}

impl Record for TaskSpec {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.created_at
    }

    fn collection_name() -> &'static str {
        "task_specs"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut m = HashMap::new();
        m.insert(
            "preferred_agent_type".to_string(),
            IndexValue::String(self.preferred_agent_type.clone()),
        );
        m.insert(
            "priority".to_string(),
            IndexValue::String(self.priority.to_string()),
        );
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(deps: Vec<&str>) -> TaskSpec {
        TaskSpec::new(
            "add retry logic",
            "wrap the http client in a retry wrapper",
            vec!["src/http.rs".into()],
            vec!["retries on 5xx".into()],
            deps.into_iter().map(String::from).collect(),
            EstimatedEffort::Medium,
            "coder",
            Priority::Normal,
        )
    }

    #[test]
    fn id_is_derived_from_name() {
        let s = spec(vec![]);
        assert!(s.id().contains("task"));
    }

    #[test]
    fn ready_when_no_dependencies() {
        let s = spec(vec![]);
        assert!(s.is_ready(&[]));
    }

    #[test]
    fn not_ready_until_dependency_completed() {
        let s = spec(vec!["abc123-task-foo"]);
        assert!(!s.is_ready(&[]));
        assert!(s.is_ready(&["abc123-task-foo"]));
    }

    #[test]
    fn serde_roundtrip() {
        let s = spec(vec![]);
        let json = serde_json::to_string(&s).unwrap();
        let back: TaskSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), s.id());
        assert_eq!(back.name(), s.name());
    }
}
