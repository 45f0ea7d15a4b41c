//! TaskQueue / DependencyResolver (C7): turns a flat set of TaskSpecs into
//! waves of concurrently-runnable work, detecting cycles up front and
//! cascading failures to dependents as they arrive.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::domain::TaskSpec;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("dependency cycle detected: {0}")]
    Cycle(String),
    #[error("task references unknown dependency: {0}")]
    UnknownDependency(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    BlockedByUpstream,
}

#[derive(Debug, Clone)]
struct Node {
    spec: TaskSpec,
    state: TaskState,
    sequence: usize,
}

#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub blocked: usize,
}

/// Dependency-aware task queue. Computes ready waves with Kahn's
/// algorithm so every task in a wave has all its dependencies already
/// completed, and the wave itself contains no internal ordering
/// requirement — callers may run it fully concurrently.
pub struct TaskQueue {
    nodes: HashMap<String, Node>,
    order: Vec<String>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Adds tasks to the queue, validating the combined graph (existing +
    /// new) is acyclic and every dependency id resolves to a submitted
    /// task before committing any of them.
    pub fn submit(&mut self, tasks: Vec<TaskSpec>) -> Result<(), QueueError> {
        let mut known: HashSet<String> = self.nodes.keys().cloned().collect();
        for t in &tasks {
            known.insert(t.id().to_string());
        }

        for t in &tasks {
            for dep in t.dependencies() {
                if !known.contains(dep) {
                    return Err(QueueError::UnknownDependency(dep.clone()));
                }
            }
        }

        let mut combined_deps: HashMap<String, Vec<String>> = self
            .nodes
            .iter()
            .map(|(id, n)| (id.clone(), n.spec.dependencies().to_vec()))
            .collect();
        for t in &tasks {
            combined_deps.insert(t.id().to_string(), t.dependencies().to_vec());
        }

        if let Some(cycle) = Self::find_cycle(&combined_deps) {
            return Err(QueueError::Cycle(cycle.join(" -> ")));
        }

        let mut next_seq = self.order.len();
        for t in tasks {
            let id = t.id().to_string();
            self.nodes.insert(
                id.clone(),
                Node {
                    spec: t,
                    state: TaskState::Pending,
                    sequence: next_seq,
                },
            );
            self.order.push(id);
            next_seq += 1;
        }

        self.recompute_ready();
        Ok(())
    }

    fn find_cycle(deps: &HashMap<String, Vec<String>>) -> Option<Vec<String>> {
        #[derive(PartialEq, Clone, Copy)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks: HashMap<&str, Mark> = deps.keys().map(|k| (k.as_str(), Mark::Unvisited)).collect();
        let mut stack: Vec<String> = Vec::new();

        fn visit<'a>(
            node: &'a str,
            deps: &'a HashMap<String, Vec<String>>,
            marks: &mut HashMap<&'a str, Mark>,
            stack: &mut Vec<String>,
        ) -> Option<Vec<String>> {
            match marks.get(node) {
                Some(Mark::Done) => return None,
                Some(Mark::InProgress) => {
                    let start = stack.iter().position(|n| n == node).unwrap_or(0);
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(node.to_string());
                    return Some(cycle);
                }
                _ => {}
            }

            marks.insert(node, Mark::InProgress);
            stack.push(node.to_string());

            if let Some(dependencies) = deps.get(node) {
                for dep in dependencies {
                    if let Some(cycle) = visit(dep, deps, marks, stack) {
                        return Some(cycle);
                    }
                }
            }

            stack.pop();
            marks.insert(node, Mark::Done);
            None
        }

        for node in deps.keys() {
            if marks.get(node.as_str()) == Some(&Mark::Unvisited) {
                if let Some(cycle) = visit(node, deps, &mut marks, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn recompute_ready(&mut self) {
        let completed: HashSet<String> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.state == TaskState::Completed)
            .map(|(id, _)| id.clone())
            .collect();

        let pending_ids: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.state == TaskState::Pending)
            .map(|(id, _)| id.clone())
            .collect();

        for id in pending_ids {
            let ready = {
                let node = &self.nodes[&id];
                node.spec
                    .dependencies()
                    .iter()
                    .all(|d| completed.contains(d))
            };
            if ready {
                self.nodes.get_mut(&id).unwrap().state = TaskState::Ready;
            }
        }
    }

    /// The next wave of tasks ready to run concurrently, ordered by
    /// submission sequence for determinism. Does not mark them Running —
    /// callers do that as they actually dispatch each task.
    pub fn ready_wave(&self) -> Vec<&TaskSpec> {
        let mut ready: Vec<&Node> = self.nodes.values().filter(|n| n.state == TaskState::Ready).collect();
        ready.sort_by_key(|n| n.sequence);
        ready.into_iter().map(|n| &n.spec).collect()
    }

    pub fn mark_running(&mut self, task_id: &str) {
        if let Some(n) = self.nodes.get_mut(task_id) {
            n.state = TaskState::Running;
        }
    }

    pub fn mark_complete(&mut self, task_id: &str) {
        if let Some(n) = self.nodes.get_mut(task_id) {
            n.state = TaskState::Completed;
        }
        self.recompute_ready();
    }

    /// Marks a task failed and cascades `BlockedByUpstream` to every
    /// transitive dependent via BFS over the dependency graph.
    pub fn mark_failed(&mut self, task_id: &str) {
        if let Some(n) = self.nodes.get_mut(task_id) {
            n.state = TaskState::Failed;
        }

        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(task_id.to_string());
        let mut blocked_roots: HashSet<String> = HashSet::new();
        blocked_roots.insert(task_id.to_string());

        while let Some(current) = queue.pop_front() {
            let dependents: Vec<String> = self
                .nodes
                .iter()
                .filter(|(_, n)| n.spec.dependencies().iter().any(|d| d == &current))
                .map(|(id, _)| id.clone())
                .collect();

            for dep_id in dependents {
                if blocked_roots.contains(&dep_id) {
                    continue;
                }
                blocked_roots.insert(dep_id.clone());
                if let Some(n) = self.nodes.get_mut(&dep_id) {
                    if n.state != TaskState::Completed && n.state != TaskState::Running {
                        n.state = TaskState::BlockedByUpstream;
                    }
                }
                queue.push_back(dep_id);
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        self.nodes
            .values()
            .any(|n| matches!(n.state, TaskState::Pending | TaskState::Ready | TaskState::Running))
    }

    pub fn state_of(&self, task_id: &str) -> Option<TaskState> {
        self.nodes.get(task_id).map(|n| n.state)
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for n in self.nodes.values() {
            match n.state {
                TaskState::Pending => stats.pending += 1,
                TaskState::Ready => stats.ready += 1,
                TaskState::Running => stats.running += 1,
                TaskState::Completed => stats.completed += 1,
                TaskState::Failed => stats.failed += 1,
                TaskState::BlockedByUpstream => stats.blocked += 1,
            }
        }
        stats
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
