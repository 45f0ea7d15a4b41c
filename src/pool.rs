//! AgentPool (C8): bounds how many agents of each type can run at once
//! and leases each one a dedicated worktree to work in.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::info;

use crate::domain::{AgentSlot, AgentType};
use crate::worktree::{WorktreeError, WorktreeManager};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worktree error: {0}")]
    Worktree(#[from] WorktreeError),
}

/// Per-agent-type concurrency cap. Types not listed fall back to
/// `default_capacity`.
#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    pub default_capacity: usize,
    pub capacity_by_type: HashMap<String, usize>,
}

impl PoolConfig {
    pub fn capacity_for(&self, agent_type: &AgentType) -> usize {
        self.capacity_by_type
            .get(agent_type.as_str())
            .copied()
            .unwrap_or(self.default_capacity)
    }
}

/// A leased agent slot plus a token to hand back on release. Holding this
/// alive keeps the underlying semaphore permit acquired.
pub struct LeasedSlot {
    pub slot: AgentSlot,
    permit: tokio::sync::OwnedSemaphorePermit,
}

impl LeasedSlot {
    pub fn working_copy(&self) -> &str {
        &self.slot.working_copy
    }
}

impl Drop for LeasedSlot {
    fn drop(&mut self) {
        // Permit is released automatically when `permit` drops; this
        // exists so callers can see at a glance that release is implicit.
        let _ = &self.permit;
    }
}

/// Bounded pool of agent execution capacity, one semaphore per agent type,
/// each lease backed by its own git worktree via `WorktreeManager`.
pub struct AgentPool {
    config: PoolConfig,
    worktrees: Arc<WorktreeManager>,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
    leased: Mutex<usize>,
}

impl AgentPool {
    pub fn new(config: PoolConfig, worktrees: Arc<WorktreeManager>) -> Self {
        Self {
            config,
            worktrees,
            semaphores: Mutex::new(HashMap::new()),
            leased: Mutex::new(0),
        }
    }

    async fn semaphore_for(&self, agent_type: &AgentType) -> Arc<Semaphore> {
        let mut sems = self.semaphores.lock().await;
        sems.entry(agent_type.as_str().to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.capacity_for(agent_type).max(1))))
            .clone()
    }

    /// Blocks until a slot of `agent_type` is free, then creates a fresh
    /// worktree for the task and returns a leased slot bound to it.
    pub async fn acquire(&self, agent_type: &AgentType, exec_id: &str) -> Result<LeasedSlot, PoolError> {
        let semaphore = self.semaphore_for(agent_type).await;
        let permit = semaphore
            .acquire_owned()
            .await
            .expect("AgentPool semaphore is never closed");

        let worktree = self.worktrees.create(exec_id).await?;
        let slot = AgentSlot::new(agent_type.clone(), worktree.path.to_string_lossy().to_string());

        *self.leased.lock().await += 1;
        info!(agent_type = %agent_type, exec_id, "AgentPool::acquire: leased slot");

        Ok(LeasedSlot { slot, permit })
    }

    /// Releases the worktree backing a slot. The semaphore permit itself
    /// is released when `leased` is dropped by the caller.
    pub async fn release(&self, mut leased: LeasedSlot, exec_id: &str) -> Result<(), PoolError> {
        leased.slot.mark_released();
        self.worktrees.remove(exec_id).await?;
        *self.leased.lock().await -= 1;
        info!(exec_id, "AgentPool::release: released slot");
        Ok(())
    }

    pub async fn leased_count(&self) -> usize {
        *self.leased.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worktree::WorktreeConfig;
    use std::process::Command as StdCommand;
    use tempfile::tempdir;

    fn init_repo(dir: &std::path::Path) {
        StdCommand::new("git").args(["init"]).current_dir(dir).output().unwrap();
        StdCommand::new("git")
            .args(["config", "user.email", "test@test.com"])
            .current_dir(dir)
            .output()
            .unwrap();
        StdCommand::new("git").args(["config", "user.name", "Test"]).current_dir(dir).output().unwrap();
        StdCommand::new("git")
            .args(["commit", "--allow-empty", "-m", "initial"])
            .current_dir(dir)
            .output()
            .unwrap();
    }

    fn pool(repo_root: &std::path::Path) -> AgentPool {
        let worktree_config = WorktreeConfig {
            base_dir: repo_root.join("worktrees"),
            repo_root: repo_root.to_path_buf(),
            min_disk_space_gb: 0,
            branch_prefix: "nexus".to_string(),
        };
        let mut config = PoolConfig {
            default_capacity: 1,
            capacity_by_type: HashMap::new(),
        };
        config.capacity_by_type.insert("coder".to_string(), 2);
        AgentPool::new(config, Arc::new(WorktreeManager::new(worktree_config)))
    }

    #[tokio::test]
    async fn acquire_then_release_round_trips() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let p = pool(dir.path());

        let leased = p.acquire(&AgentType::new("coder"), "exec-1").await.unwrap();
        assert_eq!(p.leased_count().await, 1);
        assert!(std::path::Path::new(leased.working_copy()).exists());

        p.release(leased, "exec-1").await.unwrap();
        assert_eq!(p.leased_count().await, 0);
    }

    #[tokio::test]
    async fn capacity_is_per_agent_type() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let p = pool(dir.path());

        let a = p.acquire(&AgentType::new("coder"), "exec-a").await.unwrap();
        let b = p.acquire(&AgentType::new("coder"), "exec-b").await.unwrap();
        assert_eq!(p.leased_count().await, 2);

        p.release(a, "exec-a").await.unwrap();
        p.release(b, "exec-b").await.unwrap();
    }
}
