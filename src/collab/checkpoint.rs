//! CheckpointStore: crash-recovery of a partially-completed run. Not
//! required for correctness within a single process lifetime.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, task_id: &str, blob: Vec<u8>);
    async fn load(&self, task_id: &str) -> Option<Vec<u8>>;
}

/// In-memory reference implementation; checkpoints do not survive a
/// process restart, matching the "not required for correctness" contract.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, task_id: &str, blob: Vec<u8>) {
        self.blobs.lock().unwrap().insert(task_id.to_string(), blob);
    }

    async fn load(&self, task_id: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(task_id).cloned()
    }
}
