//! EventSink: the observation surface emitted at every state transition.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, topic: &str, payload: Value);
}

/// Emits every event through `tracing`, matching the teacher's structured
/// logging convention rather than standing up a real message bus.
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, topic: &str, payload: Value) {
        info!(%topic, %payload, "event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_does_not_panic() {
        let sink = TracingEventSink;
        sink.emit("task.started", serde_json::json!({"taskId": "t1"})).await;
    }
}
