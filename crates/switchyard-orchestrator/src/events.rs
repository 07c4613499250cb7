use crate::types::RunSummary;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Progress of a run, published as it happens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    RunStarted { run_id: Uuid, tasks: usize },
    TaskReady { task_id: String },
    TaskStarted { task_id: String, worker_id: String, attempt: u32 },
    TaskRetrying { task_id: String, attempt: u32, error: String },
    TaskCompleted { task_id: String, provider: String, elapsed_ms: u64 },
    TaskFailed { task_id: String, error: String },
    TaskBlocked { task_id: String, blocked_by: String },
    RunFinished { run_id: Uuid, summary: RunSummary },
}

/// Fan-out channel for [`ExecutionEvent`]s.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// dropped, and slow subscribers observe `Lagged` instead of stalling the run.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ExecutionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
