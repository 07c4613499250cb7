use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use switchyard_agent::ProviderReply;
use uuid::Uuid;

/// Status of a task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting on at least one dependency.
    Pending,
    /// Every dependency is done; waiting for a worker slot.
    Ready,
    Running,
    Done,
    /// Retry budget exhausted.
    Failed,
    /// A transitive dependency failed; never runs.
    Blocked,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed | TaskStatus::Blocked)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Ready => write!(f, "ready"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Blocked => write!(f, "blocked"),
        }
    }
}

/// Per-task state owned by the executor for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub task_id: String,
    pub worker_id: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Provider that produced the result.
    pub provider: Option<String>,
    pub result: Option<ProviderReply>,
    pub error: Option<String>,
    /// The failed task that caused this one to be blocked.
    pub blocked_by: Option<String>,
}

impl ExecutionRecord {
    pub fn new(task_id: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            worker_id: worker_id.into(),
            status: TaskStatus::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
            provider: None,
            result: None,
            error: None,
            blocked_by: None,
        }
    }

    pub fn summary(&self) -> Option<&str> {
        self.result.as_ref().map(|r| r.summary.as_str())
    }
}

/// Aggregate status of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every task is done.
    Succeeded,
    /// Some tasks are done, others failed or blocked.
    Partial,
    /// No task is done.
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub blocked: usize,
}

impl RunSummary {
    pub fn from_records(records: &[ExecutionRecord]) -> Self {
        let count = |status: TaskStatus| records.iter().filter(|r| r.status == status).count();
        Self {
            total: records.len(),
            done: count(TaskStatus::Done),
            failed: count(TaskStatus::Failed),
            blocked: count(TaskStatus::Blocked),
        }
    }

    pub fn status(&self) -> RunStatus {
        if self.done == self.total {
            RunStatus::Succeeded
        } else if self.done == 0 {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} tasks done, {} failed, {} blocked",
            self.done, self.total, self.failed, self.blocked
        )
    }
}

/// Outcome of one run: a status for every task plus the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub summary: RunSummary,
    /// One record per task, in plan order.
    pub records: Vec<ExecutionRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn record(&self, task_id: &str) -> Option<&ExecutionRecord> {
        self.records.iter().find(|r| r.task_id == task_id)
    }

    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.record(task_id).map(|r| r.status)
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(id: &str, status: TaskStatus) -> ExecutionRecord {
        let mut r = ExecutionRecord::new(id, "w");
        r.status = status;
        r
    }

    #[test]
    fn test_summary_and_status() {
        let records = vec![
            record("A", TaskStatus::Done),
            record("B", TaskStatus::Failed),
            record("C", TaskStatus::Blocked),
        ];
        let summary = RunSummary::from_records(&records);
        assert_eq!(summary.to_string(), "1/3 tasks done, 1 failed, 1 blocked");
        assert_eq!(summary.status(), RunStatus::Partial);

        let summary = RunSummary::from_records(&records[..1]);
        assert_eq!(summary.status(), RunStatus::Succeeded);
        let summary = RunSummary::from_records(&records[1..]);
        assert_eq!(summary.status(), RunStatus::Failed);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::Blocked).unwrap();
        assert_eq!(json, "\"blocked\"");
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Ready.is_terminal());
    }
}
