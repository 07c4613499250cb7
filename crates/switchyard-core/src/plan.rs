use serde::{Deserialize, Serialize};
use std::fmt;

/// Input handed to a provider for one task.
///
/// Resolved once when the plan is built; downstream code matches on the variant
/// instead of inspecting raw JSON. On the wire it is a bare string or an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskPayload {
    Text(String),
    Structured(serde_json::Value),
}

impl TaskPayload {
    /// Classify an arbitrary JSON value.
    pub fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => TaskPayload::Text(s),
            other => TaskPayload::Structured(other),
        }
    }

    /// Textual rendering, used when a backend only accepts prompts.
    pub fn render(&self) -> String {
        match self {
            TaskPayload::Text(text) => text.clone(),
            TaskPayload::Structured(value) => value.to_string(),
        }
    }
}

impl Default for TaskPayload {
    fn default() -> Self {
        TaskPayload::Text(String::new())
    }
}

impl From<&str> for TaskPayload {
    fn from(text: &str) -> Self {
        TaskPayload::Text(text.to_string())
    }
}

impl From<String> for TaskPayload {
    fn from(text: String) -> Self {
        TaskPayload::Text(text)
    }
}

/// One node of a plan.
///
/// A missing or `null` `input` defaults to the task title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTask")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(rename = "dependsOn", default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub parallelizable: bool,
    /// Assigned worker id.
    #[serde(rename = "agent", default)]
    pub worker_id: String,
    #[serde(rename = "input")]
    pub payload: TaskPayload,
}

/// Wire shape of [`Task`] before the payload default is applied.
#[derive(Deserialize)]
struct RawTask {
    id: String,
    title: String,
    #[serde(rename = "dependsOn", default)]
    depends_on: Vec<String>,
    #[serde(default)]
    parallelizable: bool,
    #[serde(rename = "agent", default)]
    worker_id: String,
    #[serde(default)]
    input: Option<serde_json::Value>,
}

impl From<RawTask> for Task {
    fn from(raw: RawTask) -> Self {
        let payload = match raw.input {
            None | Some(serde_json::Value::Null) => TaskPayload::Text(raw.title.clone()),
            Some(value) => TaskPayload::from_value(value),
        };
        Self {
            id: raw.id,
            title: raw.title,
            depends_on: raw.depends_on,
            parallelizable: raw.parallelizable,
            worker_id: raw.worker_id,
            payload,
        }
    }
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, worker_id: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: id.into(),
            payload: TaskPayload::Text(title.clone()),
            title,
            depends_on: Vec::new(),
            parallelizable: false,
            worker_id: worker_id.into(),
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn parallel(mut self, parallelizable: bool) -> Self {
        self.parallelizable = parallelizable;
        self
    }

    pub fn with_payload(mut self, payload: TaskPayload) -> Self {
        self.payload = payload;
        self
    }
}

/// An ordered, immutable task graph.
///
/// Revisions never edit a plan in place: [`Plan::with_suffix`] returns a new plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    tasks: Vec<Task>,
}

impl Plan {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// A new plan consisting of this plan followed by `suffix`.
    pub fn with_suffix(&self, suffix: Vec<Task>) -> Plan {
        let mut tasks = self.tasks.clone();
        tasks.extend(suffix);
        Plan { tasks }
    }
}

/// Worker-scoped instructions that accompany a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    #[serde(rename = "agent_id")]
    pub worker_id: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub expected_outputs: Vec<String>,
    #[serde(default)]
    pub handoff: Vec<String>,
}

impl Order {
    pub fn new(order_id: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            worker_id: worker_id.into(),
            objectives: Vec::new(),
            constraints: Vec::new(),
            expected_outputs: Vec::new(),
            handoff: Vec::new(),
        }
    }
}

/// Entry of the `agents` array in an exchanged plan document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPick {
    pub id: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// The persisted / exchanged plan format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    #[serde(default)]
    pub agents: Vec<AgentPick>,
    pub plan: Plan,
    #[serde(default)]
    pub orders: Vec<Order>,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for task in &self.tasks {
            write!(f, "{} [{}] {}", task.id, task.worker_id, task.title)?;
            if !task.depends_on.is_empty() {
                write!(f, " <- {}", task.depends_on.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
