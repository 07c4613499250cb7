use crate::text::tokenize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use switchyard_agent::CompletionBackend;
use switchyard_core::{AgentPick, Catalog, Order, Plan, Selection, Task, TaskPayload};
use tracing::{debug, info, warn};

/// Upper bound on tasks in a model-produced plan.
pub const DEFAULT_MAX_TASKS: usize = 7;

const PLAN_KEYWORDS: &[&str] = &[
    "architect", "architectur", "design", "plan", "planner", "spec", "specif", "analys", "analyz",
    "requir", "research",
];

const VERIFY_KEYWORDS: &[&str] = &[
    "test", "tester", "qa", "quality", "verif", "review", "reviewer", "audit", "secur", "lint",
    "validat",
];

/// Literal schema sent to the model with every request.
const SCHEMA: &str = r#"{
  "plan": [
    {
      "id": "string, unique",
      "title": "string",
      "dependsOn": ["id of another task in this plan"],
      "parallelizable": "boolean",
      "agent": "id of one selected worker",
      "input": "optional string or object handed to the worker"
    }
  ],
  "orders": [
    {
      "order_id": "string",
      "agent_id": "id of one selected worker",
      "objectives": ["string"],
      "constraints": ["string"],
      "expected_outputs": ["string"],
      "handoff": ["string"]
    }
  ]
}"#;

/// Which strategy the caller asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecomposeMode {
    #[default]
    Heuristic,
    Model,
}

/// Which strategy actually produced a decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Heuristic,
    Model,
    /// Model output was rejected twice; the heuristic plan was used.
    Fallback,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Heuristic => write!(f, "heuristic"),
            Strategy::Model => write!(f, "model"),
            Strategy::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Decomposition {
    pub plan: Plan,
    pub orders: Vec<Order>,
    pub agents: Vec<AgentPick>,
    pub strategy: Strategy,
    /// Model requests issued, zero for the heuristic path.
    pub model_attempts: u32,
}

/// Phase of the heuristic template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Plan,
    Execute,
    Verify,
}

impl Phase {
    fn title(self, worker: &str, goal: &str) -> String {
        match self {
            Phase::Plan => format!("Analyze and specify ({worker}): {goal}"),
            Phase::Execute => format!("Implement ({worker}): {goal}"),
            Phase::Verify => format!("Verify ({worker}): {goal}"),
        }
    }

    fn objective(self) -> &'static str {
        match self {
            Phase::Plan => "produce a design and acceptance criteria for the goal",
            Phase::Execute => "implement the goal following the upstream design",
            Phase::Verify => "check the implementation against the acceptance criteria",
        }
    }

    fn expected_output(self) -> &'static str {
        match self {
            Phase::Plan => "design notes",
            Phase::Execute => "working implementation",
            Phase::Verify => "verification report",
        }
    }

    fn handoff(self) -> &'static str {
        match self {
            Phase::Plan => "hand the design to the implementers",
            Phase::Execute => "hand the implementation to the verifiers",
            Phase::Verify => "report findings back to the run",
        }
    }
}

/// Exact top-level shape the model must return.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelOutput {
    plan: Vec<ModelTask>,
    orders: Vec<Order>,
}

#[derive(Debug, Deserialize)]
struct ModelTask {
    id: String,
    title: String,
    #[serde(rename = "dependsOn", default)]
    depends_on: Vec<String>,
    #[serde(default)]
    parallelizable: bool,
    agent: String,
    #[serde(default)]
    input: Option<serde_json::Value>,
}

/// Turns a goal plus a selection into a plan and per-worker orders.
pub struct Decomposer {
    catalog: Arc<Catalog>,
    backend: Option<Arc<dyn CompletionBackend>>,
    max_tasks: usize,
}

impl Decomposer {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            backend: None,
            max_tasks: DEFAULT_MAX_TASKS,
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks.max(1);
        self
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Decompose `goal`. Never fails: model trouble ends in the heuristic plan.
    pub async fn decompose(&self, goal: &str, selection: &Selection, mode: DecomposeMode) -> Decomposition {
        match (mode, &self.backend) {
            (DecomposeMode::Heuristic, _) => self.heuristic(goal, selection),
            (DecomposeMode::Model, None) => {
                warn!("Model decomposition requested without a completion backend");
                self.fallback(goal, selection, 0)
            }
            (DecomposeMode::Model, Some(backend)) => self.model(backend.as_ref(), goal, selection).await,
        }
    }

    /// Plan → Execute → Verify template. Deterministic, no external calls.
    pub fn heuristic(&self, goal: &str, selection: &Selection) -> Decomposition {
        let mut assigned: Vec<(Phase, &str)> = selection
            .ids()
            .into_iter()
            .map(|id| (self.phase_of(id), id))
            .collect();
        // Stable: selection order survives within a phase.
        assigned.sort_by_key(|(phase, _)| *phase);

        let mut tasks: Vec<Task> = Vec::with_capacity(assigned.len());
        let mut previous: Vec<String> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_phase = None;

        for (idx, (phase, worker_id)) in assigned.iter().enumerate() {
            if current_phase != Some(*phase) {
                if !current.is_empty() {
                    previous = std::mem::take(&mut current);
                }
                current_phase = Some(*phase);
            }
            let peers = assigned.iter().filter(|(p, _)| p == phase).count();
            let id = format!("T{}", idx + 1);
            let name = self
                .catalog
                .get(worker_id)
                .map(|w| w.display_name().to_string())
                .unwrap_or_else(|| worker_id.to_string());
            tasks.push(
                Task::new(id.clone(), phase.title(&name, goal), *worker_id)
                    .depends_on(previous.clone())
                    .parallel(peers > 1),
            );
            current.push(id);
        }

        let orders = assigned
            .iter()
            .enumerate()
            .map(|(idx, (phase, worker_id))| {
                let mut order = Order::new(format!("O{}", idx + 1), *worker_id);
                order.objectives.push(phase.objective().to_string());
                order.constraints.push("stay within the worker's declared capabilities".into());
                order.expected_outputs.push(phase.expected_output().to_string());
                order.handoff.push(phase.handoff().to_string());
                order
            })
            .collect();

        debug!(tasks = tasks.len(), "Heuristic decomposition");
        Decomposition {
            plan: Plan::new(tasks),
            orders,
            agents: selection.agents(),
            strategy: Strategy::Heuristic,
            model_attempts: 0,
        }
    }

    fn fallback(&self, goal: &str, selection: &Selection, model_attempts: u32) -> Decomposition {
        let mut decomposition = self.heuristic(goal, selection);
        decomposition.strategy = Strategy::Fallback;
        decomposition.model_attempts = model_attempts;
        decomposition
    }

    async fn model(&self, backend: &dyn CompletionBackend, goal: &str, selection: &Selection) -> Decomposition {
        let prompt = self.prompt(goal, selection);
        let mut request = prompt.clone();

        for attempt in 1..=2u32 {
            let outcome = match backend.complete(&request).await {
                Ok(reply) => self.parse(&reply),
                Err(e) => Err(format!("completion failed: {e}")),
            };
            match outcome {
                Ok((plan, orders)) => {
                    info!(attempt, tasks = plan.len(), "Model decomposition accepted");
                    return Decomposition {
                        plan,
                        orders,
                        agents: selection.agents(),
                        strategy: Strategy::Model,
                        model_attempts: attempt,
                    };
                }
                Err(reason) => {
                    warn!(attempt, error = %reason, "Model decomposition rejected");
                    request = format!(
                        "{prompt}\n\nYour previous response was rejected: {reason}\n\
                         Reply again with only the JSON object described above."
                    );
                }
            }
        }

        self.fallback(goal, selection, 2)
    }

    fn prompt(&self, goal: &str, selection: &Selection) -> String {
        let workers: Vec<String> = selection
            .ids()
            .into_iter()
            .map(|id| match self.catalog.get(id) {
                Some(w) if !w.capabilities.is_empty() => {
                    format!("- {id}: {}", w.capabilities.join(", "))
                }
                _ => format!("- {id}"),
            })
            .collect();

        format!(
            "Break the goal into a task graph for the selected workers.\n\n\
             Goal: {goal}\n\n\
             Selected workers:\n{}\n\n\
             Reply with a single JSON object with exactly the keys \"plan\" and \"orders\", \
             at most {} tasks, matching this schema:\n{SCHEMA}",
            workers.join("\n"),
            self.max_tasks
        )
    }

    /// Strict parse of a model reply. The error string is fed back as a hint.
    fn parse(&self, reply: &str) -> Result<(Plan, Vec<Order>), String> {
        // The reply must be the JSON object alone: prose or code fences are rejected.
        let output: ModelOutput = serde_json::from_str(reply.trim())
            .map_err(|e| format!("reply is not a single JSON object: {e}"))?;

        if output.plan.is_empty() {
            return Err("plan must contain at least one task".into());
        }
        if output.plan.len() > self.max_tasks {
            return Err(format!(
                "plan has {} tasks, at most {} are allowed",
                output.plan.len(),
                self.max_tasks
            ));
        }

        let mut tasks = Vec::with_capacity(output.plan.len());
        for task in output.plan {
            if task.id.trim().is_empty() || task.agent.trim().is_empty() {
                return Err("every task needs a non-empty id and agent".into());
            }
            let payload = match task.input {
                None | Some(serde_json::Value::Null) => TaskPayload::Text(task.title.clone()),
                Some(value) => TaskPayload::from_value(value),
            };
            tasks.push(
                Task::new(task.id, task.title, task.agent)
                    .depends_on(task.depends_on)
                    .parallel(task.parallelizable)
                    .with_payload(payload),
            );
        }

        Ok((Plan::new(tasks), output.orders))
    }

    fn phase_of(&self, worker_id: &str) -> Phase {
        let mut text = worker_id.to_string();
        if let Some(worker) = self.catalog.get(worker_id) {
            for item in worker.capabilities.iter().chain(&worker.responsibilities) {
                text.push(' ');
                text.push_str(item);
            }
        }
        let tokens = tokenize(&text);
        let hits = |keywords: &[&str]| {
            tokens
                .iter()
                .filter(|t| keywords.iter().any(|k| t.starts_with(k)))
                .count()
        };

        // The worker id alone decides when it is unambiguous.
        let id_tokens = tokenize(worker_id);
        let id_hits = |keywords: &[&str]| id_tokens.iter().any(|t| keywords.iter().any(|k| t.starts_with(k)));
        match (id_hits(PLAN_KEYWORDS), id_hits(VERIFY_KEYWORDS)) {
            (true, false) => return Phase::Plan,
            (false, true) => return Phase::Verify,
            _ => {}
        }

        let (plan, verify) = (hits(PLAN_KEYWORDS), hits(VERIFY_KEYWORDS));
        if plan == 0 && verify == 0 {
            Phase::Execute
        } else if verify > plan {
            Phase::Verify
        } else if plan > verify {
            Phase::Plan
        } else {
            Phase::Execute
        }
    }
}
