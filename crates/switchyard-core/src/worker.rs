use crate::error::{SwitchyardError, SwitchyardResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A regex trigger with its routing priority. Higher priorities are tried first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternTrigger {
    pub pattern: String,
    #[serde(default)]
    pub priority: i32,
}

/// Raw trigger definitions declared by a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    /// Literal keywords matched by containment against lower-cased input.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Regex patterns, matched case-insensitively.
    #[serde(default)]
    pub patterns: Vec<PatternTrigger>,
    /// File globs matched against target paths.
    #[serde(default)]
    pub globs: Vec<String>,
}

impl TriggerSpec {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.patterns.is_empty() && self.globs.is_empty()
    }
}

/// A capability-tagged catalog entry the orchestrator can dispatch work to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Ordered capability tags.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Free-form responsibility statements, used for goal matching.
    #[serde(default)]
    pub responsibilities: Vec<String>,
    /// Tools this worker is allowed to use.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Maximum number of tasks this worker may run at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-call timeout applied to every provider attempt for this worker.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Member of the restricted core subset preferred by the selector.
    #[serde(default)]
    pub core: bool,
    #[serde(default)]
    pub triggers: TriggerSpec,
}

fn default_concurrency() -> usize {
    1
}

fn default_timeout_secs() -> u64 {
    600
}

impl Worker {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            capabilities: Vec::new(),
            responsibilities: Vec::new(),
            tools: Vec::new(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            core: false,
            triggers: TriggerSpec::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = caps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_responsibilities<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responsibilities = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_triggers(mut self, triggers: TriggerSpec) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn as_core(mut self) -> Self {
        self.core = true;
        self
    }

    /// Concurrency cap, never below one.
    pub fn concurrency_limit(&self) -> usize {
        self.concurrency.max(1)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Name if set, otherwise the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Read-only snapshot of every worker known to the process.
///
/// Built once at startup and shared by `Arc` with the router, selector, and
/// executor. There is no way to mutate a catalog after construction.
#[derive(Debug, Clone)]
pub struct Catalog {
    workers: Vec<Arc<Worker>>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog, rejecting empty input and duplicate ids.
    pub fn new(workers: Vec<Worker>) -> SwitchyardResult<Self> {
        if workers.is_empty() {
            return Err(SwitchyardError::EmptyCatalog);
        }

        let mut index = HashMap::with_capacity(workers.len());
        for (pos, worker) in workers.iter().enumerate() {
            if worker.id.trim().is_empty() {
                return Err(SwitchyardError::Config("worker id must not be empty".into()));
            }
            if index.insert(worker.id.clone(), pos).is_some() {
                return Err(SwitchyardError::DuplicateWorker(worker.id.clone()));
            }
        }

        tracing::info!(workers = workers.len(), "Worker catalog loaded");

        Ok(Self {
            workers: workers.into_iter().map(Arc::new).collect(),
            index,
        })
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Worker>> {
        self.index.get(id).map(|&pos| &self.workers[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Workers in declaration order.
    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    /// Workers flagged as members of the core subset.
    pub fn core_workers(&self) -> Vec<&Arc<Worker>> {
        self.workers.iter().filter(|w| w.core).collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Sorted worker ids.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.workers.iter().map(|w| w.id.as_str()).collect();
        ids.sort_unstable();
        ids
    }
}
