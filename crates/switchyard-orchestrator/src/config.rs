use crate::decomposer::{DecomposeMode, DEFAULT_MAX_TASKS};
use crate::executor::ExecutorConfig;
use crate::selector::SelectorConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use switchyard_agent::{FailoverPolicy, ProviderConfig};
use switchyard_core::{Catalog, SwitchyardError, SwitchyardResult, Worker};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecomposerConfig {
    #[serde(default)]
    pub mode: DecomposeMode,
    /// Worker id the planning prompt is sent as. Providers see it as `workerId`.
    #[serde(default = "default_planner_worker")]
    pub planner_worker: String,
    #[serde(default = "default_planner_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
}

fn default_planner_worker() -> String {
    "planner".to_string()
}

fn default_planner_timeout_secs() -> u64 {
    120
}

fn default_max_tasks() -> usize {
    DEFAULT_MAX_TASKS
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self {
            mode: DecomposeMode::default(),
            planner_worker: default_planner_worker(),
            timeout_secs: default_planner_timeout_secs(),
            max_tasks: default_max_tasks(),
        }
    }
}

impl DecomposerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Everything the orchestrator needs, loadable from one TOML file.
///
/// ```toml
/// [selector]
/// fallback = ["architect", "backend"]
///
/// [decomposer]
/// mode = "model"
///
/// [executor]
/// max_retries = 1
/// provider_order = ["primary", "local"]
///
/// [[providers]]
/// name = "primary"
/// kind = "http"
/// base_url = "http://localhost:8080"
///
/// [[workers]]
/// id = "backend"
/// capabilities = ["api", "database"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub decomposer: DecomposerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub failover: FailoverPolicy,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub workers: Vec<Worker>,
}

impl OrchestratorConfig {
    pub fn from_toml_str(text: &str) -> SwitchyardResult<Self> {
        let config: OrchestratorConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SwitchyardResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!(
            path = %path.display(),
            workers = config.workers.len(),
            providers = config.providers.len(),
            "Loaded orchestrator config"
        );
        Ok(config)
    }

    /// Cross-field checks serde cannot express.
    pub fn validate(&self) -> SwitchyardResult<()> {
        if self.selector.min > self.selector.max {
            return Err(SwitchyardError::Config(format!(
                "selector.min ({}) exceeds selector.max ({})",
                self.selector.min, self.selector.max
            )));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name.as_str()) {
                return Err(SwitchyardError::Config(format!(
                    "provider '{}' is declared twice",
                    provider.name
                )));
            }
        }
        if let Some(unknown) = self
            .executor
            .provider_order
            .iter()
            .find(|name| !names.contains(name.as_str()))
        {
            return Err(SwitchyardError::Config(format!(
                "executor.provider_order names unknown provider '{unknown}'"
            )));
        }
        Ok(())
    }

    /// Snapshot the `[[workers]]` tables into a catalog.
    pub fn catalog(&self) -> SwitchyardResult<Catalog> {
        Catalog::new(self.workers.clone())
    }
}
