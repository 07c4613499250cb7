use crate::config::OrchestratorConfig;
use crate::dag::validate;
use crate::decomposer::{DecomposeMode, Decomposer, Decomposition, Strategy};
use crate::events::{EventBus, ExecutionEvent};
use crate::executor::Executor;
use crate::history::PerformanceHistory;
use crate::router::{RouteOutcome, Router};
use crate::selector::Selector;
use crate::types::RunResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use switchyard_agent::{CompletionBackend, ProviderCompletion, ProviderPool};
use switchyard_core::{Catalog, PlanDocument, Selection, SwitchyardResult};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// A validated plan that has not run yet.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedGoal {
    pub route: RouteOutcome,
    pub selection: Selection,
    pub strategy: Strategy,
    pub document: PlanDocument,
}

/// Final result of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorResult {
    pub goal: String,
    pub route: RouteOutcome,
    pub selection: Selection,
    pub strategy: Strategy,
    pub document: PlanDocument,
    pub run: RunResult,
    pub duration_ms: u64,
}

impl OrchestratorResult {
    pub fn is_success(&self) -> bool {
        self.run.is_success()
    }
}

/// The orchestrator pipeline.
/// Implements the route → select → decompose → validate → execute pattern.
pub struct Orchestrator {
    catalog: Arc<Catalog>,
    router: Router,
    selector: Selector,
    decomposer: Decomposer,
    executor: Executor,
    history: Arc<PerformanceHistory>,
    mode: DecomposeMode,
}

impl Orchestrator {
    /// Wire every stage from `config` around an existing catalog and pool.
    pub fn new(
        catalog: Arc<Catalog>,
        pool: Arc<ProviderPool>,
        config: &OrchestratorConfig,
    ) -> SwitchyardResult<Self> {
        let history = Arc::new(PerformanceHistory::new(config.selector.history_window));
        let router = Router::from_catalog(&catalog)?;
        let selector = Selector::new(Arc::clone(&catalog), config.selector.clone())
            .with_history(Arc::clone(&history));
        let decomposer =
            Decomposer::new(Arc::clone(&catalog)).with_max_tasks(config.decomposer.max_tasks);
        let executor = Executor::new(Arc::clone(&pool), config.executor.clone())
            .with_history(Arc::clone(&history));

        Ok(Self {
            catalog,
            router,
            selector,
            decomposer,
            executor,
            history,
            mode: config.decomposer.mode,
        })
    }

    /// Build the catalog and providers declared in `config`.
    ///
    /// In model mode the planning prompt goes through the same provider chain
    /// as task execution, addressed to `decomposer.planner_worker`.
    pub fn from_config(config: &OrchestratorConfig) -> SwitchyardResult<Self> {
        let catalog = Arc::new(config.catalog()?);
        let pool = Arc::new(ProviderPool::from_configs(
            config.providers.clone(),
            config.failover.clone(),
        )?);

        let orchestrator = Self::new(catalog, Arc::clone(&pool), config)?;
        if config.decomposer.mode == DecomposeMode::Model {
            let completion = ProviderCompletion::new(pool, config.decomposer.planner_worker.clone())
                .with_order(config.executor.provider_order.clone())
                .with_timeout(config.decomposer.timeout());
            return Ok(orchestrator.with_completion(Arc::new(completion)));
        }
        Ok(orchestrator)
    }

    /// Use `backend` for model-backed decomposition.
    pub fn with_completion(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.decomposer = self.decomposer.with_backend(backend);
        self
    }

    /// Replace the event bus. Subscribers of the old bus stop receiving events.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.executor = self.executor.with_events(events);
        self
    }

    pub fn with_mode(mut self, mode: DecomposeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn history(&self) -> &Arc<PerformanceHistory> {
        &self.history
    }

    /// Subscribe to execution progress of every subsequent run.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.executor.events().subscribe()
    }

    /// Route or select, decompose, and validate. Nothing is executed.
    pub async fn plan(&self, goal: &str) -> SwitchyardResult<PlannedGoal> {
        self.plan_with_paths(goal, &[] as &[&str]).await
    }

    /// Like [`plan`](Self::plan), with target paths for the glob stage.
    pub async fn plan_with_paths<S: AsRef<str>>(
        &self,
        goal: &str,
        paths: &[S],
    ) -> SwitchyardResult<PlannedGoal> {
        let route = if paths.is_empty() {
            self.router.route(goal)
        } else {
            self.router.route_request(goal, paths)
        };
        let selection = if route.is_miss() {
            self.selector.select(goal)
        } else {
            let max = self.selector.config().max.max(1);
            Selection::from_ids(
                route.candidates.iter().take(max),
                &format!("router:{}", route.stage),
            )
        };
        info!(
            stage = %route.stage,
            workers = ?selection.ids(),
            "Orchestrator: workers chosen"
        );

        let Decomposition {
            plan,
            orders,
            agents,
            strategy,
            model_attempts,
        } = self.decomposer.decompose(goal, &selection, self.mode).await;
        info!(
            strategy = %strategy,
            model_attempts,
            tasks = plan.len(),
            "Orchestrator: plan complete"
        );

        if let Err(e) = validate(&selection, &plan, &orders) {
            warn!(code = e.code(), error = %e, "Orchestrator: plan rejected");
            return Err(e.into());
        }

        Ok(PlannedGoal {
            route,
            selection,
            strategy,
            document: PlanDocument {
                agents,
                plan,
                orders,
            },
        })
    }

    /// Validate and run an externally supplied plan document.
    ///
    /// The document's `agents` act as the selection; an empty list admits every
    /// catalog worker.
    pub async fn execute(&self, document: &PlanDocument) -> SwitchyardResult<RunResult> {
        let selection = if document.agents.is_empty() {
            Selection::from_ids(self.catalog.ids(), "catalog")
        } else {
            Selection::from_ids(document.agents.iter().map(|a| a.id.as_str()), "document")
        };
        if let Err(e) = validate(&selection, &document.plan, &document.orders) {
            warn!(code = e.code(), error = %e, "Orchestrator: plan rejected");
            return Err(e.into());
        }
        Ok(self
            .executor
            .run_with_catalog(&document.plan, &document.orders, &self.catalog)
            .await)
    }

    /// Run the full pipeline for `goal`.
    pub async fn run(&self, goal: &str) -> SwitchyardResult<OrchestratorResult> {
        let start = Instant::now();
        info!(goal = %goal, "Orchestrator: starting pipeline");

        let planned = self.plan(goal).await?;
        let run = self
            .executor
            .run_with_catalog(&planned.document.plan, &planned.document.orders, &self.catalog)
            .await;

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            duration_ms,
            status = ?run.status,
            summary = %run.summary,
            "Orchestrator: pipeline complete"
        );

        Ok(OrchestratorResult {
            goal: goal.to_string(),
            route: planned.route,
            selection: planned.selection,
            strategy: planned.strategy,
            document: planned.document,
            run,
            duration_ms,
        })
    }
}
