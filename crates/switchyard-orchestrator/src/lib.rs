//! Goal routing, worker selection, plan decomposition, and DAG execution.
//!
//! Implements the route → select → decompose → validate → execute pipeline:
//! a goal is matched against worker triggers (or scored against the whole
//! catalog), expanded into a task graph, checked for integrity, and executed
//! against the provider pool with per-worker concurrency caps, retries, and
//! failure propagation along dependency edges.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Top-level engine wiring every stage together.
//! - [`Router`] — Deterministic staged trigger matching (glob, keyword, regex).
//! - [`Selector`] — Multi-signal worker ranking with fallback padding.
//! - [`Decomposer`] — Heuristic or model-backed plan construction.
//! - [`validate`] — Pure referential-integrity and acyclicity check.
//! - [`Executor`] — Dependency-aware concurrent plan execution.
//! - [`EventBus`] — Broadcast channel of [`ExecutionEvent`]s.

/// TOML configuration.
pub mod config;
/// Plan validation.
pub mod dag;
/// Goal decomposition strategies.
pub mod decomposer;
/// Pipeline engine.
pub mod engine;
/// Execution progress events.
pub mod events;
/// Plan execution.
pub mod executor;
/// Rolling per-worker success rates.
pub mod history;
/// Staged trigger routing.
pub mod router;
/// Worker ranking.
pub mod selector;
/// Tokenisation and similarity helpers.
pub mod text;
/// Compiled trigger tables.
pub mod triggers;
/// Run and task status types.
pub mod types;

pub use config::{DecomposerConfig, OrchestratorConfig};
pub use dag::{topological_order, validate, PlanError};
pub use decomposer::{DecomposeMode, Decomposer, Decomposition, Strategy};
pub use engine::{Orchestrator, OrchestratorResult, PlannedGoal};
pub use events::{EventBus, ExecutionEvent};
pub use executor::{Executor, ExecutorConfig};
pub use history::PerformanceHistory;
pub use router::{FileMatch, FileRouteOutcome, RouteOutcome, RouteStage, Router};
pub use selector::{Selector, SelectorConfig, SignalWeights};
pub use triggers::TriggerTable;
pub use types::{ExecutionRecord, RunResult, RunStatus, RunSummary, TaskStatus};
