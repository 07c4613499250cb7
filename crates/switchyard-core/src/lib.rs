//! Core types and error definitions for the Switchyard orchestrator.
//!
//! This crate provides the foundational types shared across all Switchyard crates:
//! the read-only worker catalog, the plan data model, and the error taxonomy.
//!
//! # Main types
//!
//! - [`SwitchyardError`] — Unified error enum for fatal and surfaced conditions.
//! - [`SwitchyardResult`] — Convenience alias for `Result<T, SwitchyardError>`.
//! - [`Worker`] — A capability-tagged catalog entry.
//! - [`Catalog`] — Process-wide, read-only snapshot of workers.
//! - [`Plan`] / [`Task`] / [`Order`] — The task graph and its worker-scoped instructions.
//! - [`TaskPayload`] — Text or structured task input, resolved at plan-build time.
//! - [`Selection`] — Workers chosen for a goal, with scores and reasons.

/// Error taxonomy.
pub mod error;
/// Plan, task, and order data model.
pub mod plan;
/// Worker selections.
pub mod selection;
/// Tracing subscriber setup.
pub mod telemetry;
/// Workers, triggers, and the catalog snapshot.
pub mod worker;

pub use error::{SwitchyardError, SwitchyardResult};
pub use plan::{AgentPick, Order, Plan, PlanDocument, Task, TaskPayload};
pub use selection::{Pick, Selection};
pub use worker::{Catalog, PatternTrigger, TriggerSpec, Worker};
