//! Provider adapter for the Switchyard orchestrator.
//!
//! Wraps heterogeneous compute providers behind one envelope and fails over
//! between them in a caller-chosen order.
//!
//! # Main types
//!
//! - [`ProviderBackend`] — Trait implemented by every transport.
//! - [`HttpBackend`] — `POST /run`, with optional server-sent event streaming.
//! - [`ProcessBackend`] — Local command speaking JSON over stdin/stdout.
//! - [`ProviderPool`] — Ordered failover chain with per-attempt timeouts.
//! - [`CompletionBackend`] — Prompt-to-text seam used by the decomposer.

/// Transport implementations.
pub mod backends;
/// Prompt completion over the provider chain.
pub mod completion;
/// Provider declarations.
pub mod config;
/// Request and reply envelopes.
pub mod envelope;
/// Provider error taxonomy.
pub mod error;
/// Ordered failover between providers.
pub mod failover;
/// Stream events and the SSE decoder.
pub mod stream;

pub use backends::{build_backend, HttpBackend, ProcessBackend, ProviderBackend, ReplyStream};
pub use completion::{CompletionBackend, ProviderCompletion};
pub use config::{ProviderConfig, ProviderKind};
pub use envelope::{Handoff, InvokeRequest, Invocation, ProviderReply, Usage};
pub use error::{AttemptFailure, ProviderError, ProviderResult};
pub use failover::{compute_backoff, FailoverPolicy, ProviderPool, StreamInvocation};
pub use stream::{SseDecoder, SseFrame, StreamEvent};
