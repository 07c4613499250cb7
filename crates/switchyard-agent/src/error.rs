use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use switchyard_core::SwitchyardError;
use thiserror::Error;

/// A convenience `Result` alias using [`ProviderError`].
pub type ProviderResult<T> = Result<T, ProviderError>;

/// One failed attempt against one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub provider: String,
    pub error: String,
    pub elapsed_ms: u64,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({}ms)", self.provider, self.error, self.elapsed_ms)
    }
}

/// Errors produced by provider backends and the failover chain.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider '{provider}' timed out after {after:?}")]
    Timeout { provider: String, after: Duration },

    /// Non-2xx HTTP status.
    #[error("provider '{provider}' returned HTTP {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    /// Connection, DNS, or body-read failure.
    #[error("provider '{provider}' transport error: {message}")]
    Transport { provider: String, message: String },

    /// Local process could not be spawned or exited unsuccessfully.
    #[error("provider '{provider}' process error: {message}")]
    Process { provider: String, message: String },

    /// The provider answered, but not with a usable reply.
    #[error("provider '{provider}' protocol error: {message}")]
    Protocol { provider: String, message: String },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("no providers configured")]
    NoProviders,

    #[error("provider config error: {0}")]
    Config(String),

    /// Every provider in the order failed.
    #[error("all providers failed: {}", join_attempts(.attempts))]
    Exhausted { attempts: Vec<AttemptFailure> },
}

fn join_attempts(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout { .. })
    }

    /// Attempts recorded by an exhausted failover chain, empty otherwise.
    pub fn attempts(&self) -> &[AttemptFailure] {
        match self {
            ProviderError::Exhausted { attempts } => attempts,
            _ => &[],
        }
    }
}

impl From<ProviderError> for SwitchyardError {
    fn from(err: ProviderError) -> Self {
        SwitchyardError::Provider(err.to_string())
    }
}
