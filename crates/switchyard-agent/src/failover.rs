use crate::backends::{build_backend, ProviderBackend, ReplyStream};
use crate::config::ProviderConfig;
use crate::envelope::{InvokeRequest, Invocation};
use crate::error::{AttemptFailure, ProviderError, ProviderResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Backoff between providers of a failover chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverPolicy {
    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Upper bound of the random jitter added to each delay.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_backoff_base_ms() -> u64 {
    250
}

fn default_backoff_max_ms() -> u64 {
    10_000
}

fn default_jitter_ms() -> u64 {
    250
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self {
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl FailoverPolicy {
    /// No delay between providers.
    pub fn immediate() -> Self {
        Self {
            backoff_base_ms: 0,
            backoff_max_ms: 0,
            jitter_ms: 0,
        }
    }
}

/// Exponential backoff for the given failure index, capped at `backoff_max_ms`.
pub fn compute_backoff(policy: &FailoverPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

fn backoff_with_jitter(policy: &FailoverPolicy, attempt: u32) -> Duration {
    let jitter = if policy.jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=policy.jitter_ms)
    } else {
        0
    };
    Duration::from_millis(compute_backoff(policy, attempt).saturating_add(jitter))
}

/// A streaming call established by [`ProviderPool::invoke_stream`].
pub struct StreamInvocation {
    pub provider: String,
    pub stream: ReplyStream,
    pub failed_attempts: Vec<AttemptFailure>,
}

/// The registered providers plus the policy used to fail over between them.
///
/// Providers are tried strictly in the order given per call. Each attempt is
/// bounded by the caller's timeout; a failure is recorded and the next provider
/// is tried after a backoff. There are no retries against the same provider
/// here, the executor's retry budget re-enters the whole chain.
pub struct ProviderPool {
    backends: Vec<Arc<dyn ProviderBackend>>,
    policy: FailoverPolicy,
}

impl ProviderPool {
    pub fn new(policy: FailoverPolicy) -> Self {
        Self {
            backends: Vec::new(),
            policy,
        }
    }

    /// Build every configured provider, in declaration order.
    pub fn from_configs(
        configs: impl IntoIterator<Item = ProviderConfig>,
        policy: FailoverPolicy,
    ) -> ProviderResult<Self> {
        let mut pool = Self::new(policy);
        for config in configs {
            pool.register(build_backend(config)?)?;
        }
        Ok(pool)
    }

    /// Add a provider. Names must be unique.
    pub fn register(&mut self, backend: Arc<dyn ProviderBackend>) -> ProviderResult<()> {
        if self.backends.iter().any(|b| b.name() == backend.name()) {
            return Err(ProviderError::Config(format!(
                "duplicate provider '{}'",
                backend.name()
            )));
        }
        info!(provider = %backend.name(), "Registered provider");
        self.backends.push(backend);
        Ok(())
    }

    pub fn with_backend(mut self, backend: Arc<dyn ProviderBackend>) -> ProviderResult<Self> {
        self.register(backend)?;
        Ok(self)
    }

    pub fn policy(&self) -> &FailoverPolicy {
        &self.policy
    }

    /// Registered provider names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Map a provider order onto backends. An empty order means registration order.
    pub fn resolve_order(&self, order: &[String]) -> ProviderResult<Vec<Arc<dyn ProviderBackend>>> {
        if self.backends.is_empty() {
            return Err(ProviderError::NoProviders);
        }
        if order.is_empty() {
            return Ok(self.backends.clone());
        }
        order
            .iter()
            .map(|name| {
                self.backends
                    .iter()
                    .find(|b| b.name() == name)
                    .cloned()
                    .ok_or_else(|| ProviderError::UnknownProvider(name.clone()))
            })
            .collect()
    }

    /// Run `request` against the providers in `order`, failing over on error.
    pub async fn invoke(
        &self,
        request: &InvokeRequest,
        order: &[String],
        timeout: Duration,
    ) -> ProviderResult<Invocation> {
        let chain = self.resolve_order(order)?;
        let started = Instant::now();
        let mut failures = Vec::new();

        for (idx, backend) in chain.iter().enumerate() {
            let attempt_started = Instant::now();
            let outcome = match tokio::time::timeout(timeout, backend.run(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout {
                    provider: backend.name().to_string(),
                    after: timeout,
                }),
            };

            match outcome {
                Ok(reply) => {
                    if !failures.is_empty() {
                        info!(
                            provider = %backend.name(),
                            worker = %request.worker_id,
                            failed = failures.len(),
                            "Provider succeeded after failover"
                        );
                    }
                    return Ok(Invocation {
                        provider: backend.name().to_string(),
                        reply,
                        elapsed_ms: elapsed_ms(started),
                        failed_attempts: failures,
                    });
                }
                Err(e) => {
                    self.record_failure(&mut failures, backend.name(), &e, attempt_started);
                    self.pause_before_next(idx, chain.len(), backend.name(), &e).await;
                }
            }
        }

        Err(ProviderError::Exhausted { attempts: failures })
    }

    /// Like [`invoke`](Self::invoke) but exposes the event stream.
    ///
    /// Failover covers establishing the stream only; an error surfacing after
    /// the first event belongs to that provider.
    pub async fn invoke_stream(
        &self,
        request: &InvokeRequest,
        order: &[String],
        timeout: Duration,
    ) -> ProviderResult<StreamInvocation> {
        let chain = self.resolve_order(order)?;
        let mut failures = Vec::new();

        for (idx, backend) in chain.iter().enumerate() {
            let attempt_started = Instant::now();
            let outcome = match tokio::time::timeout(timeout, backend.run_stream(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout {
                    provider: backend.name().to_string(),
                    after: timeout,
                }),
            };

            match outcome {
                Ok(stream) => {
                    return Ok(StreamInvocation {
                        provider: backend.name().to_string(),
                        stream,
                        failed_attempts: failures,
                    });
                }
                Err(e) => {
                    self.record_failure(&mut failures, backend.name(), &e, attempt_started);
                    self.pause_before_next(idx, chain.len(), backend.name(), &e).await;
                }
            }
        }

        Err(ProviderError::Exhausted { attempts: failures })
    }

    fn record_failure(
        &self,
        failures: &mut Vec<AttemptFailure>,
        provider: &str,
        error: &ProviderError,
        attempt_started: Instant,
    ) {
        failures.push(AttemptFailure {
            provider: provider.to_string(),
            error: error.to_string(),
            elapsed_ms: elapsed_ms(attempt_started),
        });
    }

    async fn pause_before_next(&self, idx: usize, total: usize, provider: &str, error: &ProviderError) {
        if idx + 1 >= total {
            warn!(provider, error = %error, "Last provider in chain failed");
            return;
        }
        let delay = backoff_with_jitter(&self.policy, idx as u32);
        warn!(
            provider,
            attempt = idx + 1,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Provider failed, failing over"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

// ─── Tests ───────────────────────────────────────────────────────────────────
