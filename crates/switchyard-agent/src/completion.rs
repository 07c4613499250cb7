use crate::envelope::InvokeRequest;
use crate::error::ProviderResult;
use crate::failover::ProviderPool;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A text-in, text-out model call.
///
/// The decomposer only needs a prompt turned into a reply string; anything
/// that can do that (a provider chain, a test double) implements this trait.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> ProviderResult<String>;
}

/// Runs completions through a [`ProviderPool`] as if the prompt were a task
/// for `worker_id`.
pub struct ProviderCompletion {
    pool: Arc<ProviderPool>,
    worker_id: String,
    order: Vec<String>,
    timeout: Duration,
}

impl ProviderCompletion {
    pub fn new(pool: Arc<ProviderPool>, worker_id: impl Into<String>) -> Self {
        Self {
            pool,
            worker_id: worker_id.into(),
            order: Vec::new(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_order(mut self, order: Vec<String>) -> Self {
        self.order = order;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CompletionBackend for ProviderCompletion {
    async fn complete(&self, prompt: &str) -> ProviderResult<String> {
        let request = InvokeRequest::new(self.worker_id.clone(), prompt);
        let invocation = self.pool.invoke(&request, &self.order, self.timeout).await?;
        Ok(invocation.reply.text())
    }
}
