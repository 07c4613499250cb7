pub mod http;
pub mod process;

use crate::config::{ProviderConfig, ProviderKind};
use crate::envelope::{InvokeRequest, ProviderReply};
use crate::error::ProviderResult;
use crate::stream::StreamEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use http::HttpBackend;
pub use process::ProcessBackend;

/// Receiver of normalised stream events plus a handle resolving to the final reply.
pub type ReplyStream = (
    mpsc::Receiver<StreamEvent>,
    JoinHandle<ProviderResult<ProviderReply>>,
);

/// Trait for backend compute providers.
///
/// Each transport (HTTP request/response, HTTP streaming, local process)
/// implements this trait; the failover chain only ever sees the trait.
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `ProviderBackend` for your struct
/// 3. Add the variant to `ProviderKind` in `config.rs`
/// 4. Wire it up in [`build_backend`]
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    /// Stable provider name used in provider orders and logs.
    fn name(&self) -> &str;

    /// Run one task and return the final envelope.
    async fn run(&self, request: &InvokeRequest) -> ProviderResult<ProviderReply>;

    /// Run one task, exposing the event stream.
    ///
    /// Backends without native streaming emit one chunk holding the whole
    /// output followed by the completion event.
    async fn run_stream(&self, request: &InvokeRequest) -> ProviderResult<ReplyStream> {
        let reply = self.run(request).await?;
        let (tx, rx) = mpsc::channel::<StreamEvent>(4);
        let handle = tokio::spawn(async move {
            let _ = tx.send(StreamEvent::Chunk { text: reply.text() }).await;
            let _ = tx
                .send(StreamEvent::Complete {
                    reply: reply.clone(),
                })
                .await;
            Ok(reply)
        });
        Ok((rx, handle))
    }
}

/// Instantiate the backend declared by `config`.
pub fn build_backend(config: ProviderConfig) -> ProviderResult<Arc<dyn ProviderBackend>> {
    let backend: Arc<dyn ProviderBackend> = match config.kind {
        ProviderKind::Http => Arc::new(HttpBackend::new(config)?),
        ProviderKind::Process => Arc::new(ProcessBackend::new(config)?),
    };
    Ok(backend)
}
