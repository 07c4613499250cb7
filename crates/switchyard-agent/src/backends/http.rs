use super::{ProviderBackend, ReplyStream};
use crate::config::ProviderConfig;
use crate::envelope::{InvokeRequest, ProviderReply};
use crate::error::{ProviderError, ProviderResult};
use crate::stream::{SseDecoder, StreamEvent};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;

/// Provider reached over HTTP via `POST {base}/run`.
///
/// With `streaming` enabled the request negotiates `text/event-stream` and
/// [`ProviderBackend::run`] drains the stream internally, so callers that do not
/// care about chunks still only see the final envelope.
pub struct HttpBackend {
    config: ProviderConfig,
    url: String,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        let url = config.run_url()?;
        Ok(Self {
            config,
            url,
            http: reqwest::Client::new(),
        })
    }

    fn request(&self, request: &InvokeRequest, stream: bool) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .post(&self.url)
            .json(&request.body(self.config.alias_for(&request.worker_id)));
        if stream {
            builder = builder
                .query(&[("stream", "true")])
                .header("Accept", "text/event-stream");
        }
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    fn transport(&self, e: reqwest::Error) -> ProviderError {
        ProviderError::Transport {
            provider: self.config.name.clone(),
            message: e.to_string(),
        }
    }

    async fn send(&self, request: &InvokeRequest, stream: bool) -> ProviderResult<reqwest::Response> {
        let resp = self
            .request(request, stream)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ProviderError::Http {
                provider: self.config.name.clone(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    /// Read a streamed reply to its terminal event on the caller's task.
    ///
    /// Nothing is spawned, so dropping the future (a timeout, a cancelled run)
    /// drops the response and closes the connection.
    async fn drain(&self, request: &InvokeRequest) -> ProviderResult<ProviderReply> {
        let resp = self.send(request, true).await?;
        let provider = self.config.name.as_str();
        let mut stream = std::pin::pin!(resp.bytes_stream());
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProviderError::Transport {
                provider: provider.to_string(),
                message: format!("stream read error: {e}"),
            })?;
            for frame in decoder.push(&chunk) {
                if let Some(outcome) = frame.into_event().and_then(|e| settle(e, provider)) {
                    tracing::debug!(provider, worker = %request.worker_id, "Stream settled");
                    return outcome;
                }
            }
        }

        if let Some(outcome) = decoder
            .finish()
            .and_then(|frame| frame.into_event())
            .and_then(|e| settle(e, provider))
        {
            return outcome;
        }
        Err(ProviderError::Protocol {
            provider: provider.to_string(),
            message: MISSING_COMPLETION.to_string(),
        })
    }
}

const MISSING_COMPLETION: &str = "stream ended without a completion event";

#[async_trait]
impl ProviderBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn run(&self, request: &InvokeRequest) -> ProviderResult<ProviderReply> {
        if self.config.streaming {
            return self.drain(request).await;
        }

        let resp = self.send(request, false).await?;
        let reply: ProviderReply = resp.json().await.map_err(|e| ProviderError::Protocol {
            provider: self.config.name.clone(),
            message: format!("invalid reply body: {e}"),
        })?;

        tracing::debug!(provider = %self.config.name, worker = %request.worker_id, "HTTP reply received");
        reply.check(&self.config.name)
    }

    async fn run_stream(&self, request: &InvokeRequest) -> ProviderResult<ReplyStream> {
        let resp = self.send(request, true).await?;

        let provider = self.config.name.clone();
        let (tx, rx) = mpsc::channel::<StreamEvent>(256);
        let byte_stream = resp.bytes_stream();

        let handle = tokio::spawn(async move {
            let mut stream = std::pin::pin!(byte_stream);
            let mut decoder = SseDecoder::new();

            while let Some(chunk_result) = stream.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let message = format!("stream read error: {e}");
                        let _ = tx
                            .send(StreamEvent::Error {
                                message: message.clone(),
                            })
                            .await;
                        return Err(ProviderError::Transport { provider, message });
                    }
                };

                for frame in decoder.push(&chunk) {
                    if let Some(outcome) = forward(frame.into_event(), &tx, &provider).await {
                        return outcome;
                    }
                }
            }

            if let Some(frame) = decoder.finish() {
                if let Some(outcome) = forward(frame.into_event(), &tx, &provider).await {
                    return outcome;
                }
            }

            let message = MISSING_COMPLETION.to_string();
            let _ = tx
                .send(StreamEvent::Error {
                    message: message.clone(),
                })
                .await;
            Err(ProviderError::Protocol { provider, message })
        });

        Ok((rx, handle))
    }
}

/// Outcome of a terminal event; `None` for chunks.
fn settle(event: StreamEvent, provider: &str) -> Option<ProviderResult<ProviderReply>> {
    match event {
        StreamEvent::Chunk { .. } => None,
        StreamEvent::Complete { reply } => Some(reply.check(provider)),
        StreamEvent::Error { message } => Some(Err(ProviderError::Protocol {
            provider: provider.to_string(),
            message,
        })),
    }
}

/// Forward one event; returns the final outcome once a terminal event is seen.
async fn forward(
    event: Option<StreamEvent>,
    tx: &mpsc::Sender<StreamEvent>,
    provider: &str,
) -> Option<ProviderResult<ProviderReply>> {
    let event = event?;
    let outcome = settle(event.clone(), provider);
    let notify = match (&event, &outcome) {
        (_, Some(Ok(reply))) => StreamEvent::Complete {
            reply: reply.clone(),
        },
        (StreamEvent::Complete { .. }, Some(Err(e))) => StreamEvent::Error {
            message: e.to_string(),
        },
        _ => event,
    };
    let _ = tx.send(notify).await;
    outcome
}
