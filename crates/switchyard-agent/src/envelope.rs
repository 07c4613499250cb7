use crate::error::{AttemptFailure, ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};
use switchyard_core::{Order, TaskPayload};

/// Summary of an upstream task handed to a dependent task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handoff {
    pub task_id: String,
    pub worker_id: String,
    pub summary: String,
}

/// Provider-independent request for one task attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeRequest {
    pub worker_id: String,
    pub task: TaskPayload,
    pub context: Vec<Handoff>,
    /// Standing instructions for the worker, when the plan carries any.
    pub order: Option<Order>,
}

impl InvokeRequest {
    pub fn new(worker_id: impl Into<String>, task: impl Into<TaskPayload>) -> Self {
        Self {
            worker_id: worker_id.into(),
            task: task.into(),
            context: Vec::new(),
            order: None,
        }
    }

    pub fn with_context(mut self, context: Vec<Handoff>) -> Self {
        self.context = context;
        self
    }

    pub fn with_order(mut self, order: Option<Order>) -> Self {
        self.order = order;
        self
    }

    /// The `POST /run` body for a backend that knows the worker under `alias`.
    pub fn body<'a>(&'a self, alias: &'a str) -> RunBody<'a> {
        RunBody {
            worker_id: &self.worker_id,
            alias,
            task: &self.task,
            context: &self.context,
            order: self.order.as_ref(),
        }
    }
}

/// Wire body of `POST /run`.
#[derive(Debug, Serialize)]
pub struct RunBody<'a> {
    #[serde(rename = "workerId")]
    pub worker_id: &'a str,
    pub alias: &'a str,
    pub task: &'a TaskPayload,
    #[serde(skip_serializing_if = "no_context")]
    pub context: &'a [Handoff],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<&'a Order>,
}

fn no_context(context: &&[Handoff]) -> bool {
    context.is_empty()
}

/// Token accounting, when the provider reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// `{summary, output}` reply of a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderReply {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

const ERROR_STATUSES: &[&str] = &["error", "failed", "failure"];

impl ProviderReply {
    pub fn new(summary: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            summary: summary.into(),
            output,
            ..Self::default()
        }
    }

    /// Reject replies that carry an error marker or an error status.
    pub fn check(self, provider: &str) -> ProviderResult<Self> {
        if let Some(err) = self.error.as_ref().filter(|e| !e.is_null()) {
            let message = err
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Err(ProviderError::Protocol {
                provider: provider.to_string(),
                message,
            });
        }
        if let Some(status) = &self.status {
            if ERROR_STATUSES.contains(&status.to_lowercase().as_str()) {
                return Err(ProviderError::Protocol {
                    provider: provider.to_string(),
                    message: format!("reply status '{status}'"),
                });
            }
        }
        Ok(self)
    }

    /// Output as text: strings verbatim, other JSON serialized, null falls back to the summary.
    pub fn text(&self) -> String {
        match &self.output {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => self.summary.clone(),
            other => other.to_string(),
        }
    }
}

/// Successful outcome of the failover chain.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Provider that produced the reply.
    pub provider: String,
    pub reply: ProviderReply,
    /// Wall time across all attempts, including backoff.
    pub elapsed_ms: u64,
    /// Providers that failed before the successful one.
    pub failed_attempts: Vec<AttemptFailure>,
}

impl Invocation {
    pub fn usage(&self) -> Option<Usage> {
        self.reply.usage
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_body_wire_shape() {
        let request = InvokeRequest::new("backend", "Build the API");
        let body = serde_json::to_value(request.body("backend-v2")).unwrap();
        assert_eq!(
            body,
            json!({"workerId": "backend", "alias": "backend-v2", "task": "Build the API"})
        );

        let request = request.with_context(vec![Handoff {
            task_id: "T1".into(),
            worker_id: "architect".into(),
            summary: "two services".into(),
        }]);
        let body = serde_json::to_value(request.body("backend")).unwrap();
        assert_eq!(body["context"][0]["task_id"], "T1");
        assert!(body.get("order").is_none());

        let mut order = Order::new("O1", "backend");
        order.objectives.push("Expose /health".into());
        let request = request.with_order(Some(order));
        let body = serde_json::to_value(request.body("backend")).unwrap();
        assert_eq!(body["order"]["agent_id"], "backend");
        assert_eq!(body["order"]["objectives"][0], "Expose /health");
    }

    #[test]
    fn test_error_status_rejected() {
        let reply: ProviderReply =
            serde_json::from_value(json!({"summary": "x", "output": null, "status": "FAILED"}))
                .unwrap();
        assert!(matches!(reply.check("p1"), Err(ProviderError::Protocol { .. })));

        let reply: ProviderReply =
            serde_json::from_value(json!({"summary": "x", "error": "model overloaded"})).unwrap();
        let err = reply.check("p1").unwrap_err();
        assert!(err.to_string().contains("model overloaded"));
    }

    #[test]
    fn test_null_error_is_success() {
        let reply: ProviderReply =
            serde_json::from_value(json!({"summary": "ok", "output": {"files": 2}, "error": null, "status": "ok"}))
                .unwrap();
        let reply = reply.check("p1").unwrap();
        assert_eq!(reply.text(), r#"{"files":2}"#);
    }

    #[test]
    fn test_text_falls_back_to_summary() {
        let reply = ProviderReply::new("done", serde_json::Value::Null);
        assert_eq!(reply.text(), "done");
        let reply = ProviderReply::new("done", json!("raw output"));
        assert_eq!(reply.text(), "raw output");
    }
}
