use super::ProviderBackend;
use crate::config::ProviderConfig;
use crate::envelope::{InvokeRequest, ProviderReply};
use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Provider backed by a local command.
///
/// The request body is written to the child's stdin as one JSON document; the
/// reply is the last line of stdout that parses as a JSON object. The child is
/// killed if the attempt future is dropped (e.g. on timeout).
pub struct ProcessBackend {
    name: String,
    alias: Option<String>,
    command: String,
    args: Vec<String>,
}

impl ProcessBackend {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        let command = config.command.clone().ok_or_else(|| {
            ProviderError::Config(format!("provider '{}' has no command", config.name))
        })?;
        Ok(Self {
            name: config.name,
            alias: config.alias,
            command,
            args: config.args,
        })
    }

    fn failure(&self, message: impl Into<String>) -> ProviderError {
        ProviderError::Process {
            provider: self.name.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl ProviderBackend for ProcessBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, request: &InvokeRequest) -> ProviderResult<ProviderReply> {
        let alias = self.alias.as_deref().unwrap_or(&request.worker_id);
        let input = serde_json::to_vec(&request.body(alias))
            .map_err(|e| self.failure(format!("failed to encode request: {e}")))?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.failure(format!("failed to spawn '{}': {e}", self.command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits without reading stdin is judged by its exit status.
            if let Err(e) = stdin.write_all(&input).await {
                tracing::debug!(provider = %self.name, error = %e, "stdin write failed");
            }
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| self.failure(format!("failed to wait for child: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let reply = last_json_line(&stdout).ok_or_else(|| ProviderError::Protocol {
            provider: self.name.clone(),
            message: "no JSON reply on stdout".to_string(),
        })?;

        tracing::debug!(provider = %self.name, worker = %request.worker_id, "process reply received");
        reply.check(&self.name)
    }
}

/// The last stdout line that parses as a reply object.
fn last_json_line(stdout: &str) -> Option<ProviderReply> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str::<ProviderReply>(line).ok())
}
