use crate::error::{ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Remote service speaking the `POST /run` contract.
    Http,
    /// Local command reading the request on stdin and writing the reply on stdout.
    Process,
}

/// Declaration of one backend provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    /// Base URL for HTTP providers, e.g. `http://localhost:8080`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Negotiate a server-sent event stream instead of a single JSON reply.
    #[serde(default)]
    pub streaming: bool,
    /// Name the provider knows workers by. Defaults to the worker id.
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Program for process providers.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ProviderConfig {
    pub fn http(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ProviderKind::Http,
            base_url: Some(base_url.into()),
            streaming: false,
            alias: None,
            api_key: None,
            command: None,
            args: Vec::new(),
        }
    }

    pub fn process<I, S>(name: impl Into<String>, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: ProviderKind::Process,
            base_url: None,
            streaming: false,
            alias: None,
            api_key: None,
            command: Some(command.into()),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The `/run` endpoint of an HTTP provider.
    pub fn run_url(&self) -> ProviderResult<String> {
        let base = self.base_url.as_deref().ok_or_else(|| {
            ProviderError::Config(format!("provider '{}' has no base_url", self.name))
        })?;
        Ok(format!("{}/run", base.trim_end_matches('/')))
    }

    /// Alias to send for `worker_id`.
    pub fn alias_for<'a>(&'a self, worker_id: &'a str) -> &'a str {
        self.alias.as_deref().unwrap_or(worker_id)
    }
}
