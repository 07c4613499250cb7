use thiserror::Error;

/// A convenience `Result` alias using [`SwitchyardError`].
pub type SwitchyardResult<T> = Result<T, SwitchyardError>;

/// Top-level error type for the Switchyard workspace.
///
/// Recoverable conditions (routing misses, invalid decomposer output, provider
/// failures) are handled inside their component and never reach this type.
#[derive(Error, Debug)]
pub enum SwitchyardError {
    /// The worker catalog has no entries. This is the only process-fatal condition.
    #[error("Worker catalog is empty")]
    EmptyCatalog,

    /// Two catalog entries share an id.
    #[error("Duplicate worker id in catalog: {0}")]
    DuplicateWorker(String),

    /// A worker id was referenced that the catalog does not contain.
    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    /// A keyword, regex, or glob trigger could not be compiled.
    #[error("Invalid trigger for worker '{worker}': {reason}")]
    InvalidTrigger { worker: String, reason: String },

    /// The plan failed validation and must not be executed.
    #[error("Plan rejected ({code}): {message}")]
    PlanRejected {
        code: &'static str,
        message: String,
        hint: &'static str,
    },

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A backend call failed after every recovery path was exhausted.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
