//! Domain errors for the drover engine.

use thiserror::Error;

/// Engine-level errors.
///
/// These are malfunctions of the supervising process itself. Outcomes of the
/// supervised agent (a failed phase, an exhausted verification budget, an
/// operator interrupt) are reported through `RunOutcome` instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown agent backend: {0}")]
    UnknownBackend(String),

    #[error("Model {model} is not supported by backend {backend}")]
    UnsupportedModel { backend: String, model: String },

    #[error("Phase attempt already open for {phase} (attempt {attempt})")]
    AttemptAlreadyOpen { phase: String, attempt: u32 },

    #[error("No phase attempt is open")]
    NoOpenAttempt,

    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("State store error: {0}")]
    State(String),

    #[error("Unsupported {kind} schema version {found} (max supported {supported})")]
    UnsupportedSchema {
        kind: String,
        found: u32,
        supported: u32,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Prompt template error: {0}")]
    Template(String),

    #[error("Hook {hook} failed: {reason}")]
    Hook { hook: String, reason: String },
}

/// Result alias used throughout the domain and services.
pub type DomainResult<T> = Result<T, EngineError>;

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Returned by interruptible waits when the operator cancels the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interrupted by operator")]
pub struct Interrupted;
