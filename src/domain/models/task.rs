//! Task domain model.

use serde::{Deserialize, Serialize};

/// A unit of work handed to the engine.
///
/// Tasks are created by an outside collaborator (a task board, the CLI)
/// and are immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier, used for checkpoints and log paths.
    pub id: String,
    /// The operator's request, verbatim.
    pub prompt: String,
}

impl Task {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
        }
    }
}
