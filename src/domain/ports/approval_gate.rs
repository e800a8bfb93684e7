//! Human approval gate port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::Phase;

/// Operator decision between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Continue,
    /// Stop here for review; resumable
    Pause,
    /// Skip the next schedulable phase
    SkipNext,
    Abort,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Pause => "pause",
            Self::SkipNext => "skip_next",
            Self::Abort => "abort",
        }
    }
}

/// Asked after a phase completes when the run is supervised.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn decide(&self, completed: &Phase, next: Option<&Phase>)
        -> DomainResult<ApprovalDecision>;
}
