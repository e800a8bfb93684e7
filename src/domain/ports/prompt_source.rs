//! Prompt source port.

use crate::domain::errors::DomainResult;
use crate::domain::models::Phase;

/// Values substituted into a phase prompt template.
#[derive(Debug, Clone, Default)]
pub struct PromptVars {
    pub task_id: String,
    pub task_prompt: String,
    pub timestamp: String,
    pub git_log: String,
    /// Rendered accumulated verification context; empty on first attempts
    pub verification_context: String,
    pub phase: String,
}

/// Resolves and renders the prompt for a phase.
pub trait PromptSource: Send + Sync {
    fn render(&self, phase: &Phase, vars: &PromptVars) -> DomainResult<String>;
}
