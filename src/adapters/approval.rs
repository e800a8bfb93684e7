//! Human approval gates.

use async_trait::async_trait;
use console::{style, Term};
use tracing::debug;

use crate::domain::errors::{DomainResult, EngineError};
use crate::domain::models::Phase;
use crate::domain::ports::{ApprovalDecision, ApprovalGate};

/// Always continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApproval;

#[async_trait]
impl ApprovalGate for AutoApproval {
    async fn decide(&self, _: &Phase, _: Option<&Phase>) -> DomainResult<ApprovalDecision> {
        Ok(ApprovalDecision::Continue)
    }
}

/// Asks the operator on the controlling terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalApproval;

/// Map an operator answer to a decision. Empty input continues.
pub fn parse_answer(answer: &str) -> Option<ApprovalDecision> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "" | "c" | "continue" | "y" | "yes" => Some(ApprovalDecision::Continue),
        "p" | "pause" => Some(ApprovalDecision::Pause),
        "s" | "skip" | "skip-next" => Some(ApprovalDecision::SkipNext),
        "a" | "abort" | "q" | "quit" => Some(ApprovalDecision::Abort),
        _ => None,
    }
}

fn ask(completed: &str, next: Option<&str>) -> std::io::Result<ApprovalDecision> {
    let term = Term::stderr();
    term.write_line(&format!(
        "{} phase {} completed.",
        style("✔").green(),
        style(completed).bold()
    ))?;
    match next {
        Some(next) => term.write_line(&format!("Next phase: {}", style(next).bold()))?,
        None => term.write_line("No phases remain.")?,
    }

    loop {
        term.write_str("[c]ontinue, [p]ause, [s]kip next, [a]bort: ")?;
        let answer = term.read_line()?;
        if let Some(decision) = parse_answer(&answer) {
            return Ok(decision);
        }
        term.write_line(&format!("{} unrecognised answer: {answer}", style("?").yellow()))?;
    }
}

#[async_trait]
impl ApprovalGate for TerminalApproval {
    async fn decide(&self, completed: &Phase, next: Option<&Phase>) -> DomainResult<ApprovalDecision> {
        let completed = completed.name.clone();
        let next = next.map(|p| p.name.clone());
        let decision = tokio::task::spawn_blocking(move || ask(&completed, next.as_deref()))
            .await
            .map_err(|e| EngineError::State(format!("approval prompt task failed: {e}")))??;
        debug!(decision = decision.as_str(), "operator decision");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer(""), Some(ApprovalDecision::Continue));
        assert_eq!(parse_answer(" P "), Some(ApprovalDecision::Pause));
        assert_eq!(parse_answer("skip"), Some(ApprovalDecision::SkipNext));
        assert_eq!(parse_answer("abort"), Some(ApprovalDecision::Abort));
        assert_eq!(parse_answer("maybe"), None);
    }

    #[tokio::test]
    async fn test_auto_approval_continues() {
        let phase = Phase::new("plan", 0, 60);
        assert_eq!(
            AutoApproval.decide(&phase, None).await.unwrap(),
            ApprovalDecision::Continue
        );
    }
}
