//! Accumulated verification context.
//!
//! Failure excerpts from quality gates are collected per task and injected
//! into the next attempt's prompt so the agent can self-correct.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default line cap.
pub const DEFAULT_CONTEXT_MAX_LINES: usize = 200;

/// One failure excerpt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub phase: String,
    pub attempt: u32,
    pub text: String,
}

impl ContextEntry {
    fn line_count(&self) -> usize {
        // +1 for the header rendered above each entry
        self.text.lines().count() + 1
    }
}

/// Append-only list of failure excerpts, capped by total line count.
///
/// Once the cap is exceeded the oldest entries are evicted first. A single
/// entry larger than the cap keeps only its newest lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumulatedContext {
    entries: VecDeque<ContextEntry>,
    max_lines: usize,
}

impl AccumulatedContext {
    pub fn new(max_lines: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_lines: max_lines.max(2),
        }
    }

    pub fn push(&mut self, phase: &str, attempt: u32, text: &str) {
        let budget = self.max_lines - 1;
        let lines: Vec<&str> = text.lines().collect();
        let kept = if lines.len() > budget {
            lines[lines.len() - budget..].join("\n")
        } else {
            text.trim_end().to_string()
        };

        self.entries.push_back(ContextEntry {
            phase: phase.to_string(),
            attempt,
            text: kept,
        });

        while self.line_count() > self.max_lines {
            if self.entries.pop_front().is_none() {
                break;
            }
        }
    }

    pub fn line_count(&self) -> usize {
        self.entries.iter().map(ContextEntry::line_count).sum()
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ContextEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Render for prompt injection, oldest first.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("### {} (verification attempt {})\n{}", e.phase, e.attempt, e.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for AccumulatedContext {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_MAX_LINES)
    }
}
