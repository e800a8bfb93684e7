//! Completion-confidence scoring.
//!
//! Agents claim completion freely; the score weighs that claim against
//! evidence the engine can observe for itself.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::domain::models::{ConfidenceAssessment, ConfidenceConfig, ConfidenceSignals, TestsStatus};

const STATUS_BLOCK_POINTS: u8 = 30;
const PHASE_COMPLETE_POINTS: u8 = 20;
const TESTS_PASS_POINTS: u8 = 5;
const DIFF_POINTS: u8 = 15;
const RELOCATED_POINTS: u8 = 20;
const KEYWORD_POINTS: u8 = 10;

static STATUS_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)---DROVER_STATUS---(.*?)---END_DROVER_STATUS---").expect("valid status block regex")
});

/// Fields of the agent's status block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusBlock {
    pub phase_complete: bool,
    pub tests_status: TestsStatus,
}

/// Parse the last status block in `output`, if any.
pub fn parse_status_block(output: &str) -> Option<StatusBlock> {
    let body = STATUS_BLOCK_RE.captures_iter(output).last()?.get(1)?.as_str();
    let mut block = StatusBlock::default();
    for line in body.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_ascii_lowercase();
        match key.trim().to_ascii_uppercase().as_str() {
            "PHASE_COMPLETE" => block.phase_complete = matches!(value.as_str(), "true" | "yes"),
            "TESTS_STATUS" => {
                block.tests_status = match value.as_str() {
                    "pass" | "passed" | "passing" => TestsStatus::Pass,
                    "fail" | "failed" | "failing" => TestsStatus::Fail,
                    _ => TestsStatus::Unknown,
                };
            }
            _ => {}
        }
    }
    Some(block)
}

/// Collect signals from phase output and external evidence.
pub fn gather_signals(
    output: &str,
    diff_present: bool,
    task_artifact_relocated: bool,
    keywords: &[String],
) -> ConfidenceSignals {
    let block = parse_status_block(output);
    let lowered = output.to_lowercase();
    ConfidenceSignals {
        status_block_present: block.is_some(),
        phase_complete: block.is_some_and(|b| b.phase_complete),
        tests_status: block.map_or(TestsStatus::Unknown, |b| b.tests_status),
        diff_present,
        task_artifact_relocated,
        keywords_present: keywords
            .iter()
            .any(|k| !k.trim().is_empty() && lowered.contains(&k.to_lowercase())),
    }
}

/// Additive score, capped at 100.
///
/// Completion and test claims only count when they arrive in a status block.
pub fn score(signals: &ConfidenceSignals) -> u8 {
    let mut total: u8 = 0;
    if signals.status_block_present {
        total += STATUS_BLOCK_POINTS;
        if signals.phase_complete {
            total += PHASE_COMPLETE_POINTS;
        }
        if signals.tests_status == TestsStatus::Pass {
            total += TESTS_PASS_POINTS;
        }
    }
    if signals.diff_present {
        total += DIFF_POINTS;
    }
    if signals.task_artifact_relocated {
        total += RELOCATED_POINTS;
    }
    if signals.keywords_present {
        total += KEYWORD_POINTS;
    }
    total.min(100)
}

/// Tracks consecutive low-confidence results across the phases of one task.
#[derive(Debug, Clone)]
pub struct ConfidenceTracker {
    config: ConfidenceConfig,
    consecutive_low: u32,
}

impl ConfidenceTracker {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self {
            config,
            consecutive_low: 0,
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.config.keywords
    }

    pub fn consecutive_low(&self) -> u32 {
        self.consecutive_low
    }

    pub fn assess(&mut self, phase: &str, signals: ConfidenceSignals) -> ConfidenceAssessment {
        let score = score(&signals);
        let high_confidence = score >= self.config.threshold;
        if high_confidence {
            self.consecutive_low = 0;
        } else {
            self.consecutive_low += 1;
        }
        let premature_warning = !high_confidence && self.consecutive_low >= self.config.warn_after;

        if premature_warning {
            warn!(
                phase,
                score,
                threshold = self.config.threshold,
                consecutive_low = self.consecutive_low,
                "agent may be claiming completion prematurely"
            );
        } else {
            debug!(phase, score, high_confidence, "confidence assessed");
        }

        ConfidenceAssessment {
            phase: phase.to_string(),
            score,
            high_confidence,
            consecutive_low: self.consecutive_low,
            premature_warning,
            signals,
        }
    }

    /// Start over for a new task.
    pub fn reset(&mut self) {
        self.consecutive_low = 0;
    }
}
