use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attempt::PhaseAttemptRecord;
use super::confidence::ConfidenceAssessment;
use super::pipeline::{PhaseState, RunOutcome};

/// Everything a caller needs to know about a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub task_id: String,
    pub outcome: RunOutcome,
    /// Ordered per-phase state
    pub phases: Vec<PhaseState>,
    pub attempts: Vec<PhaseAttemptRecord>,
    /// Last confidence assessment, if any phase was verified
    pub confidence: Option<ConfidenceAssessment>,
    pub premature_completion_warning: bool,
}

impl RunReport {
    pub fn phase(&self, name: &str) -> Option<&PhaseState> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Invocation attempts recorded for a phase.
    pub fn attempts_for<'a>(&'a self, phase: &'a str) -> impl Iterator<Item = &'a PhaseAttemptRecord> + 'a {
        self.attempts.iter().filter(move |a| a.phase_name == phase)
    }
}
