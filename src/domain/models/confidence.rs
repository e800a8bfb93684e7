use serde::{Deserialize, Serialize};

/// Tests status declared by the agent's status block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestsStatus {
    Pass,
    Fail,
    #[default]
    Unknown,
}

/// Evidence gathered for one completion-confidence evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceSignals {
    pub status_block_present: bool,
    pub phase_complete: bool,
    pub tests_status: TestsStatus,
    pub diff_present: bool,
    pub task_artifact_relocated: bool,
    pub keywords_present: bool,
}

/// A scored evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    pub phase: String,
    pub score: u8,
    pub high_confidence: bool,
    pub consecutive_low: u32,
    /// The agent may be claiming completion prematurely
    pub premature_warning: bool,
    pub signals: ConfidenceSignals,
}
