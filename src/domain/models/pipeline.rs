//! Pipeline definition and per-run phase state.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use super::config::{GatesConfig, PhaseConfig};
use crate::domain::errors::{DomainResult, EngineError};

/// Names of the default eight-stage pipeline, in execution order.
pub const DEFAULT_PHASES: [&str; 8] = [
    "expand", "triage", "plan", "implement", "test", "docs", "review", "verify",
];

/// Default verification attempts per phase.
pub const DEFAULT_VERIFICATION_BUDGET: u32 = 3;

/// One named stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub order_index: usize,
    /// Template name resolved by the prompt source; defaults to the phase name.
    pub prompt_template_ref: String,
    pub timeout_seconds: u64,
    pub skip: bool,
    pub verification_retry_budget: u32,
    /// Gate commands for this phase only. `None` uses the pipeline-wide gates.
    pub gates: Option<GatesConfig>,
}

impl Phase {
    pub fn new(name: impl Into<String>, order_index: usize, timeout_seconds: u64) -> Self {
        let name = name.into();
        Self {
            prompt_template_ref: name.clone(),
            name,
            order_index,
            timeout_seconds,
            skip: false,
            verification_retry_budget: DEFAULT_VERIFICATION_BUDGET,
            gates: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn with_gates(mut self, gates: GatesConfig) -> Self {
        self.gates = Some(gates);
        self
    }

    pub fn with_verification_budget(mut self, budget: u32) -> Self {
        self.verification_retry_budget = budget;
        self
    }

    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }
}

/// Default wall-clock timeout per built-in phase.
pub fn default_phase_timeout(name: &str) -> u64 {
    match name {
        "expand" | "triage" => 600,
        "plan" | "docs" | "review" => 900,
        "implement" => 3600,
        "test" => 1800,
        "verify" => 1200,
        _ => 1800,
    }
}

/// Ordered, immutable list of phases for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    phases: Vec<Phase>,
}

impl PipelineDefinition {
    /// Build a pipeline, re-indexing phases by position.
    pub fn new(phases: Vec<Phase>) -> DomainResult<Self> {
        if phases.is_empty() {
            return Err(EngineError::InvalidConfig(
                "pipeline must contain at least one phase".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for phase in &phases {
            if !seen.insert(phase.name.as_str()) {
                return Err(EngineError::InvalidConfig(format!(
                    "duplicate phase name: {}",
                    phase.name
                )));
            }
            if phase.timeout_seconds == 0 {
                return Err(EngineError::InvalidConfig(format!(
                    "phase {} has a zero timeout",
                    phase.name
                )));
            }
            if phase.verification_retry_budget == 0 {
                return Err(EngineError::InvalidConfig(format!(
                    "phase {} has a zero verification budget",
                    phase.name
                )));
            }
        }

        let phases = phases
            .into_iter()
            .enumerate()
            .map(|(index, mut phase)| {
                phase.order_index = index;
                phase
            })
            .collect();

        Ok(Self { phases })
    }

    /// The eight built-in phases with their default timeouts.
    pub fn default_pipeline() -> Self {
        let phases = DEFAULT_PHASES
            .iter()
            .enumerate()
            .map(|(i, name)| Phase::new(*name, i, default_phase_timeout(name)))
            .collect();
        Self { phases }
    }

    /// Build from configured phases, falling back to the built-in pipeline.
    pub fn from_config(phases: &[PhaseConfig], default_budget: u32) -> DomainResult<Self> {
        if phases.is_empty() {
            let mut pipeline = Self::default_pipeline();
            for phase in &mut pipeline.phases {
                phase.verification_retry_budget = default_budget;
            }
            return Ok(pipeline);
        }

        let phases = phases
            .iter()
            .enumerate()
            .map(|(i, pc)| Phase {
                name: pc.name.clone(),
                order_index: i,
                prompt_template_ref: pc.prompt_template.clone().unwrap_or_else(|| pc.name.clone()),
                timeout_seconds: pc
                    .timeout_secs
                    .unwrap_or_else(|| default_phase_timeout(&pc.name)),
                skip: pc.skip,
                verification_retry_budget: pc.verification_retry_budget.unwrap_or(default_budget),
                gates: pc.gates.clone(),
            })
            .collect();

        Self::new(phases)
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Phase> {
        self.phases.get(index)
    }
}

/// Status of a phase within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Completed,
    /// Completed in an earlier run; restored from the checkpoint.
    Resumed,
    Skipped,
    Failed,
    NeedsHumanInput,
    Interrupted,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Resumed => "resumed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::NeedsHumanInput => "needs_human_input",
            Self::Interrupted => "interrupted",
        }
    }

    /// Whether the phase no longer blocks later phases.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Completed | Self::Resumed | Self::Skipped)
    }
}

/// Per-run state of one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseState {
    pub name: String,
    pub index: usize,
    pub status: PhaseStatus,
    /// Verification attempts consumed in this run.
    pub verification_attempts: u32,
    /// Last confidence score recorded for the phase, if any.
    pub confidence: Option<u8>,
}

impl PhaseState {
    pub fn pending(phase: &Phase) -> Self {
        Self {
            name: phase.name.clone(),
            index: phase.order_index,
            status: PhaseStatus::Pending,
            verification_attempts: 0,
            confidence: None,
        }
    }
}

/// Final result of running a task through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every phase completed or was skipped.
    Completed,
    /// Verification budget exhausted or operator paused; resumable after review.
    NeedsHumanInput { phase: String, reason: String },
    /// Not auto-resumable.
    Failed { phase: String, reason: String },
    /// Operator cancelled; resumable.
    Interrupted { phase: Option<String> },
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NeedsHumanInput { .. } => "needs_human_input",
            Self::Failed { .. } => "failed",
            Self::Interrupted { .. } => "interrupted",
        }
    }

    /// Whether automated resumption may safely retry this run.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::NeedsHumanInput { .. } | Self::Interrupted { .. })
    }
}
