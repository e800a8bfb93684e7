//! Verification gate runner.
//!
//! Wraps one phase in its verification loop: invoke the agent, run the
//! quality gates, and on failure feed the gate output back into the next
//! attempt until the gates pass or the phase's budget runs out.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

use super::quality_gates::{GateStatus, QualityGate};
use crate::domain::errors::DomainResult;
use crate::domain::interrupt::Interrupt;
use crate::domain::models::{AccumulatedContext, Phase, Task};

/// Result of one agent invocation for a phase, after invocation retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseInvocation {
    Succeeded { output: String },
    Failed { reason: String },
    Interrupted,
}

/// Runs the agent for a phase. The orchestrator implements this with its
/// retry, rate-limit and circuit-breaker handling.
#[async_trait]
pub trait PhaseInvoker: Send {
    async fn invoke_phase(
        &mut self,
        phase: &Phase,
        task: &Task,
        verification_attempt: u32,
        context: &AccumulatedContext,
    ) -> DomainResult<PhaseInvocation>;
}

/// Result of a phase's verification loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Every configured gate passed.
    Passed {
        gates_evaluated: usize,
        verification_attempts: u32,
        /// Agent output of the verified attempt
        output: String,
    },
    /// The gates still failed when the budget ran out.
    NeedsHumanInput {
        verification_attempts: u32,
        failures: String,
    },
    /// The agent invocation itself failed.
    InvocationFailed {
        verification_attempts: u32,
        reason: String,
    },
    Interrupted { verification_attempts: u32 },
}

impl GateOutcome {
    pub fn verification_attempts(&self) -> u32 {
        match self {
            Self::Passed { verification_attempts, .. }
            | Self::NeedsHumanInput { verification_attempts, .. }
            | Self::InvocationFailed { verification_attempts, .. }
            | Self::Interrupted { verification_attempts } => *verification_attempts,
        }
    }
}

/// Runs the verification loop in a project directory.
#[derive(Debug, Clone)]
pub struct VerificationGateRunner {
    workdir: PathBuf,
}

impl VerificationGateRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub async fn run_phase_with_gates(
        &self,
        phase: &Phase,
        gates: &[Box<dyn QualityGate>],
        task: &Task,
        context: &mut AccumulatedContext,
        invoker: &mut dyn PhaseInvoker,
        interrupt: &Interrupt,
    ) -> DomainResult<GateOutcome> {
        let budget = phase.verification_retry_budget.max(1);

        for attempt in 1..=budget {
            if interrupt.is_triggered() {
                return Ok(GateOutcome::Interrupted {
                    verification_attempts: attempt - 1,
                });
            }

            let output = match invoker.invoke_phase(phase, task, attempt, context).await? {
                PhaseInvocation::Succeeded { output } => output,
                PhaseInvocation::Failed { reason } => {
                    return Ok(GateOutcome::InvocationFailed {
                        verification_attempts: attempt,
                        reason,
                    });
                }
                PhaseInvocation::Interrupted => {
                    return Ok(GateOutcome::Interrupted {
                        verification_attempts: attempt,
                    });
                }
            };

            if gates.is_empty() {
                info!(phase = %phase.name, "no quality gates configured, phase verified");
                return Ok(GateOutcome::Passed {
                    gates_evaluated: 0,
                    verification_attempts: attempt,
                    output,
                });
            }

            let mut failures = Vec::new();
            for gate in gates {
                if interrupt.is_triggered() {
                    return Ok(GateOutcome::Interrupted {
                        verification_attempts: attempt,
                    });
                }
                let result = gate.check(&self.workdir, interrupt).await?;
                match result.status {
                    GateStatus::Passed => {}
                    GateStatus::Interrupted => {
                        return Ok(GateOutcome::Interrupted {
                            verification_attempts: attempt,
                        });
                    }
                    GateStatus::Failed | GateStatus::TimedOut => failures.push(result.failure_excerpt()),
                }
            }

            if failures.is_empty() {
                info!(
                    phase = %phase.name,
                    verification_attempt = attempt,
                    gates = gates.len(),
                    "all quality gates passed"
                );
                return Ok(GateOutcome::Passed {
                    gates_evaluated: gates.len(),
                    verification_attempts: attempt,
                    output,
                });
            }

            let combined = failures.join("\n");
            warn!(
                phase = %phase.name,
                verification_attempt = attempt,
                budget,
                failed_gates = failures.len(),
                "quality gates failed"
            );
            context.push(&phase.name, attempt, &combined);

            if attempt == budget {
                warn!(phase = %phase.name, budget, "verification budget exhausted, needs human input");
                return Ok(GateOutcome::NeedsHumanInput {
                    verification_attempts: attempt,
                    failures: combined,
                });
            }
        }

        // budget >= 1, so the loop always returns
        Ok(GateOutcome::NeedsHumanInput {
            verification_attempts: budget,
            failures: String::new(),
        })
    }
}
