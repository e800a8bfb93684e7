//! Quality gates.
//!
//! A gate is a shell command run in the project directory after a phase's
//! agent invocation succeeds. Exit code 0 passes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::interrupt::Interrupt;
use crate::domain::models::{GateKind, GatesConfig};
use crate::infrastructure::process::{run_supervised, tail_lines, CaptureOptions, ProcessOutcome};

/// Lines of gate output kept for context injection.
pub const GATE_OUTPUT_TAIL_LINES: usize = 100;

/// How a gate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Passed,
    Failed,
    TimedOut,
    Interrupted,
}

/// Result of one gate run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub kind: GateKind,
    pub command: String,
    pub status: GateStatus,
    pub exit_code: Option<i32>,
    /// Last [`GATE_OUTPUT_TAIL_LINES`] lines of combined output
    pub output: String,
    pub duration_ms: u64,
}

impl GateResult {
    pub fn passed(&self) -> bool {
        self.status == GateStatus::Passed
    }

    /// Excerpt appended to the accumulated context.
    pub fn failure_excerpt(&self) -> String {
        let reason = match self.status {
            GateStatus::Passed => "passed".to_string(),
            GateStatus::Failed => match self.exit_code {
                Some(code) => format!("exited with code {code}"),
                None => "terminated by signal".to_string(),
            },
            GateStatus::TimedOut => "timed out".to_string(),
            GateStatus::Interrupted => "interrupted".to_string(),
        };
        format!(
            "{} gate `{}` {reason}:\n{}",
            self.kind.as_str(),
            self.command,
            self.output
        )
    }
}

/// One quality check.
#[async_trait]
pub trait QualityGate: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> GateKind;
    async fn check(&self, workdir: &Path, interrupt: &Interrupt) -> DomainResult<GateResult>;
}

/// Runs a command string with `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellGate {
    kind: GateKind,
    command: String,
    timeout: Duration,
}

impl ShellGate {
    pub fn new(kind: GateKind, command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            kind,
            command: command.into(),
            timeout,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl QualityGate for ShellGate {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn kind(&self) -> GateKind {
        self.kind
    }

    async fn check(&self, workdir: &Path, interrupt: &Interrupt) -> DomainResult<GateResult> {
        debug!(gate = self.name(), command = %self.command, "running quality gate");
        let mut command = Command::new("sh");
        command.arg("-c").arg(&self.command).current_dir(workdir);

        let run = run_supervised(
            command,
            CaptureOptions {
                timeout: self.timeout,
                ..CaptureOptions::default()
            },
            interrupt,
        )
        .await?;

        let (status, exit_code) = match run.outcome {
            ProcessOutcome::Exited { success: true, code } => (GateStatus::Passed, code),
            ProcessOutcome::Exited { success: false, code } => (GateStatus::Failed, code),
            ProcessOutcome::TimedOut => (GateStatus::TimedOut, None),
            ProcessOutcome::Interrupted => (GateStatus::Interrupted, None),
        };

        let result = GateResult {
            kind: self.kind,
            command: self.command.clone(),
            status,
            exit_code,
            output: tail_lines(&run.output, GATE_OUTPUT_TAIL_LINES),
            duration_ms: u64::try_from(run.duration.as_millis()).unwrap_or(u64::MAX),
        };

        match status {
            GateStatus::Passed => info!(gate = self.name(), duration_ms = result.duration_ms, "quality gate passed"),
            GateStatus::Interrupted => debug!(gate = self.name(), "quality gate interrupted"),
            GateStatus::Failed | GateStatus::TimedOut => warn!(
                gate = self.name(),
                status = ?status,
                exit_code = ?exit_code,
                "quality gate failed"
            ),
        }
        Ok(result)
    }
}

/// Shell gates for every non-empty command, in build, lint, format, test order.
pub fn gates_from_config(config: &GatesConfig) -> Vec<Box<dyn QualityGate>> {
    config
        .configured()
        .into_iter()
        .map(|(kind, command)| Box::new(ShellGate::new(kind, command, config.timeout())) as Box<dyn QualityGate>)
        .collect()
}
