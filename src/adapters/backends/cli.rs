//! Agent backend that runs a coding-agent CLI as a subprocess.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::registry::build_argv;
use crate::domain::errors::DomainResult;
use crate::domain::interrupt::Interrupt;
use crate::domain::models::{
    BackendSpec, InvocationRequest, InvocationResult, InvocationStatus, PromptStyle,
};
use crate::domain::ports::AgentBackend;
use crate::infrastructure::process::{run_supervised, CaptureOptions, ProcessOutcome};

/// Spawns the backend's command for each invocation.
pub struct CliAgentBackend {
    spec: BackendSpec,
}

impl CliAgentBackend {
    pub fn new(spec: BackendSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl AgentBackend for CliAgentBackend {
    fn spec(&self) -> &BackendSpec {
        &self.spec
    }

    async fn invoke(
        &self,
        request: InvocationRequest,
        interrupt: &Interrupt,
    ) -> DomainResult<InvocationResult> {
        let args = build_argv(&self.spec, &request.prompt, &request.model, request.autonomous);

        let mut cmd = Command::new(&self.spec.command);
        cmd.args(&args)
            .current_dir(&request.working_dir)
            .env("DROVER_TASK_ID", &request.task_id)
            .env("DROVER_PHASE", &request.phase);

        let stdin = (self.spec.prompt_style == PromptStyle::Stdin).then(|| request.prompt.clone());

        info!(
            backend = %self.spec.id,
            phase = %request.phase,
            model = %request.model,
            timeout_secs = request.timeout.as_secs(),
            "invoking agent"
        );

        let run = run_supervised(
            cmd,
            CaptureOptions {
                timeout: request.timeout,
                log_path: request.log_path.clone(),
                progress: Some(request.progress.clone()),
                stdin,
            },
            interrupt,
        )
        .await?;

        let status = match run.outcome {
            ProcessOutcome::Exited { success: true, .. } => InvocationStatus::Success,
            ProcessOutcome::Exited { code, .. } => InvocationStatus::Failed { exit_code: code },
            ProcessOutcome::TimedOut => InvocationStatus::TimedOut,
            ProcessOutcome::Interrupted => InvocationStatus::Interrupted,
        };

        debug!(
            backend = %self.spec.id,
            phase = %request.phase,
            status = ?status,
            output_bytes = run.output.len(),
            duration_ms = u64::try_from(run.duration.as_millis()).unwrap_or(u64::MAX),
            "agent invocation finished"
        );

        Ok(InvocationResult {
            status,
            output: run.output,
            duration: run.duration,
        })
    }
}
