//! `drover run`

use anyhow::{Context, Result};
use console::style;
use std::sync::Arc;
use tracing::info;

use super::open_store;
use crate::adapters::backends::{BackendRegistry, CliAgentBackend};
use crate::adapters::clock::SystemClock;
use crate::adapters::{
    AutoApproval, DirectoryTaskBoard, GitChangeDetector, SkillHooks, TemplatePromptSource,
    TerminalApproval,
};
use crate::cli::output::{list_table, output, CommandOutput};
use crate::cli::types::RunArgs;
use crate::domain::interrupt::Interrupt;
use crate::domain::models::{Autonomy, Config, PipelineConfig, RunOutcome, RunReport, Task};
use crate::domain::ports::{AgentBackend, ApprovalGate, Clock};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{CircuitBreaker, PhaseOrchestrator, RateLimiter};

impl CommandOutput for RunReport {
    fn to_human(&self) -> String {
        let mut table = list_table(&["#", "phase", "status", "verifications", "confidence"]);
        for phase in &self.phases {
            table.add_row(vec![
                phase.index.to_string(),
                phase.name.clone(),
                phase.status.as_str().to_string(),
                phase.verification_attempts.to_string(),
                phase.confidence.map_or_else(|| "-".to_string(), |c| c.to_string()),
            ]);
        }

        let headline = match &self.outcome {
            RunOutcome::Completed => format!("{} task {} completed", style("✔").green(), self.task_id),
            RunOutcome::NeedsHumanInput { phase, reason } => format!(
                "{} task {} needs human input at {phase}: {reason}",
                style("!").yellow(),
                self.task_id
            ),
            RunOutcome::Failed { phase, reason } => {
                format!("{} task {} failed at {phase}: {reason}", style("✘").red(), self.task_id)
            }
            RunOutcome::Interrupted { phase } => format!(
                "{} task {} interrupted{}",
                style("■").yellow(),
                self.task_id,
                phase.as_ref().map(|p| format!(" during {p}")).unwrap_or_default()
            ),
        };

        let mut lines = vec![headline, String::new(), table.to_string(), String::new()];
        lines.push(format!("Invocations: {}", self.attempts.len()));
        if let Some(assessment) = &self.confidence {
            lines.push(format!("Confidence: {}", assessment.score));
        }
        if self.premature_completion_warning {
            lines.push(format!(
                "{} agent may be claiming completion prematurely; review before trusting the result",
                style("warning:").yellow().bold()
            ));
        }
        lines.join("\n")
    }
}

/// Fold command-line overrides into the loaded configuration.
pub fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(backend) = &args.backend {
        config.agent.backend.clone_from(backend);
    }
    if let Some(model) = &args.model {
        config.agent.model = Some(model.clone());
    }
    if args.supervised {
        config.agent.autonomy = Autonomy::Supervised;
    }
    if let Some(workdir) = &args.workdir {
        config.agent.working_dir = Some(workdir.clone());
    }
}

fn read_task(args: &RunArgs) -> Result<Task> {
    let prompt = match (&args.prompt, &args.prompt_file) {
        (Some(prompt), _) => prompt.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt file {}", path.display()))?,
        (None, None) => anyhow::bail!("either --prompt or --prompt-file is required"),
    };
    if prompt.trim().is_empty() {
        anyhow::bail!("task prompt is empty");
    }
    Ok(Task::new(&args.task_id, prompt))
}

pub async fn execute(args: RunArgs, mut config: Config, interrupt: Interrupt, json_mode: bool) -> Result<RunOutcome> {
    apply_overrides(&mut config, &args);
    ConfigLoader::validate(&config)?;
    let task = read_task(&args)?;

    let registry = BackendRegistry::new().with_custom(config.backends.clone());
    let spec = registry.get(&config.agent.backend)?.clone();
    let model = registry.resolve_model(&spec.id, config.agent.model.as_deref())?;
    let backend: Arc<dyn AgentBackend> = Arc::new(CliAgentBackend::new(spec));

    let pipeline = PipelineConfig::from_config(&config)?;
    let workdir = pipeline.working_dir.clone();
    let autonomous = pipeline.autonomy == Autonomy::Autonomous;
    let identity = config.identity();

    let store = open_store(&config);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let rate_limiter = RateLimiter::load(config.rate_limit.clone(), &identity, store.clone(), clock.clone())?;
    let breaker = CircuitBreaker::load(config.circuit_breaker.clone(), &identity, store.clone(), clock.clone())?;

    let prompts = TemplatePromptSource::new(&config.paths.prompts_dir, config.paths.global_prompts_dir.clone());
    let hooks = SkillHooks::new(&config.paths.skills_dir, config.hooks.clone(), backend.clone(), model.as_str())
        .with_working_dir(&workdir)
        .with_autonomy(autonomous);
    let approval: Arc<dyn ApprovalGate> = if autonomous {
        Arc::new(AutoApproval)
    } else {
        Arc::new(TerminalApproval)
    };

    info!(
        task_id = %task.id,
        identity = %identity,
        backend = %config.agent.backend,
        model = %model,
        phases = pipeline.pipeline.len(),
        "starting run"
    );

    let mut orchestrator = PhaseOrchestrator::new(pipeline, backend, rate_limiter, breaker, store, interrupt)?
        .with_prompts(Arc::new(prompts))
        .with_hooks(Arc::new(hooks))
        .with_approval(approval)
        .with_change_detector(Arc::new(GitChangeDetector::new(&workdir)))
        .with_task_board(Arc::new(DirectoryTaskBoard::new(&config.paths.tasks_dir)))
        .with_clock(clock)
        .with_log_dir(config.paths.state_dir.join("logs"));

    let report = orchestrator.run(&task).await?;
    output(&report, json_mode);
    Ok(report.outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args() -> RunArgs {
        RunArgs {
            task_id: "t-1".into(),
            prompt: Some("add a health endpoint".into()),
            prompt_file: None,
            backend: None,
            model: None,
            supervised: false,
            workdir: None,
        }
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        let args = RunArgs {
            backend: Some("codex".into()),
            model: Some("gpt-5".into()),
            supervised: true,
            workdir: Some(PathBuf::from("/tmp/project")),
            ..args()
        };
        apply_overrides(&mut config, &args);
        assert_eq!(config.agent.backend, "codex");
        assert_eq!(config.agent.model.as_deref(), Some("gpt-5"));
        assert_eq!(config.agent.autonomy, Autonomy::Supervised);
        assert_eq!(config.identity(), "codex");
    }

    #[test]
    fn test_read_task_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.md");
        std::fs::write(&path, "fix the flaky test\n").unwrap();

        let task = read_task(&RunArgs {
            prompt: None,
            prompt_file: Some(path),
            ..args()
        })
        .unwrap();
        assert_eq!(task.id, "t-1");
        assert_eq!(task.prompt, "fix the flaky test\n");
    }

    #[test]
    fn test_read_task_rejects_empty_prompt() {
        assert!(read_task(&RunArgs {
            prompt: Some("  ".into()),
            ..args()
        })
        .is_err());
    }
}
