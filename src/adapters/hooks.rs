//! Phase hooks: skill prompts run before and after phases.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::prompts::substitute;
use crate::domain::errors::{DomainResult, EngineError};
use crate::domain::interrupt::Interrupt;
use crate::domain::models::{HookSet, InvocationRequest, OutputProgress, Phase, Task};
use crate::domain::ports::{AgentBackend, PhaseHooks, PromptVars};

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

#[async_trait]
impl PhaseHooks for NoopHooks {
    async fn before_phase(&self, _: &Phase, _: &Task, _: &Interrupt) -> DomainResult<()> {
        Ok(())
    }

    async fn after_phase(&self, _: &Phase, _: &Task, _: &Interrupt) -> DomainResult<()> {
        Ok(())
    }
}

/// Runs configured skills through the agent backend.
pub struct SkillHooks {
    skills_dir: PathBuf,
    hooks: BTreeMap<String, HookSet>,
    backend: Arc<dyn AgentBackend>,
    model: String,
    autonomous: bool,
    working_dir: PathBuf,
    timeout: Duration,
}

#[derive(Clone, Copy)]
enum When {
    Before,
    After,
}

impl When {
    fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

impl SkillHooks {
    pub fn new(
        skills_dir: impl Into<PathBuf>,
        hooks: BTreeMap<String, HookSet>,
        backend: Arc<dyn AgentBackend>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            skills_dir: skills_dir.into(),
            hooks,
            backend,
            model: model.into(),
            autonomous: true,
            working_dir: PathBuf::from("."),
            timeout: Duration::from_secs(600),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_autonomy(mut self, autonomous: bool) -> Self {
        self.autonomous = autonomous;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `<skills_dir>/<name>.md`, or `<skills_dir>/<name>/SKILL.md`.
    fn skill_path(&self, name: &str) -> Option<PathBuf> {
        [
            self.skills_dir.join(format!("{name}.md")),
            self.skills_dir.join(name).join("SKILL.md"),
        ]
        .into_iter()
        .find(|p| p.is_file())
    }

    async fn run_skills(
        &self,
        when: When,
        phase: &Phase,
        task: &Task,
        interrupt: &Interrupt,
    ) -> DomainResult<()> {
        let Some(set) = self.hooks.get(&phase.name) else {
            return Ok(());
        };
        let skills = match when {
            When::Before => &set.before,
            When::After => &set.after,
        };

        let mut failures = Vec::new();
        for skill in skills {
            if interrupt.is_triggered() {
                break;
            }
            if let Err(e) = self.run_skill(skill, when, phase, task, interrupt).await {
                warn!(skill = %skill, phase = %phase.name, hook = when.as_str(), error = %e, "skill hook failed");
                failures.push(skill.clone());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Hook {
                hook: format!("{} {}", when.as_str(), phase.name),
                reason: format!("failed skills: {}", failures.join(", ")),
            })
        }
    }

    async fn run_skill(
        &self,
        skill: &str,
        when: When,
        phase: &Phase,
        task: &Task,
        interrupt: &Interrupt,
    ) -> DomainResult<()> {
        let path = self.skill_path(skill).ok_or_else(|| EngineError::Hook {
            hook: skill.to_string(),
            reason: format!("skill not found in {}", self.skills_dir.display()),
        })?;
        let body = std::fs::read_to_string(&path)?;

        let vars = PromptVars {
            task_id: task.id.clone(),
            task_prompt: task.prompt.clone(),
            timestamp: Utc::now().to_rfc3339(),
            git_log: String::new(),
            verification_context: String::new(),
            phase: phase.name.clone(),
        };
        let prompt = format!(
            "{}\n\n## Context\n\nTask {} ({}), {} the {} phase:\n\n{}",
            substitute(&body, &vars),
            task.id,
            skill,
            when.as_str(),
            phase.name,
            task.prompt
        );

        info!(skill = %skill, phase = %phase.name, hook = when.as_str(), "running skill hook");
        let result = self
            .backend
            .invoke(
                InvocationRequest {
                    task_id: task.id.clone(),
                    phase: format!("{}:{}:{skill}", phase.name, when.as_str()),
                    prompt,
                    model: self.model.clone(),
                    autonomous: self.autonomous,
                    working_dir: self.working_dir.clone(),
                    timeout: self.timeout,
                    log_path: None,
                    progress: OutputProgress::new(),
                },
                interrupt,
            )
            .await?;

        if result.is_success() {
            Ok(())
        } else {
            Err(EngineError::Hook {
                hook: skill.to_string(),
                reason: format!("agent ended with {:?}", result.status),
            })
        }
    }
}

#[async_trait]
impl PhaseHooks for SkillHooks {
    async fn before_phase(&self, phase: &Phase, task: &Task, interrupt: &Interrupt) -> DomainResult<()> {
        self.run_skills(When::Before, phase, task, interrupt).await
    }

    async fn after_phase(&self, phase: &Phase, task: &Task, interrupt: &Interrupt) -> DomainResult<()> {
        self.run_skills(When::After, phase, task, interrupt).await
    }
}
