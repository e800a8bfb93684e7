//! Phase prompt templates.
//!
//! Templates are looked up by name in the project prompt directory, then the
//! global one, then a built-in default. They may pull in other files with
//! `{{include: name.md}}` and reference a fixed set of variables.

use regex::{Captures, Regex};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::domain::errors::{DomainResult, EngineError};
use crate::domain::models::Phase;
use crate::domain::ports::{PromptSource, PromptVars};

/// Maximum include nesting.
pub const MAX_INCLUDE_DEPTH: usize = 5;

static INCLUDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*include:\s*([^}\s]+)\s*\}\}").expect("valid include regex")
});

static VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("valid variable regex"));

const STATUS_INSTRUCTIONS: &str = "\
When you are finished, end your reply with this block:

---DROVER_STATUS---
PHASE_COMPLETE: true | false
TESTS_STATUS: pass | fail | unknown
---END_DROVER_STATUS---
";

fn phase_instructions(phase: &str) -> &'static str {
    match phase {
        "expand" => "Restate the task as a complete set of requirements. Note assumptions and open questions.",
        "triage" => "Assess scope and risk. Identify the files and components the change will touch.",
        "plan" => "Write a step-by-step implementation plan. Do not change code yet.",
        "implement" => "Implement the planned change. Keep the change focused and commit-ready.",
        "test" => "Add or update tests covering the change and make the test suite pass.",
        "docs" => "Update documentation affected by the change.",
        "review" => "Review the change for bugs, missing edge cases and style problems, and fix what you find.",
        "verify" => "Confirm the task is complete: build, lint and test pass and the requirements are met.",
        _ => "Carry out this phase of the task.",
    }
}

/// Built-in template for a phase with no template file.
pub fn default_template(phase: &str) -> String {
    format!(
        "You are working on task {{{{task_id}}}}, phase: {{{{phase}}}}.\n\n\
         ## Task\n\n{{{{task_prompt}}}}\n\n\
         ## This phase\n\n{}\n\n\
         ## Recent commits\n\n{{{{git_log}}}}\n\n\
         {{{{verification_context}}}}\n\n\
         {STATUS_INSTRUCTIONS}",
        phase_instructions(phase)
    )
}

/// Template source backed by prompt directories.
#[derive(Debug, Clone)]
pub struct TemplatePromptSource {
    search_dirs: Vec<PathBuf>,
}

impl TemplatePromptSource {
    /// `global_dir` defaults to `<config dir>/drover/prompts`.
    pub fn new(project_dir: impl Into<PathBuf>, global_dir: Option<PathBuf>) -> Self {
        let mut search_dirs = vec![project_dir.into()];
        if let Some(global) =
            global_dir.or_else(|| dirs::config_dir().map(|d| d.join("drover").join("prompts")))
        {
            search_dirs.push(global);
        }
        Self { search_dirs }
    }

    /// A source with no directories; every phase uses its built-in template.
    pub fn builtin() -> Self {
        Self {
            search_dirs: Vec::new(),
        }
    }

    fn find(&self, name: &str) -> Option<PathBuf> {
        if !is_safe_name(name) {
            return None;
        }
        self.search_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
    }

    fn expand_includes(
        &self,
        text: &str,
        depth: usize,
        stack: &mut HashSet<String>,
    ) -> DomainResult<String> {
        let mut error = None;
        let expanded = INCLUDE_RE.replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            if depth >= MAX_INCLUDE_DEPTH {
                warn!(include = %name, depth, "include depth limit reached");
                return format!("<!-- include depth limit reached: {name} -->");
            }
            if stack.contains(name) {
                warn!(include = %name, "include cycle detected");
                return format!("<!-- include cycle: {name} -->");
            }
            let Some(path) = self.find(name) else {
                warn!(include = %name, "included template not found");
                return format!("<!-- include not found: {name} -->");
            };
            match fs::read_to_string(&path) {
                Ok(body) => {
                    stack.insert(name.to_string());
                    let nested = self.expand_includes(&body, depth + 1, stack);
                    stack.remove(name);
                    match nested {
                        Ok(nested) => nested,
                        Err(e) => {
                            error.get_or_insert(e);
                            String::new()
                        }
                    }
                }
                Err(e) => {
                    error.get_or_insert(EngineError::Template(format!(
                        "cannot read {}: {e}",
                        path.display()
                    )));
                    String::new()
                }
            }
        });

        match error {
            Some(e) => Err(e),
            None => Ok(expanded.into_owned()),
        }
    }
}

/// Template names are plain relative paths inside the prompt directories.
fn is_safe_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Substitute known variables in one pass; unknown ones are left untouched.
pub fn substitute(template: &str, vars: &PromptVars) -> String {
    VAR_RE
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "task_id" => vars.task_id.clone(),
            "task_prompt" => vars.task_prompt.clone(),
            "timestamp" => vars.timestamp.clone(),
            "git_log" => vars.git_log.clone(),
            "verification_context" => render_context(&vars.verification_context),
            "phase" => vars.phase.clone(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

fn render_context(context: &str) -> String {
    if context.trim().is_empty() {
        String::new()
    } else {
        format!(
            "## Verification failures from previous attempts\n\n\
             Quality checks failed after your last attempt. Fix these problems:\n\n{context}"
        )
    }
}

fn mentions_context(template: &str) -> bool {
    VAR_RE
        .captures_iter(template)
        .any(|caps| &caps[1] == "verification_context")
}

impl PromptSource for TemplatePromptSource {
    fn render(&self, phase: &Phase, vars: &PromptVars) -> DomainResult<String> {
        let name = format!("{}.md", phase.prompt_template_ref);
        let raw = match self.find(&name) {
            Some(path) => {
                debug!(phase = %phase.name, path = %path.display(), "using prompt template");
                fs::read_to_string(&path).map_err(|e| {
                    EngineError::Template(format!("cannot read {}: {e}", path.display()))
                })?
            }
            None => {
                debug!(phase = %phase.name, "using built-in prompt template");
                default_template(&phase.name)
            }
        };

        let mut stack = HashSet::from([name]);
        let template = self.expand_includes(&raw, 0, &mut stack)?;
        let mut prompt = substitute(&template, vars);

        if !mentions_context(&template) && !vars.verification_context.trim().is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&render_context(&vars.verification_context));
        }

        Ok(prompt)
    }
}
