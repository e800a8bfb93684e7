//! Agent backend registry.

use std::collections::BTreeMap;

use crate::domain::errors::{DomainResult, EngineError};
use crate::domain::models::{BackendSpec, PromptStyle};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

/// Claude Code CLI.
pub fn claude() -> BackendSpec {
    BackendSpec {
        id: "claude".to_string(),
        command: "claude".to_string(),
        leading_args: vec![],
        default_model: "sonnet".to_string(),
        supported_models: strings(&["opus", "sonnet", "haiku"]),
        fallback_chain: strings(&["opus", "sonnet", "haiku"]),
        autonomy_flags: strings(&["--dangerously-skip-permissions"]),
        model_flag: "--model".to_string(),
        prompt_style: PromptStyle::Flag,
        prompt_flag: Some("-p".to_string()),
        output_format_flags: strings(&["--output-format", "text"]),
    }
}

/// OpenAI Codex CLI.
pub fn codex() -> BackendSpec {
    BackendSpec {
        id: "codex".to_string(),
        command: "codex".to_string(),
        leading_args: strings(&["exec"]),
        default_model: "gpt-5-codex".to_string(),
        supported_models: strings(&["gpt-5-codex", "gpt-5", "gpt-5-mini"]),
        fallback_chain: strings(&["gpt-5-codex", "gpt-5", "gpt-5-mini"]),
        autonomy_flags: strings(&["--full-auto"]),
        model_flag: "--model".to_string(),
        prompt_style: PromptStyle::Positional,
        prompt_flag: None,
        output_format_flags: vec![],
    }
}

/// Google Gemini CLI.
pub fn gemini() -> BackendSpec {
    BackendSpec {
        id: "gemini".to_string(),
        command: "gemini".to_string(),
        leading_args: vec![],
        default_model: "gemini-2.5-pro".to_string(),
        supported_models: strings(&["gemini-2.5-pro", "gemini-2.5-flash", "gemini-2.5-flash-lite"]),
        fallback_chain: strings(&["gemini-2.5-pro", "gemini-2.5-flash", "gemini-2.5-flash-lite"]),
        autonomy_flags: strings(&["--yolo"]),
        model_flag: "--model".to_string(),
        prompt_style: PromptStyle::Flag,
        prompt_flag: Some("--prompt".to_string()),
        output_format_flags: vec![],
    }
}

/// Build CLI arguments (excluding the command itself) for one invocation.
pub fn build_argv(spec: &BackendSpec, prompt: &str, model: &str, autonomous: bool) -> Vec<String> {
    let mut args = spec.leading_args.clone();

    if autonomous {
        args.extend(spec.autonomy_flags.iter().cloned());
    }

    args.push(spec.model_flag.clone());
    args.push(model.to_string());

    args.extend(spec.output_format_flags.iter().cloned());

    match spec.prompt_style {
        PromptStyle::Flag => {
            args.push(spec.prompt_flag.clone().unwrap_or_else(|| "-p".to_string()));
            args.push(prompt.to_string());
        }
        PromptStyle::Positional => args.push(prompt.to_string()),
        PromptStyle::Stdin => {}
    }

    args
}

/// Registry of known agent backends.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    specs: BTreeMap<String, BackendSpec>,
}

impl BackendRegistry {
    /// Registry holding the built-in backends.
    pub fn new() -> Self {
        let specs = [claude(), codex(), gemini()]
            .into_iter()
            .map(|spec| (spec.id.clone(), spec))
            .collect();
        Self { specs }
    }

    /// Add or replace backends declared in configuration.
    pub fn with_custom(mut self, custom: impl IntoIterator<Item = BackendSpec>) -> Self {
        for spec in custom {
            self.specs.insert(spec.id.clone(), spec);
        }
        self
    }

    pub fn get(&self, id: &str) -> DomainResult<&BackendSpec> {
        self.specs
            .get(id)
            .ok_or_else(|| EngineError::UnknownBackend(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.specs.contains_key(id)
    }

    pub fn list(&self) -> impl Iterator<Item = &BackendSpec> {
        self.specs.values()
    }

    /// The model to start with: the requested one if supported, otherwise
    /// the backend default.
    pub fn resolve_model(&self, id: &str, requested: Option<&str>) -> DomainResult<String> {
        let spec = self.get(id)?;
        match requested {
            Some(model) if spec.supports_model(model) => Ok(model.to_string()),
            Some(model) => Err(EngineError::UnsupportedModel {
                backend: id.to_string(),
                model: model.to_string(),
            }),
            None => Ok(spec.default_model.clone()),
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_backends() {
        let registry = BackendRegistry::new();
        let ids: Vec<_> = registry.list().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["claude", "codex", "gemini"]);
        assert!(matches!(registry.get("aider"), Err(EngineError::UnknownBackend(_))));
    }

    #[test]
    fn test_claude_argv() {
        let args = build_argv(&claude(), "do it", "opus", true);
        assert_eq!(
            args,
            vec![
                "--dangerously-skip-permissions",
                "--model",
                "opus",
                "--output-format",
                "text",
                "-p",
                "do it"
            ]
        );
    }

    #[test]
    fn test_codex_argv_positional_without_autonomy() {
        let args = build_argv(&codex(), "fix tests", "gpt-5", false);
        assert_eq!(args, vec!["exec", "--model", "gpt-5", "fix tests"]);
    }

    #[test]
    fn test_stdin_prompt_is_not_in_argv() {
        let spec = BackendSpec {
            prompt_style: PromptStyle::Stdin,
            ..gemini()
        };
        let args = build_argv(&spec, "secret prompt", "gemini-2.5-pro", false);
        assert!(!args.iter().any(|a| a == "secret prompt"));
    }

    #[test]
    fn test_resolve_model() {
        let registry = BackendRegistry::new();
        assert_eq!(registry.resolve_model("claude", None).unwrap(), "sonnet");
        assert_eq!(registry.resolve_model("claude", Some("haiku")).unwrap(), "haiku");
        assert!(matches!(
            registry.resolve_model("claude", Some("gpt-5")),
            Err(EngineError::UnsupportedModel { .. })
        ));
    }

    #[test]
    fn test_custom_backend_overrides() {
        let custom = BackendSpec {
            id: "local".to_string(),
            command: "./agent.sh".to_string(),
            supported_models: vec![],
            ..claude()
        };
        let registry = BackendRegistry::new().with_custom(vec![custom]);
        assert!(registry.contains("local"));
        assert_eq!(registry.resolve_model("local", Some("anything")).unwrap(), "anything");
    }
}
