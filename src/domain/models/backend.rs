//! Agent backend descriptions and invocation request/result types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a backend receives the prompt text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    /// `<prompt_flag> <prompt>`
    #[default]
    Flag,
    /// Prompt as the final positional argument
    Positional,
    /// Prompt written to the child's stdin
    Stdin,
}

/// Static description of an agent CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackendSpec {
    pub id: String,
    pub command: String,

    /// Arguments placed before everything else (e.g. a subcommand)
    #[serde(default)]
    pub leading_args: Vec<String>,

    pub default_model: String,

    #[serde(default)]
    pub supported_models: Vec<String>,

    /// Most to least capable; fallback steps down this list
    #[serde(default)]
    pub fallback_chain: Vec<String>,

    /// Flags that skip interactive approval
    #[serde(default)]
    pub autonomy_flags: Vec<String>,

    #[serde(default = "default_model_flag")]
    pub model_flag: String,

    #[serde(default)]
    pub prompt_style: PromptStyle,

    #[serde(default)]
    pub prompt_flag: Option<String>,

    #[serde(default)]
    pub output_format_flags: Vec<String>,
}

fn default_model_flag() -> String {
    "--model".to_string()
}

impl BackendSpec {
    /// Whether `model` may be requested. An empty list accepts any model.
    pub fn supports_model(&self, model: &str) -> bool {
        self.supported_models.is_empty() || self.supported_models.iter().any(|m| m == model)
    }
}

/// Shared counter of output bytes produced by a running invocation.
#[derive(Debug, Clone, Default)]
pub struct OutputProgress(Arc<AtomicU64>);

impl OutputProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn bytes(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// One agent invocation.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub task_id: String,
    pub phase: String,
    pub prompt: String,
    pub model: String,
    pub autonomous: bool,
    pub working_dir: PathBuf,
    pub timeout: Duration,
    /// Per-attempt log file; none disables logging
    pub log_path: Option<PathBuf>,
    pub progress: OutputProgress,
}

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationStatus {
    Success,
    Failed { exit_code: Option<i32> },
    TimedOut,
    Interrupted,
}

/// Result of one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub status: InvocationStatus,
    /// Combined stdout and stderr
    pub output: String,
    pub duration: Duration,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        self.status == InvocationStatus::Success
    }

    pub fn output_bytes(&self) -> u64 {
        self.output.len() as u64
    }
}
