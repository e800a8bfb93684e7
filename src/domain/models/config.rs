use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::backend::BackendSpec;
use super::pipeline::{PipelineDefinition, DEFAULT_VERIFICATION_BUDGET};
use crate::domain::errors::DomainResult;

/// Main configuration structure for Drover
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Which agent to run and how
    #[serde(default)]
    pub agent: AgentConfig,

    /// Phase list and verification budget
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Pipeline-wide quality gate commands
    #[serde(default)]
    pub gates: GatesConfig,

    /// Invocation retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Sliding-hour invocation quota
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Stall detection
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Completion-confidence scoring
    #[serde(default)]
    pub confidence: ConfidenceConfig,

    /// Accumulated verification context
    #[serde(default)]
    pub context: ContextConfig,

    /// Background liveness monitor
    #[serde(default)]
    pub liveness: LivenessConfig,

    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Skill hooks keyed by phase name
    #[serde(default)]
    pub hooks: BTreeMap<String, HookSet>,

    /// Additional agent backends
    #[serde(default)]
    pub backends: Vec<BackendSpec>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Identity under which breaker, window and checkpoint state is kept.
    pub fn identity(&self) -> String {
        self.agent
            .identity
            .clone()
            .unwrap_or_else(|| self.agent.backend.clone())
    }
}

/// Whether the operator approves each phase transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Autonomy {
    #[default]
    Autonomous,
    Supervised,
}

/// Agent selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Backend identifier (claude, codex, gemini or a custom one)
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Model override; the backend's default when unset
    #[serde(default)]
    pub model: Option<String>,

    /// State identity; the backend id when unset
    #[serde(default)]
    pub identity: Option<String>,

    #[serde(default)]
    pub autonomy: Autonomy,

    /// Project directory the agent and gates run in
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

fn default_backend() -> String {
    "claude".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model: None,
            identity: None,
            autonomy: Autonomy::default(),
            working_dir: None,
        }
    }
}

/// Pipeline section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineSection {
    /// Ordered phases; empty means the built-in eight
    #[serde(default)]
    pub phases: Vec<PhaseConfig>,

    /// Verification attempts per phase unless the phase overrides it
    #[serde(default = "default_verification_budget")]
    pub verification_retry_budget: u32,
}

const fn default_verification_budget() -> u32 {
    DEFAULT_VERIFICATION_BUDGET
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            phases: Vec::new(),
            verification_retry_budget: default_verification_budget(),
        }
    }
}

/// One configured phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PhaseConfig {
    pub name: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub verification_retry_budget: Option<u32>,
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub gates: Option<GatesConfig>,
}

/// The four quality gate slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Build,
    Lint,
    Format,
    Test,
}

impl GateKind {
    pub const ALL: [Self; 4] = [Self::Build, Self::Lint, Self::Format, Self::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Lint => "lint",
            Self::Format => "format",
            Self::Test => "test",
        }
    }
}

/// Quality gate commands. An empty command is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GatesConfig {
    #[serde(default)]
    pub build: String,
    #[serde(default)]
    pub lint: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub test: String,

    /// Per-gate timeout in seconds
    #[serde(default = "default_gate_timeout")]
    pub timeout_secs: u64,
}

const fn default_gate_timeout() -> u64 {
    300
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            build: String::new(),
            lint: String::new(),
            format: String::new(),
            test: String::new(),
            timeout_secs: default_gate_timeout(),
        }
    }
}

impl GatesConfig {
    pub fn command(&self, kind: GateKind) -> &str {
        match kind {
            GateKind::Build => &self.build,
            GateKind::Lint => &self.lint,
            GateKind::Format => &self.format,
            GateKind::Test => &self.test,
        }
    }

    /// Non-empty gate commands in build, lint, format, test order.
    pub fn configured(&self) -> Vec<(GateKind, &str)> {
        GateKind::ALL
            .iter()
            .map(|kind| (*kind, self.command(*kind).trim()))
            .filter(|(_, cmd)| !cmd.is_empty())
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Invocation retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum invocation attempts per verification round
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff unit; attempt n waits n times this
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_base_delay_secs() -> u64 {
    30
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
        }
    }
}

impl RetryConfig {
    /// Linear backoff after the given failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.base_delay_secs.saturating_mul(u64::from(attempt)))
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    #[serde(default = "default_calls_per_hour")]
    pub calls_per_hour: u32,

    /// Usage percentage above which each call logs a warning
    #[serde(default = "default_warning_threshold_percent")]
    pub warning_threshold_percent: u8,
}

const fn default_calls_per_hour() -> u32 {
    80
}

const fn default_warning_threshold_percent() -> u8 {
    80
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls_per_hour: default_calls_per_hour(),
            warning_threshold_percent: default_warning_threshold_percent(),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// No-progress count that opens a half-open circuit
    #[serde(default = "default_no_progress_threshold")]
    pub no_progress_threshold: u32,

    /// No-progress count that moves a closed circuit to half-open
    #[serde(default = "default_half_open_threshold")]
    pub half_open_threshold: u32,

    /// Consecutive identical failures that force the circuit open
    #[serde(default = "default_same_error_threshold")]
    pub same_error_threshold: u32,

    /// Output below this percentage of the rolling average counts as decline
    #[serde(default = "default_decline_percent")]
    pub decline_percent: u8,

    /// Number of output sizes kept for the rolling average
    #[serde(default = "default_output_window")]
    pub output_window: usize,

    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Lines from the end of failure output that form the error fingerprint
    #[serde(default = "default_error_tail_lines")]
    pub error_tail_lines: usize,
}

const fn default_true() -> bool {
    true
}

const fn default_no_progress_threshold() -> u32 {
    3
}

const fn default_half_open_threshold() -> u32 {
    2
}

const fn default_same_error_threshold() -> u32 {
    5
}

const fn default_decline_percent() -> u8 {
    70
}

const fn default_output_window() -> usize {
    5
}

const fn default_cooldown_secs() -> u64 {
    300
}

const fn default_error_tail_lines() -> usize {
    20
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            no_progress_threshold: default_no_progress_threshold(),
            half_open_threshold: default_half_open_threshold(),
            same_error_threshold: default_same_error_threshold(),
            decline_percent: default_decline_percent(),
            output_window: default_output_window(),
            cooldown_secs: default_cooldown_secs(),
            error_tail_lines: default_error_tail_lines(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Confidence scoring configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConfidenceConfig {
    /// Score at or above which a completion claim is believed
    #[serde(default = "default_confidence_threshold")]
    pub threshold: u8,

    /// Consecutive low scores before warning about premature completion
    #[serde(default = "default_warn_after")]
    pub warn_after: u32,

    /// Free-text completion keywords, matched case-insensitively
    #[serde(default = "default_completion_keywords")]
    pub keywords: Vec<String>,
}

const fn default_confidence_threshold() -> u8 {
    70
}

const fn default_warn_after() -> u32 {
    3
}

fn default_completion_keywords() -> Vec<String> {
    [
        "task complete",
        "task is complete",
        "all tests pass",
        "implementation complete",
        "successfully implemented",
        "done",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            threshold: default_confidence_threshold(),
            warn_after: default_warn_after(),
            keywords: default_completion_keywords(),
        }
    }
}

/// Accumulated context configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ContextConfig {
    #[serde(default = "default_context_max_lines")]
    pub max_lines: usize,
}

const fn default_context_max_lines() -> usize {
    super::context::DEFAULT_CONTEXT_MAX_LINES
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_lines: default_context_max_lines(),
        }
    }
}

/// Liveness monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LivenessConfig {
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,

    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    #[serde(default = "default_timeout_warning_percent")]
    pub timeout_warning_percent: u8,
}

const fn default_sample_interval_secs() -> u64 {
    30
}

const fn default_stale_after_secs() -> u64 {
    300
}

const fn default_timeout_warning_percent() -> u8 {
    80
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            timeout_warning_percent: default_timeout_warning_percent(),
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PathsConfig {
    /// Persisted breaker, window, checkpoint and log files
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Project-level prompt overrides
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: PathBuf,

    /// Global prompts; the user config dir when unset
    #[serde(default)]
    pub global_prompts_dir: Option<PathBuf>,

    #[serde(default = "default_skills_dir")]
    pub skills_dir: PathBuf,

    #[serde(default = "default_tasks_dir")]
    pub tasks_dir: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".drover")
}

fn default_prompts_dir() -> PathBuf {
    PathBuf::from(".drover/prompts")
}

fn default_skills_dir() -> PathBuf {
    PathBuf::from(".drover/skills")
}

fn default_tasks_dir() -> PathBuf {
    PathBuf::from(".drover/tasks")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            prompts_dir: default_prompts_dir(),
            global_prompts_dir: None,
            skills_dir: default_skills_dir(),
            tasks_dir: default_tasks_dir(),
        }
    }
}

/// Skills run around a phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HookSet {
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub after: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Also write logs under `<state_dir>/logs`
    #[serde(default)]
    pub log_to_file: bool,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_to_file: false,
            rotation: default_rotation(),
        }
    }
}

/// Immutable settings handed to the orchestrator for one run.
///
/// Built once from [`Config`] so that nothing downstream reads ambient
/// configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub identity: String,
    pub backend: String,
    pub model: Option<String>,
    pub autonomy: Autonomy,
    pub working_dir: PathBuf,
    pub pipeline: PipelineDefinition,
    pub gates: GatesConfig,
    pub retry: RetryConfig,
    pub context: ContextConfig,
    pub liveness: LivenessConfig,
    pub confidence: ConfidenceConfig,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> DomainResult<Self> {
        let pipeline = PipelineDefinition::from_config(
            &config.pipeline.phases,
            config.pipeline.verification_retry_budget,
        )?;

        Ok(Self {
            identity: config.identity(),
            backend: config.agent.backend.clone(),
            model: config.agent.model.clone(),
            autonomy: config.agent.autonomy,
            working_dir: config
                .agent
                .working_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
            pipeline,
            gates: config.gates.clone(),
            retry: config.retry.clone(),
            context: config.context.clone(),
            liveness: config.liveness.clone(),
            confidence: config.confidence.clone(),
        })
    }

    /// Gate commands that apply to a phase.
    pub fn gates_for<'a>(&'a self, phase: &'a super::pipeline::Phase) -> &'a GatesConfig {
        phase.gates.as_ref().unwrap_or(&self.gates)
    }
}
