//! Domain models for the phase pipeline engine.

pub mod attempt;
pub mod backend;
pub mod checkpoint;
pub mod confidence;
pub mod config;
pub mod context;
pub mod pipeline;
pub mod report;
pub mod task;

pub use attempt::{AttemptLedger, AttemptOutcome, PhaseAttemptRecord};
pub use backend::{
    BackendSpec, InvocationRequest, InvocationResult, InvocationStatus, OutputProgress,
    PromptStyle,
};
pub use checkpoint::{CircuitBreakerState, CircuitState, RateLimiterWindow, ResumeCheckpoint};
pub use confidence::{ConfidenceAssessment, ConfidenceSignals, TestsStatus};
pub use config::{
    AgentConfig, Autonomy, CircuitBreakerConfig, ConfidenceConfig, Config, ContextConfig,
    GateKind, GatesConfig, HookSet, LivenessConfig, LoggingConfig, PathsConfig, PhaseConfig,
    PipelineConfig, PipelineSection, RateLimitConfig, RetryConfig,
};
pub use context::{AccumulatedContext, ContextEntry};
pub use pipeline::{Phase, PhaseState, PhaseStatus, PipelineDefinition, RunOutcome};
pub use report::RunReport;
pub use task::Task;
