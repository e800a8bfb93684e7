//! Drover - supervised phase pipelines for autonomous coding agents
//!
//! Drover drives a coding-agent CLI (Claude Code, Codex, Gemini or a
//! configured one) through an ordered pipeline of phases. Each phase is
//! verified by quality gates, retried with the failures fed back to the
//! agent, and guarded by a stall-detecting circuit breaker and a per-hour
//! invocation quota.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and port traits
//! - **Service Layer** (`services`): Orchestrator, gates, breaker, limiter, scorer
//! - **Adapters** (`adapters`): Agent backends, state stores, git, prompts, hooks
//! - **Infrastructure Layer** (`infrastructure`): Config, logging, subprocesses
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use drover::services::PhaseOrchestrator;
//!
//! let mut orchestrator = PhaseOrchestrator::new(config, backend, limiter, breaker, store, interrupt)?;
//! let report = orchestrator.run(&Task::new("t-1", "add a health endpoint")).await?;
//! println!("{}", report.outcome.as_str());
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{Config, PipelineConfig, RunOutcome, RunReport, Task};
pub use domain::{DomainResult, EngineError, Interrupt};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{CircuitBreaker, PhaseOrchestrator, RateLimiter};
