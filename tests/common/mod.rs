//! Common test utilities for integration tests
//!
//! Provides shared fixtures used across the engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use drover::adapters::backends::ScriptedBackend;
use drover::adapters::state::MemoryStateStore;
use drover::adapters::VirtualClock;
use drover::domain::models::{Config, GatesConfig, Phase, PipelineConfig, PipelineDefinition};
use drover::domain::ports::{ChangeDetector, ChangeSnapshot, Clock, StateStore};
use drover::domain::DomainResult;
use drover::{CircuitBreaker, Interrupt, PhaseOrchestrator, RateLimiter};

pub const IDENTITY: &str = "claude";

/// Reports one changed file after every invocation, so every successful
/// iteration counts as progress.
pub struct AlwaysChanged;

#[async_trait]
impl ChangeDetector for AlwaysChanged {
    async fn snapshot(&self) -> DomainResult<ChangeSnapshot> {
        Ok(ChangeSnapshot {
            head: None,
            dirty: BTreeSet::new(),
        })
    }

    async fn changed_files_since(&self, _: &ChangeSnapshot) -> DomainResult<Vec<String>> {
        Ok(vec!["src/main.rs".to_string()])
    }

    async fn recent_log(&self, _: usize) -> DomainResult<String> {
        Ok("0a1b2c3 scaffold project".to_string())
    }
}

/// Phases with a 60 second timeout, in the given order.
pub fn phases(names: &[&str]) -> Vec<Phase> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| Phase::new(*name, i, 60))
        .collect()
}

/// Everything an engine under test shares with the test body.
pub struct Fixture {
    pub backend: Arc<ScriptedBackend>,
    pub store: Arc<MemoryStateStore>,
    pub interrupt: Interrupt,
    pub config: Config,
}

impl Fixture {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.retry.base_delay_secs = 1;
        Self {
            backend: Arc::new(ScriptedBackend::new()),
            store: Arc::new(MemoryStateStore::new()),
            interrupt: Interrupt::new(),
            config,
        }
    }

    pub fn with_gates(mut self, gates: GatesConfig) -> Self {
        self.config.gates = gates;
        self
    }

    /// Build an orchestrator over `phases` running in `workdir`.
    pub fn engine(&self, phases: Vec<Phase>, workdir: &Path) -> PhaseOrchestrator {
        self.unobserved_engine(phases, workdir)
            .with_change_detector(Arc::new(AlwaysChanged))
    }

    /// Like [`Fixture::engine`] but without a change detector, so no
    /// iteration ever counts as progress.
    pub fn unobserved_engine(&self, phases: Vec<Phase>, workdir: &Path) -> PhaseOrchestrator {
        let mut pipeline = PipelineConfig::from_config(&self.config).unwrap();
        pipeline.pipeline = PipelineDefinition::new(phases).unwrap();
        pipeline.working_dir = workdir.to_path_buf();

        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::default());
        let store: Arc<dyn StateStore> = self.store.clone();
        let limiter = RateLimiter::load(
            self.config.rate_limit.clone(),
            IDENTITY,
            store.clone(),
            clock.clone(),
        )
        .unwrap();
        let breaker = CircuitBreaker::load(
            self.config.circuit_breaker.clone(),
            IDENTITY,
            store.clone(),
            clock.clone(),
        )
        .unwrap();

        PhaseOrchestrator::new(
            pipeline,
            self.backend.clone(),
            limiter,
            breaker,
            store,
            self.interrupt.clone(),
        )
        .unwrap()
        .with_clock(clock)
    }
}
