//! `drover reset`

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use super::{open_store, resolve_identity};
use crate::adapters::clock::SystemClock;
use crate::cli::output::{output, CommandOutput};
use crate::cli::types::ResetTarget;
use crate::domain::models::Config;
use crate::domain::ports::{Clock, StateStore};
use crate::services::{CircuitBreaker, RateLimiter};

#[derive(Debug, Serialize)]
pub struct ResetOutput {
    pub identity: String,
    pub cleared: Vec<&'static str>,
}

impl CommandOutput for ResetOutput {
    fn to_human(&self) -> String {
        format!("Reset {} for {}", self.cleared.join(", "), self.identity)
    }
}

pub fn reset(
    config: &Config,
    target: ResetTarget,
    identity: String,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
) -> Result<ResetOutput> {
    let mut cleared = Vec::new();

    if matches!(target, ResetTarget::Circuit | ResetTarget::All) {
        CircuitBreaker::load(config.circuit_breaker.clone(), &identity, store.clone(), clock.clone())?.reset()?;
        cleared.push(ResetTarget::Circuit.as_str());
    }
    if matches!(target, ResetTarget::Rate | ResetTarget::All) {
        RateLimiter::load(config.rate_limit.clone(), &identity, store.clone(), clock)?.reset()?;
        cleared.push(ResetTarget::Rate.as_str());
    }
    if matches!(target, ResetTarget::Checkpoint | ResetTarget::All) {
        store.clear_checkpoint(&identity)?;
        cleared.push(ResetTarget::Checkpoint.as_str());
    }

    Ok(ResetOutput { identity, cleared })
}

pub fn execute(config: &Config, target: ResetTarget, identity: Option<String>, json_mode: bool) -> Result<()> {
    let identity = resolve_identity(config, identity);
    let result = reset(config, target, identity, open_store(config), Arc::new(SystemClock))?;
    output(&result, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::state::MemoryStateStore;
    use crate::domain::models::{CircuitBreakerState, CircuitState, RateLimiterWindow, ResumeCheckpoint};

    fn seeded(clock: &ManualClock) -> Arc<MemoryStateStore> {
        let now = clock.now();
        let store = Arc::new(MemoryStateStore::new());
        let mut circuit = CircuitBreakerState::new(now);
        circuit.state = CircuitState::Open;
        circuit.open_since = Some(now);
        store.save_circuit("claude", &circuit).unwrap();
        let mut window = RateLimiterWindow::default();
        window.calls.push_back(now);
        store.save_rate_window("claude", &window).unwrap();
        store
            .save_checkpoint(
                "claude",
                &ResumeCheckpoint {
                    task_id: "t-1".into(),
                    last_completed_phase_index: 2,
                    last_completed_phase_name: "plan".into(),
                    timestamp: now,
                },
            )
            .unwrap();
        store
    }

    #[test]
    fn test_reset_checkpoint_only() {
        let clock = Arc::new(ManualClock::default());
        let store = seeded(&clock);
        let result = reset(&Config::default(), ResetTarget::Checkpoint, "claude".into(), store.clone(), clock).unwrap();
        assert_eq!(result.cleared, ["checkpoint"]);
        assert!(store.load_checkpoint("claude").unwrap().is_none());
        assert_eq!(store.load_circuit("claude").unwrap().unwrap().state, CircuitState::Open);
    }

    #[test]
    fn test_reset_all() {
        let clock = Arc::new(ManualClock::default());
        let store = seeded(&clock);
        let result = reset(&Config::default(), ResetTarget::All, "claude".into(), store.clone(), clock).unwrap();
        assert_eq!(result.cleared, ["circuit", "rate", "checkpoint"]);
        assert_eq!(store.load_circuit("claude").unwrap().unwrap().state, CircuitState::Closed);
        assert!(store.load_rate_window("claude").unwrap().map_or(true, |w| w.calls.is_empty()));
        assert!(store.load_checkpoint("claude").unwrap().is_none());
    }
}
