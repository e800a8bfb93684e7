//! `drover status`

use anyhow::Result;
use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;
use std::sync::Arc;

use super::{open_store, resolve_identity};
use crate::adapters::clock::SystemClock;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{CircuitState, Config, ResumeCheckpoint};
use crate::domain::ports::{Clock, StateStore};
use crate::services::{CircuitBreaker, RateLimiter};

#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub identity: String,
    pub circuit_state: CircuitState,
    pub no_progress_count: u32,
    pub same_error_count: u32,
    pub open_since: Option<DateTime<Utc>>,
    pub cooldown_remaining_secs: Option<u64>,
    pub calls_used: u32,
    pub calls_per_hour: u32,
    pub next_slot_at: Option<DateTime<Utc>>,
    pub checkpoint: Option<ResumeCheckpoint>,
}

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        let circuit = match self.circuit_state {
            CircuitState::Closed => style(self.circuit_state.as_str()).green(),
            CircuitState::HalfOpen => style(self.circuit_state.as_str()).yellow(),
            CircuitState::Open => style(self.circuit_state.as_str()).red(),
        };

        let mut lines = vec![
            format!("Identity: {}", style(&self.identity).bold()),
            format!("Circuit: {circuit}"),
            format!("  No-progress iterations: {}", self.no_progress_count),
            format!("  Repeated errors: {}", self.same_error_count),
        ];
        if let Some(remaining) = self.cooldown_remaining_secs {
            lines.push(format!("  Cooldown remaining: {remaining}s"));
        }

        lines.push(format!("Rate window: {}/{} calls this hour", self.calls_used, self.calls_per_hour));
        if let Some(at) = self.next_slot_at {
            lines.push(format!("  Oldest call expires: {}", at.format("%Y-%m-%d %H:%M:%S UTC")));
        }

        match &self.checkpoint {
            Some(cp) => lines.push(format!(
                "Checkpoint: task {} after phase {} (#{}) at {}",
                cp.task_id,
                cp.last_completed_phase_name,
                cp.last_completed_phase_index,
                cp.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
            )),
            None => lines.push("Checkpoint: none".to_string()),
        }

        lines.join("\n")
    }
}

pub fn collect(
    config: &Config,
    identity: String,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
) -> Result<StatusOutput> {
    let breaker = CircuitBreaker::load(config.circuit_breaker.clone(), &identity, store.clone(), clock.clone())?;
    let mut limiter = RateLimiter::load(config.rate_limit.clone(), &identity, store.clone(), clock)?;
    let usage = limiter.usage();
    let snapshot = breaker.snapshot();

    Ok(StatusOutput {
        circuit_state: snapshot.state,
        no_progress_count: snapshot.no_progress_count,
        same_error_count: snapshot.same_error_count,
        open_since: snapshot.open_since,
        cooldown_remaining_secs: breaker.cooldown_remaining().map(|d| d.as_secs()),
        calls_used: usage.used,
        calls_per_hour: usage.capacity,
        next_slot_at: usage.next_slot_at,
        checkpoint: store.load_checkpoint(&identity)?,
        identity,
    })
}

pub fn execute(config: &Config, identity: Option<String>, json_mode: bool) -> Result<()> {
    let identity = resolve_identity(config, identity);
    let status = collect(config, identity, open_store(config), Arc::new(SystemClock))?;
    output(&status, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::state::MemoryStateStore;
    use crate::domain::models::{CircuitBreakerState, RateLimiterWindow};
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_collect_reports_persisted_state() {
        let clock = Arc::new(ManualClock::default());
        let now = clock.now();
        let store = Arc::new(MemoryStateStore::new());

        let mut circuit = CircuitBreakerState::new(now);
        circuit.state = CircuitState::Open;
        circuit.open_since = Some(now - ChronoDuration::seconds(100));
        store.save_circuit("claude", &circuit).unwrap();

        let mut window = RateLimiterWindow::default();
        window.calls.push_back(now - ChronoDuration::minutes(10));
        window.calls.push_back(now - ChronoDuration::minutes(5));
        store.save_rate_window("claude", &window).unwrap();

        let status = collect(&Config::default(), "claude".into(), store, clock).unwrap();
        assert_eq!(status.circuit_state, CircuitState::Open);
        assert_eq!(status.cooldown_remaining_secs, Some(200));
        assert_eq!(status.calls_used, 2);
        assert_eq!(status.calls_per_hour, 80);
        assert!(status.checkpoint.is_none());
        assert!(status.to_human().contains("2/80 calls"));
    }
}
