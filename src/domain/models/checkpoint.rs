//! Resume checkpoint and persisted engine state records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Last phase completed for a task, written after the phase's after-hooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeCheckpoint {
    pub task_id: String,
    pub last_completed_phase_index: usize,
    pub last_completed_phase_name: String,
    pub timestamp: DateTime<Utc>,
}

impl ResumeCheckpoint {
    /// Whether `index` was completed by an earlier run.
    pub fn covers(&self, task_id: &str, index: usize) -> bool {
        self.task_id == task_id && index <= self.last_completed_phase_index
    }
}

/// State of the stall-detection automaton.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    #[default]
    Closed,
    HalfOpen,
    Open,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::HalfOpen => "half_open",
            Self::Open => "open",
        }
    }
}

/// Persisted circuit breaker record for one agent identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub no_progress_count: u32,
    pub same_error_count: u32,
    pub last_error_hash: Option<String>,
    pub output_size_window: VecDeque<u64>,
    pub last_transition_at: DateTime<Utc>,
    /// Set whenever `state` is `Open`
    pub open_since: Option<DateTime<Utc>>,
}

impl CircuitBreakerState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: CircuitState::Closed,
            no_progress_count: 0,
            same_error_count: 0,
            last_error_hash: None,
            output_size_window: VecDeque::new(),
            last_transition_at: now,
            open_since: None,
        }
    }
}

/// Invocation timestamps within (roughly) the trailing hour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterWindow {
    pub calls: VecDeque<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_covers() {
        let checkpoint = ResumeCheckpoint {
            task_id: "t-1".into(),
            last_completed_phase_index: 2,
            last_completed_phase_name: "plan".into(),
            timestamp: Utc::now(),
        };
        assert!(checkpoint.covers("t-1", 0));
        assert!(checkpoint.covers("t-1", 2));
        assert!(!checkpoint.covers("t-1", 3));
        assert!(!checkpoint.covers("t-2", 0));
    }

    #[test]
    fn test_circuit_state_serializes_snake_case() {
        let json = serde_json::to_string(&CircuitState::HalfOpen).unwrap();
        assert_eq!(json, "\"half_open\"");
    }
}
