//! Circuit breaker for stall detection.
//!
//! Watches iteration outcomes for one agent identity and halts iteration
//! when the agent stops making real progress: repeated successes that change
//! nothing, shrinking output, or the same failure over and over.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{CircuitBreakerConfig, CircuitBreakerState, CircuitState};
use crate::domain::ports::{Clock, StateStore};
use crate::infrastructure::process::tail_lines;

/// What one iteration produced.
#[derive(Debug, Clone, Copy)]
pub struct IterationObservation<'a> {
    pub succeeded: bool,
    /// Files the change detector reported as modified
    pub files_changed: usize,
    pub output_bytes: u64,
    /// Output of a failed invocation, used to fingerprint repeated errors
    pub failure_output: Option<&'a str>,
}

impl<'a> IterationObservation<'a> {
    pub fn success(files_changed: usize, output_bytes: u64) -> Self {
        Self {
            succeeded: true,
            files_changed,
            output_bytes,
            failure_output: None,
        }
    }

    pub fn failure(output: &'a str) -> Self {
        Self {
            succeeded: false,
            files_changed: 0,
            output_bytes: output.len() as u64,
            failure_output: Some(output),
        }
    }
}

/// How an iteration was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationVerdict {
    Progress,
    NoProgress,
    RepeatedError,
}

/// Stall-detection automaton for one agent identity, persisted after every
/// mutation.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    identity: String,
    state: CircuitBreakerState,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Load persisted state for `identity`, or start closed.
    pub fn load(
        config: CircuitBreakerConfig,
        identity: impl Into<String>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> DomainResult<Self> {
        let identity = identity.into();
        let state = match store.load_circuit(&identity)? {
            Some(state) => {
                debug!(identity = %identity, state = state.state.as_str(), "restored circuit breaker state");
                state
            }
            None => CircuitBreakerState::new(clock.now()),
        };
        Ok(Self {
            config,
            identity,
            state,
            store,
            clock,
        })
    }

    pub fn state(&self) -> CircuitState {
        self.state.state
    }

    pub fn snapshot(&self) -> &CircuitBreakerState {
        &self.state
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether a new iteration may start.
    ///
    /// An open circuit whose cooldown has elapsed moves to half-open and
    /// allows a single probe.
    pub fn should_proceed(&mut self) -> DomainResult<bool> {
        if !self.config.enabled {
            return Ok(true);
        }
        match self.state.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(true),
            CircuitState::Open => {
                let now = self.clock.now();
                let opened = self.opened_at(now);
                if now >= opened + self.cooldown() {
                    self.transition(CircuitState::HalfOpen, "cooldown elapsed", now);
                    self.persist()?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Time left before an open circuit allows a probe.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        if self.state.state != CircuitState::Open {
            return None;
        }
        let now = self.clock.now();
        let remaining = self.opened_at(now) + self.cooldown() - now;
        Some(remaining.to_std().unwrap_or(Duration::ZERO))
    }

    /// Fold one iteration into the automaton.
    pub fn record(&mut self, observation: &IterationObservation<'_>) -> DomainResult<IterationVerdict> {
        let now = self.clock.now();
        let declined = self.output_declined(observation.output_bytes);
        self.push_output_size(observation.output_bytes);

        let verdict = if observation.succeeded {
            self.state.same_error_count = 0;
            self.state.last_error_hash = None;
            if observation.files_changed > 0 && !declined {
                IterationVerdict::Progress
            } else {
                IterationVerdict::NoProgress
            }
        } else {
            let hash = error_fingerprint(
                observation.failure_output.unwrap_or_default(),
                self.config.error_tail_lines,
            );
            if self.state.last_error_hash.as_deref() == Some(hash.as_str()) {
                self.state.same_error_count += 1;
            } else {
                self.state.same_error_count = 1;
                self.state.last_error_hash = Some(hash);
            }
            if self.state.same_error_count >= self.config.same_error_threshold {
                IterationVerdict::RepeatedError
            } else {
                IterationVerdict::NoProgress
            }
        };

        if !self.config.enabled {
            return Ok(verdict);
        }

        match verdict {
            IterationVerdict::Progress => {
                self.state.no_progress_count = 0;
                self.state.same_error_count = 0;
                if self.state.state != CircuitState::Closed {
                    self.transition(CircuitState::Closed, "progress detected", now);
                }
            }
            IterationVerdict::NoProgress => {
                self.state.no_progress_count += 1;
                let count = self.state.no_progress_count;
                debug!(
                    identity = %self.identity,
                    no_progress_count = count,
                    declined,
                    files_changed = observation.files_changed,
                    "no progress this iteration"
                );
                match self.state.state {
                    CircuitState::Closed if count >= self.config.half_open_threshold => {
                        self.transition(CircuitState::HalfOpen, "no progress", now);
                    }
                    CircuitState::HalfOpen if count >= self.config.no_progress_threshold => {
                        self.transition(CircuitState::Open, "no progress threshold reached", now);
                    }
                    _ => {}
                }
            }
            IterationVerdict::RepeatedError => {
                self.state.no_progress_count += 1;
                if self.state.state == CircuitState::Open {
                    // A failed probe restarts the cooldown
                    self.state.open_since = Some(now);
                } else {
                    self.transition(CircuitState::Open, "repeated identical error", now);
                }
            }
        }

        self.persist()?;
        Ok(verdict)
    }

    /// Return to a fresh closed state.
    pub fn reset(&mut self) -> DomainResult<()> {
        let now = self.clock.now();
        info!(identity = %self.identity, from = self.state.state.as_str(), "circuit breaker reset");
        self.state = CircuitBreakerState::new(now);
        self.persist()
    }

    fn output_declined(&self, bytes: u64) -> bool {
        let window = &self.state.output_size_window;
        if window.is_empty() {
            return false;
        }
        let sum: u128 = window.iter().map(|b| u128::from(*b)).sum();
        let len = window.len() as u128;
        // bytes < avg * pct / 100, kept in integers
        u128::from(bytes) * 100 * len < sum * u128::from(self.config.decline_percent)
    }

    fn push_output_size(&mut self, bytes: u64) {
        let window = &mut self.state.output_size_window;
        window.push_back(bytes);
        while window.len() > self.config.output_window.max(1) {
            window.pop_front();
        }
    }

    fn transition(&mut self, to: CircuitState, reason: &str, now: DateTime<Utc>) {
        let from = self.state.state;
        self.state.state = to;
        self.state.last_transition_at = now;
        match to {
            CircuitState::Open => {
                self.state.open_since = Some(now);
                warn!(
                    identity = %self.identity,
                    from = from.as_str(),
                    to = to.as_str(),
                    reason,
                    no_progress_count = self.state.no_progress_count,
                    same_error_count = self.state.same_error_count,
                    cooldown_secs = self.config.cooldown_secs,
                    "circuit breaker opened"
                );
            }
            CircuitState::HalfOpen | CircuitState::Closed => {
                self.state.open_since = None;
                if to == CircuitState::Closed {
                    self.state.no_progress_count = 0;
                }
                info!(
                    identity = %self.identity,
                    from = from.as_str(),
                    to = to.as_str(),
                    reason,
                    "circuit breaker transition"
                );
            }
        }
    }

    fn opened_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.state.open_since.unwrap_or(now)
    }

    fn cooldown(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.config.cooldown()).unwrap_or(ChronoDuration::MAX)
    }

    fn persist(&self) -> DomainResult<()> {
        self.store.save_circuit(&self.identity, &self.state)
    }
}

/// SHA-256 of the last `lines` lines of failure output, hex encoded.
pub fn error_fingerprint(output: &str, lines: usize) -> String {
    let tail = tail_lines(output, lines);
    format!("{:x}", Sha256::digest(tail.trim().as_bytes()))
}
