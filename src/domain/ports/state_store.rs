//! State store port - persisted per-identity engine state.

use crate::domain::errors::DomainResult;
use crate::domain::models::{CircuitBreakerState, RateLimiterWindow, ResumeCheckpoint};

/// Persistence for circuit breaker state, rate window and resume checkpoint.
///
/// Every record is keyed by agent identity. Saves must be atomic: a reader
/// never observes a partially written record.
pub trait StateStore: Send + Sync {
    fn load_circuit(&self, identity: &str) -> DomainResult<Option<CircuitBreakerState>>;
    fn save_circuit(&self, identity: &str, state: &CircuitBreakerState) -> DomainResult<()>;
    fn clear_circuit(&self, identity: &str) -> DomainResult<()>;

    fn load_rate_window(&self, identity: &str) -> DomainResult<Option<RateLimiterWindow>>;
    fn save_rate_window(&self, identity: &str, window: &RateLimiterWindow) -> DomainResult<()>;
    fn clear_rate_window(&self, identity: &str) -> DomainResult<()>;

    fn load_checkpoint(&self, identity: &str) -> DomainResult<Option<ResumeCheckpoint>>;
    fn save_checkpoint(&self, identity: &str, checkpoint: &ResumeCheckpoint) -> DomainResult<()>;
    fn clear_checkpoint(&self, identity: &str) -> DomainResult<()>;
}
