//! In-memory state store for tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::domain::errors::DomainResult;
use crate::domain::models::{CircuitBreakerState, RateLimiterWindow, ResumeCheckpoint};
use crate::domain::ports::StateStore;

#[derive(Debug, Default)]
struct Records {
    circuits: HashMap<String, CircuitBreakerState>,
    windows: HashMap<String, RateLimiterWindow>,
    checkpoints: HashMap<String, ResumeCheckpoint>,
    saves: usize,
}

/// Keeps records in process memory.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<Records>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Records) -> R) -> R {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut records)
    }

    /// Number of save calls of any kind, for asserting that nothing was written.
    pub fn save_count(&self) -> usize {
        self.with(|r| r.saves)
    }
}

impl StateStore for MemoryStateStore {
    fn load_circuit(&self, identity: &str) -> DomainResult<Option<CircuitBreakerState>> {
        Ok(self.with(|r| r.circuits.get(identity).cloned()))
    }

    fn save_circuit(&self, identity: &str, state: &CircuitBreakerState) -> DomainResult<()> {
        self.with(|r| {
            r.saves += 1;
            r.circuits.insert(identity.to_string(), state.clone());
        });
        Ok(())
    }

    fn clear_circuit(&self, identity: &str) -> DomainResult<()> {
        self.with(|r| r.circuits.remove(identity));
        Ok(())
    }

    fn load_rate_window(&self, identity: &str) -> DomainResult<Option<RateLimiterWindow>> {
        Ok(self.with(|r| r.windows.get(identity).cloned()))
    }

    fn save_rate_window(&self, identity: &str, window: &RateLimiterWindow) -> DomainResult<()> {
        self.with(|r| {
            r.saves += 1;
            r.windows.insert(identity.to_string(), window.clone());
        });
        Ok(())
    }

    fn clear_rate_window(&self, identity: &str) -> DomainResult<()> {
        self.with(|r| r.windows.remove(identity));
        Ok(())
    }

    fn load_checkpoint(&self, identity: &str) -> DomainResult<Option<ResumeCheckpoint>> {
        Ok(self.with(|r| r.checkpoints.get(identity).cloned()))
    }

    fn save_checkpoint(&self, identity: &str, checkpoint: &ResumeCheckpoint) -> DomainResult<()> {
        self.with(|r| {
            r.saves += 1;
            r.checkpoints.insert(identity.to_string(), checkpoint.clone());
        });
        Ok(())
    }

    fn clear_checkpoint(&self, identity: &str) -> DomainResult<()> {
        self.with(|r| r.checkpoints.remove(identity));
        Ok(())
    }
}
