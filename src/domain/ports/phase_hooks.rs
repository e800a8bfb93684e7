//! Phase hooks port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::interrupt::Interrupt;
use crate::domain::models::{Phase, Task};

/// Callbacks around each phase. Failures are logged by the caller and never
/// abort the phase.
#[async_trait]
pub trait PhaseHooks: Send + Sync {
    async fn before_phase(&self, phase: &Phase, task: &Task, interrupt: &Interrupt)
        -> DomainResult<()>;

    async fn after_phase(&self, phase: &Phase, task: &Task, interrupt: &Interrupt)
        -> DomainResult<()>;
}
