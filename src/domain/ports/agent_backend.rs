//! Agent backend port - interface for coding-agent CLIs.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::interrupt::Interrupt;
use crate::domain::models::{BackendSpec, InvocationRequest, InvocationResult};

/// Runs one agent invocation to completion.
///
/// Implementations must honour `request.timeout` (reporting `TimedOut`) and
/// the interrupt (reporting `Interrupted`), terminating every process they
/// started in either case. `Err` is reserved for failures of the engine
/// itself, such as being unable to spawn the agent.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Static description of this backend.
    fn spec(&self) -> &BackendSpec;

    async fn invoke(
        &self,
        request: InvocationRequest,
        interrupt: &Interrupt,
    ) -> DomainResult<InvocationResult>;
}
