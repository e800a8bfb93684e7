//! Process-wide cooperative interrupt.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::errors::Interrupted;

/// Cooperative cancellation shared by the orchestrator, waits and subprocesses.
///
/// Cloning yields a handle to the same signal. [`Interrupt::child`] yields a
/// handle that fires with its parent but can also be cancelled alone, which
/// is how per-invocation watchers are stopped.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    token: CancellationToken,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Resolves once the interrupt fires.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Sleep for `duration`, returning early if the interrupt fires.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        if self.is_triggered() {
            return Err(Interrupted);
        }
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Interrupted),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// `Err(Interrupted)` if the interrupt has fired.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_triggered() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}
