//! Scripted agent backend for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::registry::claude;
use crate::domain::errors::DomainResult;
use crate::domain::interrupt::Interrupt;
use crate::domain::models::{BackendSpec, InvocationRequest, InvocationResult, InvocationStatus};
use crate::domain::ports::AgentBackend;

/// One scripted reply.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: InvocationStatus,
    pub output: String,
    /// Simulated run time; subject to the request timeout and the interrupt
    pub delay: Duration,
}

impl ScriptedResponse {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: InvocationStatus::Success,
            output: output.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            status: InvocationStatus::Failed { exit_code: Some(1) },
            output: output.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// What the engine asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInvocation {
    pub phase: String,
    pub prompt: String,
    pub model: String,
}

/// Replays queued responses, then the default one, recording every request.
pub struct ScriptedBackend {
    spec: BackendSpec,
    queue: Mutex<VecDeque<ScriptedResponse>>,
    default_response: ScriptedResponse,
    calls: Mutex<Vec<RecordedInvocation>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::with_default_response(ScriptedResponse::success("Phase complete."))
    }

    pub fn with_default_response(response: ScriptedResponse) -> Self {
        Self {
            spec: claude(),
            queue: Mutex::new(VecDeque::new()),
            default_response: response,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_spec(mut self, spec: BackendSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Queue a response for the next unanswered invocation.
    pub fn push(&self, response: ScriptedResponse) {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<RecordedInvocation> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    fn next_response(&self) -> ScriptedResponse {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone())
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentBackend for ScriptedBackend {
    fn spec(&self) -> &BackendSpec {
        &self.spec
    }

    async fn invoke(
        &self,
        request: InvocationRequest,
        interrupt: &Interrupt,
    ) -> DomainResult<InvocationResult> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(RecordedInvocation {
                phase: request.phase.clone(),
                prompt: request.prompt.clone(),
                model: request.model.clone(),
            });

        let response = self.next_response();
        let started = tokio::time::Instant::now();

        if !response.delay.is_zero() {
            let waited = tokio::time::timeout(request.timeout, interrupt.sleep(response.delay)).await;
            let status = match waited {
                Err(_) => Some(InvocationStatus::TimedOut),
                Ok(Err(_)) => Some(InvocationStatus::Interrupted),
                Ok(Ok(())) => None,
            };
            if let Some(status) = status {
                return Ok(InvocationResult {
                    status,
                    output: String::new(),
                    duration: started.elapsed(),
                });
            }
        }

        request.progress.add(response.output.len() as u64);
        Ok(InvocationResult {
            status: response.status,
            output: response.output,
            duration: started.elapsed(),
        })
    }
}
