//! Model fallback after retryable provider failures.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Which model the orchestrator currently invokes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFallbackState {
    pub default_model: String,
    pub current_model: String,
    pub fallback_triggered: bool,
}

impl ModelFallbackState {
    pub fn new(default_model: impl Into<String>) -> Self {
        let default_model = default_model.into();
        Self {
            current_model: default_model.clone(),
            default_model,
            fallback_triggered: false,
        }
    }

    pub fn current(&self) -> &str {
        &self.current_model
    }

    /// Step to the next, less capable model in `chain`.
    ///
    /// Returns `None` at the floor model or when the current model is not in
    /// the chain.
    pub fn fall_back(&mut self, chain: &[String]) -> Option<String> {
        let Some(position) = chain.iter().position(|m| *m == self.current_model) else {
            warn!(model = %self.current_model, "current model is not in the fallback chain");
            return None;
        };
        let Some(next) = chain.get(position + 1) else {
            warn!(model = %self.current_model, "already at the floor model, no fallback available");
            return None;
        };
        info!(from = %self.current_model, to = %next, "falling back to a smaller model");
        self.current_model.clone_from(next);
        self.fallback_triggered = true;
        Some(next.clone())
    }

    pub fn reset(&mut self) {
        if self.fallback_triggered {
            info!(model = %self.default_model, "restoring default model");
        }
        self.current_model.clone_from(&self.default_model);
        self.fallback_triggered = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Vec<String> {
        vec!["opus".into(), "sonnet".into(), "haiku".into()]
    }

    #[test]
    fn test_falls_back_down_the_chain_to_the_floor() {
        let mut state = ModelFallbackState::new("opus");
        assert_eq!(state.fall_back(&chain()).as_deref(), Some("sonnet"));
        assert_eq!(state.fall_back(&chain()).as_deref(), Some("haiku"));
        assert_eq!(state.fall_back(&chain()), None);
        assert_eq!(state.current(), "haiku");
        assert!(state.fallback_triggered);

        state.reset();
        assert_eq!(state.current(), "opus");
        assert!(!state.fallback_triggered);
    }

    #[test]
    fn test_refuses_when_model_not_in_chain() {
        let mut state = ModelFallbackState::new("custom-model");
        assert_eq!(state.fall_back(&chain()), None);
        assert!(!state.fallback_triggered);
        assert_eq!(state.fall_back(&[]), None);
    }
}
