//! Service layer: the engine's decision logic.
//!
//! Services depend only on domain ports, so every one of them runs against
//! in-memory adapters in tests.

pub mod circuit_breaker;
pub mod confidence;
pub mod error_classifier;
pub mod liveness;
pub mod model_fallback;
pub mod phase_orchestrator;
pub mod quality_gates;
pub mod rate_limiter;
pub mod verification;

pub use circuit_breaker::{CircuitBreaker, IterationObservation, IterationVerdict};
pub use confidence::{gather_signals, parse_status_block, score, ConfidenceTracker, StatusBlock};
pub use error_classifier::{FailureClass, FailureClassifier, MarkerClassifier};
pub use liveness::{LivenessHandle, LivenessMonitor, LivenessSummary};
pub use model_fallback::ModelFallbackState;
pub use phase_orchestrator::PhaseOrchestrator;
pub use quality_gates::{gates_from_config, GateResult, GateStatus, QualityGate, ShellGate};
pub use rate_limiter::{RateCheck, RateLimiter, RateUsage};
pub use verification::{GateOutcome, PhaseInvocation, PhaseInvoker, VerificationGateRunner};
