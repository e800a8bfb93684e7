//! Port trait definitions (Hexagonal Architecture)
//!
//! Interfaces the engine depends on; adapters implement them:
//! - AgentBackend: runs a coding-agent CLI
//! - StateStore: per-identity circuit, rate window and checkpoint records
//! - PromptSource, PhaseHooks, ApprovalGate, ChangeDetector, TaskBoard:
//!   the collaborators around the phase loop
//! - Clock: wall time

pub mod agent_backend;
pub mod approval_gate;
pub mod change_detector;
pub mod clock;
pub mod phase_hooks;
pub mod prompt_source;
pub mod state_store;
pub mod task_board;

pub use agent_backend::AgentBackend;
pub use approval_gate::{ApprovalDecision, ApprovalGate};
pub use change_detector::{ChangeDetector, ChangeSnapshot};
pub use clock::Clock;
pub use phase_hooks::PhaseHooks;
pub use prompt_source::{PromptSource, PromptVars};
pub use state_store::StateStore;
pub use task_board::TaskBoard;
