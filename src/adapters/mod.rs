//! Adapters implementing the domain ports.

pub mod approval;
pub mod backends;
pub mod clock;
pub mod git;
pub mod hooks;
pub mod prompts;
pub mod state;
pub mod task_board;

pub use approval::{AutoApproval, TerminalApproval};
pub use clock::{ManualClock, SystemClock, VirtualClock};
pub use git::GitChangeDetector;
pub use hooks::{NoopHooks, SkillHooks};
pub use prompts::TemplatePromptSource;
pub use task_board::{DirectoryTaskBoard, NullTaskBoard};
