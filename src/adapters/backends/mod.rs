//! Agent backends: the built-in registry, the CLI subprocess runner and a
//! scripted backend for tests.

pub mod cli;
pub mod mock;
pub mod registry;

pub use cli::CliAgentBackend;
pub use mock::{RecordedInvocation, ScriptedBackend, ScriptedResponse};
pub use registry::{build_argv, BackendRegistry};
