//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "drover")]
#[command(about = "Drover - supervised phase pipelines for coding agents", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .drover/config.yaml)
    #[arg(short, long, global = true, env = "DROVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a task through the phase pipeline
    Run(RunArgs),

    /// Show circuit breaker, rate window and checkpoint state
    Status {
        /// Agent identity (defaults to the configured one)
        #[arg(short, long)]
        identity: Option<String>,
    },

    /// Clear persisted state
    Reset {
        /// What to clear
        #[arg(value_enum)]
        target: ResetTarget,

        /// Agent identity (defaults to the configured one)
        #[arg(short, long)]
        identity: Option<String>,
    },

    /// List known agent backends
    Backends,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("task_prompt")
        .required(true)
        .args(["prompt", "prompt_file"]),
))]
pub struct RunArgs {
    /// Task identifier; checkpoints and logs are keyed by it
    #[arg(short, long)]
    pub task_id: String,

    /// Task prompt text
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Read the task prompt from a file
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    /// Agent backend (claude, codex, gemini or a configured one)
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Model to start with
    #[arg(short, long)]
    pub model: Option<String>,

    /// Ask for approval after every phase
    #[arg(long)]
    pub supervised: bool,

    /// Project directory the agent and gates run in
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTarget {
    Circuit,
    Rate,
    Checkpoint,
    All,
}

impl ResetTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Circuit => "circuit",
            Self::Rate => "rate",
            Self::Checkpoint => "checkpoint",
            Self::All => "all",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "drover", "run", "--task-id", "t-1", "--prompt", "add a flag", "--backend", "codex",
            "--supervised", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.task_id, "t-1");
        assert_eq!(args.prompt.as_deref(), Some("add a flag"));
        assert_eq!(args.backend.as_deref(), Some("codex"));
        assert!(args.supervised);
    }

    #[test]
    fn test_run_requires_exactly_one_prompt_source() {
        assert!(Cli::try_parse_from(["drover", "run", "--task-id", "t-1"]).is_err());
        assert!(Cli::try_parse_from([
            "drover", "run", "--task-id", "t-1", "--prompt", "x", "--prompt-file", "task.md",
        ])
        .is_err());
        assert!(Cli::try_parse_from(["drover", "run", "--task-id", "t-1", "--prompt-file", "task.md"]).is_ok());
    }

    #[test]
    fn test_parse_reset() {
        let cli = Cli::try_parse_from(["drover", "reset", "rate", "--identity", "codex"]).unwrap();
        match cli.command {
            Commands::Reset { target, identity } => {
                assert_eq!(target, ResetTarget::Rate);
                assert_eq!(identity.as_deref(), Some("codex"));
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(["drover", "reset", "everything"]).is_err());
    }
}
