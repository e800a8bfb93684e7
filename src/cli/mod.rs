//! Command-line interface.

pub mod commands;
pub mod output;
pub mod types;

pub use types::{Cli, Commands, ResetTarget, RunArgs};

use anyhow::Result;
use console::style;
use tracing::warn;

use crate::domain::interrupt::Interrupt;
use crate::domain::models::RunOutcome;
use crate::infrastructure::logging::{LogConfig, LoggerImpl};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_NEEDS_HUMAN_INPUT: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Process exit code for a finished run.
pub fn exit_code(outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Completed => EXIT_OK,
        RunOutcome::NeedsHumanInput { .. } => EXIT_NEEDS_HUMAN_INPUT,
        RunOutcome::Failed { .. } => EXIT_FAILED,
        RunOutcome::Interrupted { .. } => EXIT_INTERRUPTED,
    }
}

/// Load configuration, install logging and run the selected command.
///
/// Returns the process exit code. The logger guard is dropped before
/// returning so buffered file output is flushed.
pub async fn dispatch(cli: Cli) -> Result<i32> {
    let config = commands::load_config(cli.config.as_deref())?;

    let mut log_config = LogConfig::from_settings(&config.logging, &config.paths);
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logger = LoggerImpl::init(&log_config)?;

    let code = match cli.command {
        Commands::Run(args) => {
            let interrupt = Interrupt::new();
            let on_signal = interrupt.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping at the next safe point");
                    on_signal.trigger();
                }
            });
            let outcome = commands::run::execute(args, config, interrupt, cli.json).await?;
            exit_code(&outcome)
        }
        Commands::Status { identity } => {
            commands::status::execute(&config, identity, cli.json)?;
            EXIT_OK
        }
        Commands::Reset { target, identity } => {
            commands::reset::execute(&config, target, identity, cli.json)?;
            EXIT_OK
        }
        Commands::Backends => {
            commands::backends::execute(&config, cli.json);
            EXIT_OK
        }
    };
    Ok(code)
}

/// Report a command error and exit with [`EXIT_FAILED`].
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({ "error": format!("{err:#}") });
        eprintln!("{body}");
    } else {
        eprintln!("{} {err:#}", style("error:").red().bold());
    }
    std::process::exit(EXIT_FAILED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&RunOutcome::Completed), 0);
        assert_eq!(
            exit_code(&RunOutcome::NeedsHumanInput {
                phase: "test".into(),
                reason: "verification budget exhausted".into()
            }),
            2
        );
        assert_eq!(
            exit_code(&RunOutcome::Failed {
                phase: "implement".into(),
                reason: "aborted by operator".into()
            }),
            1
        );
        assert_eq!(exit_code(&RunOutcome::Interrupted { phase: None }), 130);
    }
}
