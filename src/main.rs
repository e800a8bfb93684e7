//! Drover CLI entry point.

use clap::Parser;

use drover::cli::{dispatch, handle_error, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    match dispatch(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => handle_error(&err, json),
    }
}
