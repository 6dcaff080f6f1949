mod cli;
mod commands;
mod error;
mod output;

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

/// Logs go to stderr so stdout carries only the JSON document.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();

    let result = commands::run(&cli).await?;
    output::render(&result.data, cli.pretty)?;

    exit_status(cli.strict, result.error_count).map(ExitCode::from)
}

/// Degraded results exit 3, or fail outright under `--strict`.
fn exit_status(strict: bool, error_count: usize) -> Result<u8, CliError> {
    if error_count == 0 {
        return Ok(0);
    }
    if strict {
        return Err(CliError::StrictModeViolation { error_count });
    }
    Ok(CliError::DEGRADED_EXIT_CODE)
}
