mod comparables;
mod neighborhood;
mod property;
mod sources;

use std::time::Duration;

use propdata_core::{AggregationOptions, AggregatorBuilder, DataAggregator};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// One rendered document plus the count that drives the exit code.
pub struct CommandResult {
    pub data: Value,
    pub error_count: usize,
}

impl CommandResult {
    pub fn new(data: Value, error_count: usize) -> Self {
        Self { data, error_count }
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let aggregator = build_aggregator(cli)?;
    let options =
        AggregationOptions::default().with_deadline(Duration::from_millis(cli.deadline_ms));

    match &cli.command {
        Command::Property(args) => property::run(args, &aggregator, options).await,
        Command::Neighborhood(args) => neighborhood::run(args, &aggregator, options).await,
        Command::Comparables(args) => comparables::run(args, &aggregator, &options).await,
        Command::Sources => sources::run(&aggregator),
    }
}

fn build_aggregator(cli: &Cli) -> Result<DataAggregator, CliError> {
    let builder = AggregatorBuilder::new()
        .with_request_timeout(Duration::from_millis(cli.timeout_ms));
    let builder = if cli.offline {
        builder.with_offline_mode()
    } else {
        builder.with_env()
    };
    Ok(builder.build()?)
}
