use propdata_core::{AggregationOptions, DataAggregator};

use crate::cli::ComparablesArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    args: &ComparablesArgs,
    aggregator: &DataAggregator,
    options: &AggregationOptions,
) -> Result<CommandResult, CliError> {
    let report = aggregator
        .get_comparables(&args.address, args.radius, options)
        .await?;
    let error_count = report.errors.len();
    Ok(CommandResult::new(serde_json::to_value(&report)?, error_count))
}
