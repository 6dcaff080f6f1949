use propdata_core::{AggregationOptions, DataAggregator};

use crate::cli::PropertyArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    args: &PropertyArgs,
    aggregator: &DataAggregator,
    options: AggregationOptions,
) -> Result<CommandResult, CliError> {
    let options = options
        .with_fallback(args.fallback)
        .with_comparables(args.comparables)
        .with_history(args.history)
        .with_radius_miles(args.radius);

    let record = aggregator.get_property_data(&args.address, &options).await?;
    let error_count = record.errors.len();
    Ok(CommandResult::new(serde_json::to_value(&record)?, error_count))
}
