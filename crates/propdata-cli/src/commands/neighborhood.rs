use propdata_core::{AggregationOptions, DataAggregator};

use crate::cli::NeighborhoodArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    args: &NeighborhoodArgs,
    aggregator: &DataAggregator,
    options: AggregationOptions,
) -> Result<CommandResult, CliError> {
    let options = options.with_fallback(args.fallback);
    let record = aggregator
        .get_neighborhood_data(&args.region, &options)
        .await?;
    let error_count = record.errors.len();
    Ok(CommandResult::new(serde_json::to_value(&record)?, error_count))
}
