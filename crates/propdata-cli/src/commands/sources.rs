use propdata_core::{DataAggregator, ServiceStatus};
use serde::Serialize;

use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SourcesResponseData {
    sources: Vec<ServiceStatus>,
    available_count: usize,
}

pub fn run(aggregator: &DataAggregator) -> Result<CommandResult, CliError> {
    let sources = aggregator.service_status();
    let available_count = sources.iter().filter(|status| status.available).count();
    let data = serde_json::to_value(SourcesResponseData {
        sources,
        available_count,
    })?;
    Ok(CommandResult::new(data, 0))
}
