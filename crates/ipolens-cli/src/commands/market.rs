use ipolens_core::Aggregator;
use serde_json::Value;

use crate::error::CliError;

pub async fn indices(aggregator: &Aggregator) -> Result<Value, CliError> {
    Ok(serde_json::to_value(aggregator.indices().await)?)
}

pub async fn status(aggregator: &Aggregator) -> Result<Value, CliError> {
    Ok(serde_json::to_value(aggregator.market_status().await)?)
}

pub async fn overview(aggregator: &Aggregator) -> Result<Value, CliError> {
    Ok(serde_json::to_value(aggregator.market_overview().await)?)
}
