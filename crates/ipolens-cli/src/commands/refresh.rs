use std::collections::BTreeMap;

use serde::Serialize;

use ipolens_core::{Aggregator, Category, Origin};
use serde_json::Value;
use tracing::info;

use crate::error::CliError;

#[derive(Debug, Serialize)]
struct RefreshSummary {
    category: Category,
    origin: Origin,
    records: usize,
    staleness_seconds: u64,
}

pub async fn run(aggregator: &Aggregator) -> Result<Value, CliError> {
    let results = aggregator.refresh_all().await;

    let mut origins = BTreeMap::<&'static str, usize>::new();
    let summary = results
        .into_iter()
        .map(|(category, result)| {
            *origins.entry(result.origin.as_str()).or_default() += 1;
            RefreshSummary {
                category,
                origin: result.origin,
                records: result.data.len(),
                staleness_seconds: result.staleness_seconds,
            }
        })
        .collect::<Vec<_>>();

    info!(?origins, "refresh completed");
    Ok(serde_json::to_value(summary)?)
}

pub fn health(aggregator: &Aggregator) -> Result<Value, CliError> {
    Ok(serde_json::to_value(aggregator.health())?)
}
