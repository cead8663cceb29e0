use serde::Serialize;

use ipolens_core::{Aggregator, Category, HistoryEntry, Ipo, Origin, UtcDateTime};
use serde_json::Value;

use crate::cli::{HistoryArgs, RecommendArgs, SearchArgs};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct SearchResponseData {
    query: String,
    category: Option<Category>,
    origin: Origin,
    fetched_at: UtcDateTime,
    staleness_seconds: u64,
    results: Vec<Ipo>,
}

#[derive(Debug, Serialize)]
struct HistoryResponseData {
    query: String,
    entries: Vec<HistoryEntry>,
}

pub async fn run(args: &SearchArgs, aggregator: &Aggregator) -> Result<Value, CliError> {
    let query = args.query.trim();
    if query.is_empty() {
        return Err(CliError::Command(String::from("query must not be empty")));
    }

    let category = args.category.map(Category::from);
    let found = aggregator.search(query, category).await?;
    Ok(serde_json::to_value(SearchResponseData {
        query: query.to_owned(),
        category,
        origin: found.origin,
        fetched_at: found.fetched_at,
        staleness_seconds: found.staleness_seconds,
        results: found.data,
    })?)
}

pub async fn recommend(args: &RecommendArgs, aggregator: &Aggregator) -> Result<Value, CliError> {
    let report = aggregator.recommend(&args.company).await?;
    Ok(serde_json::to_value(report)?)
}

pub fn history(args: &HistoryArgs, aggregator: &Aggregator) -> Result<Value, CliError> {
    let entries = aggregator.gmp_history(&args.company)?;
    Ok(serde_json::to_value(HistoryResponseData {
        query: args.company.trim().to_owned(),
        entries,
    })?)
}
