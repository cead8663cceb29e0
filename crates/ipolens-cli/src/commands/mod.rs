mod ipos;
mod market;
mod refresh;
mod search;

use std::sync::Arc;

use ipolens_core::{Aggregator, EngineConfig, HttpClient, ReqwestHttpClient, ScriptedHttpClient};
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let aggregator = build_aggregator(cli)?;

    match &cli.command {
        Command::Ipos(args) => ipos::run(args, &aggregator).await,
        Command::Indices => market::indices(&aggregator).await,
        Command::MarketStatus => market::status(&aggregator).await,
        Command::Overview => market::overview(&aggregator).await,
        Command::Search(args) => search::run(args, &aggregator).await,
        Command::Recommend(args) => search::recommend(args, &aggregator).await,
        Command::History(args) => search::history(args, &aggregator),
        Command::Refresh => refresh::run(&aggregator).await,
        Command::Health => refresh::health(&aggregator),
    }
}

fn build_aggregator(cli: &Cli) -> Result<Aggregator, CliError> {
    let mut config = EngineConfig::load(cli.config.as_deref())?.apply_env()?;

    let http: Arc<dyn HttpClient> = if cli.mock {
        // Nothing is scripted, so every fetch fails fast into the demo fallback.
        config.fetch.max_retries = 1;
        config.fetch.rate_limit_delay_ms = 0;
        config.cache.snapshot_dir = None;
        Arc::new(ScriptedHttpClient::new())
    } else {
        Arc::new(ReqwestHttpClient::new())
    };

    debug!(mock = cli.mock, config = ?cli.config, "building aggregator");
    Ok(Aggregator::from_config(http, config)?)
}
