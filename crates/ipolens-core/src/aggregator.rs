//! Category pipelines behind the cache store.
//!
//! ```text
//! FetchClient --> SourceAdapter::parse --> Normalizer --> Enricher --> CacheStore
//!     ^                                                   (IPO only)
//!     +-- QuoteBook: one single-flight slot per grey-market provider
//! ```
//!
//! Every public operation returns a [`FetchResult`]; pipeline failures only
//! change its `origin`.
//!
//! The IPO pipelines started by one call share a single quote round, so a
//! [`Aggregator::refresh_all`] reaches each grey-market provider once. All
//! providers in a round are normalized against the same cycle instant, which
//! makes their undated quotes tie and fall through to the source priority.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::adapters::{AdapterError, SourceAdapter};
use crate::cache::{CacheMode, CacheStore, CategoryHealth, Dataset, FetchResult};
use crate::circuit_breaker::HostHealth;
use crate::config::{ConfigError, EngineConfig};
use crate::enrich::{Enricher, EnrichmentError, RecommendationReport};
use crate::fetch::{FetchClient, FetchError};
use crate::history::{GmpHistory, HistoryEntry};
use crate::http_client::HttpClient;
use crate::normalize::{Entity, Normalizer};
use crate::overview::MarketOverview;
use crate::quotes::{ProviderHealth, QuoteBook};
use crate::{Category, CompanyKey, GmpQuote, Ipo, MarketIndex, MarketStatus, UtcDateTime};

/// Failure of one pipeline run; absorbed by the cache store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AcquireError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),
}

impl AcquireError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fetch(error) => error.code(),
            Self::Adapter(error) => error.code(),
            Self::Enrichment(error) => error.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no IPO matches '{query}'")]
    NotFound { query: String },
    #[error("category '{category}' does not hold IPOs")]
    NotIpoCategory { category: Category },
}

/// Source health across hosts, categories and grey-market providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub hosts: Vec<HostHealth>,
    pub categories: Vec<CategoryHealth>,
    pub providers: Vec<ProviderHealth>,
}

/// Grey-market quotes collected at most once for the IPO pipelines of one call.
struct QuoteRound {
    mode: CacheMode,
    quotes: OnceCell<Vec<GmpQuote>>,
}

impl QuoteRound {
    fn new(mode: CacheMode) -> Self {
        Self {
            mode,
            quotes: OnceCell::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    client: FetchClient,
    config: Arc<EngineConfig>,
    enricher: Enricher,
    cache: CacheStore,
    quotes: QuoteBook,
    history: GmpHistory,
}

impl Aggregator {
    pub fn new(client: FetchClient, config: EngineConfig) -> Self {
        Self {
            enricher: config.enricher(),
            cache: config.cache_store(),
            quotes: config.quote_book(),
            history: config.gmp_history(),
            config: Arc::new(config),
            client,
        }
    }

    /// Validates `config` and wires fetch state, retry settings and cache.
    pub fn from_config(http: Arc<dyn HttpClient>, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = FetchClient::new(http, config.shared_state()?, config.fetch_settings());
        Ok(Self::new(client, config))
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn quotes(&self) -> &QuoteBook {
        &self.quotes
    }

    pub fn history(&self) -> &GmpHistory {
        &self.history
    }

    pub fn client(&self) -> &FetchClient {
        &self.client
    }

    pub async fn get_or_fetch(&self, category: Category) -> FetchResult<Dataset> {
        self.serve(category, CacheMode::Use).await
    }

    pub async fn refresh(&self, category: Category) -> FetchResult<Dataset> {
        self.serve(category, CacheMode::Refresh).await
    }

    /// Refreshes every category concurrently with one shared quote round.
    pub async fn refresh_all(&self) -> Vec<(Category, FetchResult<Dataset>)> {
        let mode = CacheMode::Refresh;
        let round = QuoteRound::new(mode);
        let (current, upcoming, past, indices, status) = tokio::join!(
            self.serve_in(Category::CurrentIpos, mode, &round),
            self.serve_in(Category::UpcomingIpos, mode, &round),
            self.serve_in(Category::PastIpos, mode, &round),
            self.serve_in(Category::Indices, mode, &round),
            self.serve_in(Category::MarketStatus, mode, &round),
        );
        vec![
            (Category::CurrentIpos, current),
            (Category::UpcomingIpos, upcoming),
            (Category::PastIpos, past),
            (Category::Indices, indices),
            (Category::MarketStatus, status),
        ]
    }

    pub async fn ipos(&self, category: Category) -> Result<FetchResult<Vec<Ipo>>, LookupError> {
        if !category.is_ipo() {
            return Err(LookupError::NotIpoCategory { category });
        }
        Ok(self.get_or_fetch(category).await.map(Dataset::into_ipos))
    }

    pub async fn indices(&self) -> FetchResult<Vec<MarketIndex>> {
        self.get_or_fetch(Category::Indices)
            .await
            .map(Dataset::into_indices)
    }

    pub async fn market_status(&self) -> FetchResult<Vec<MarketStatus>> {
        self.get_or_fetch(Category::MarketStatus)
            .await
            .map(Dataset::into_market_status)
    }

    pub async fn market_overview(&self) -> FetchResult<MarketOverview> {
        self.indices().await.map(MarketOverview::from_indices)
    }

    /// Case-insensitive substring match on symbol or company name.
    ///
    /// Searches `category`, or every IPO category, through the cache: a fresh
    /// snapshot is reused and anything else is fetched at most once. The
    /// result carries the least fresh origin of the categories searched.
    pub async fn search(
        &self,
        query: &str,
        category: Option<Category>,
    ) -> Result<FetchResult<Vec<Ipo>>, LookupError> {
        let needle = query.trim().to_lowercase();
        let results = self
            .ipo_results(category)
            .await?
            .into_iter()
            .map(|result| {
                result.map(|ipos| {
                    ipos.into_iter()
                        .filter(|ipo| {
                            ipo.symbol.as_str().to_lowercase().contains(&needle)
                                || ipo.company_name.to_lowercase().contains(&needle)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        FetchResult::merge(results).ok_or_else(|| LookupError::NotFound {
            query: query.to_owned(),
        })
    }

    /// Finds an issue by normalized company name or exact symbol across the
    /// IPO categories, in current, upcoming, past order. The report carries
    /// the origin of the category the issue was found in.
    pub async fn recommend(&self, company: &str) -> Result<RecommendationReport, LookupError> {
        let not_found = || LookupError::NotFound {
            query: company.to_owned(),
        };
        let key = CompanyKey::parse(company).map_err(|_| not_found())?;
        let symbol = company.trim().to_uppercase();

        self.ipo_results(None)
            .await?
            .into_iter()
            .find_map(|result| {
                let origin = result.origin;
                result
                    .data
                    .into_iter()
                    .find(|ipo| {
                        ipo.symbol.as_str() == symbol
                            || ipo.company_key().is_ok_and(|candidate| candidate == key)
                    })
                    .map(|ipo| RecommendationReport::for_ipo(ipo, origin))
            })
            .ok_or_else(not_found)
    }

    /// Premium history for a company name, or for the company behind an IPO
    /// symbol in the current snapshots. Never fetches.
    pub fn gmp_history(&self, query: &str) -> Result<Vec<HistoryEntry>, LookupError> {
        let not_found = || LookupError::NotFound {
            query: query.to_owned(),
        };
        let symbol = query.trim().to_uppercase();
        let by_symbol = Category::IPO
            .into_iter()
            .filter_map(|category| self.cache.snapshot(category))
            .flat_map(|snapshot| snapshot.data.into_ipos())
            .find(|ipo| ipo.symbol.as_str() == symbol)
            .and_then(|ipo| ipo.company_key().ok());

        let key = match by_symbol {
            Some(key) => key,
            None => CompanyKey::parse(query).map_err(|_| not_found())?,
        };
        let entries = self.history.lookup(&key);
        if entries.is_empty() {
            return Err(not_found());
        }
        Ok(entries)
    }

    async fn ipo_results(
        &self,
        category: Option<Category>,
    ) -> Result<Vec<FetchResult<Vec<Ipo>>>, LookupError> {
        match category {
            Some(category) => Ok(vec![self.ipos(category).await?]),
            None => {
                let round = QuoteRound::new(CacheMode::Use);
                let (current, upcoming, past) = tokio::join!(
                    self.serve_in(Category::CurrentIpos, CacheMode::Use, &round),
                    self.serve_in(Category::UpcomingIpos, CacheMode::Use, &round),
                    self.serve_in(Category::PastIpos, CacheMode::Use, &round),
                );
                Ok([current, upcoming, past]
                    .into_iter()
                    .map(|result| result.map(Dataset::into_ipos))
                    .collect())
            }
        }
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            hosts: self.client.state().breakers.health(),
            categories: self.cache.health(),
            providers: self.quotes.health(),
        }
    }

    async fn serve(&self, category: Category, mode: CacheMode) -> FetchResult<Dataset> {
        self.serve_in(category, mode, &QuoteRound::new(mode)).await
    }

    async fn serve_in(
        &self,
        category: Category,
        mode: CacheMode,
        round: &QuoteRound,
    ) -> FetchResult<Dataset> {
        let result = self
            .cache
            .get_or_fetch(category, mode, || self.pipeline(category, round))
            .await;
        debug!(
            category = %category,
            origin = result.origin.as_str(),
            records = result.data.len(),
            "category served"
        );
        result
    }

    /// Runs the full pipeline for `category` once, refreshing every
    /// grey-market provider it needs.
    pub async fn acquire(&self, category: Category) -> Result<Dataset, AcquireError> {
        self.pipeline(category, &QuoteRound::new(CacheMode::Refresh)).await
    }

    async fn pipeline(
        &self,
        category: Category,
        round: &QuoteRound,
    ) -> Result<Dataset, AcquireError> {
        let normalizer = Normalizer::new(UtcDateTime::now());
        let adapter = SourceAdapter::for_category(category);

        let dataset = if category.is_ipo() {
            let (listing, quotes) =
                tokio::join!(self.collect(adapter, normalizer), self.gmp_quotes(round));
            let ipos = listing?
                .into_iter()
                .filter_map(|entity| match entity {
                    Entity::Ipo(ipo) => Some(ipo),
                    _ => None,
                })
                .collect();
            Dataset::Ipos(self.enricher.enrich(ipos, quotes)?)
        } else {
            let entities = self.collect(adapter, normalizer).await?;
            match category {
                Category::Indices => Dataset::Indices(
                    entities
                        .into_iter()
                        .filter_map(|entity| match entity {
                            Entity::Index(index) => Some(index),
                            _ => None,
                        })
                        .collect(),
                ),
                _ => Dataset::MarketStatus(
                    entities
                        .into_iter()
                        .filter_map(|entity| match entity {
                            Entity::MarketStatus(status) => Some(status),
                            _ => None,
                        })
                        .collect(),
                ),
            }
        };

        info!(category = %category, records = dataset.len(), "pipeline completed");
        Ok(dataset)
    }

    async fn collect(
        &self,
        adapter: SourceAdapter,
        normalizer: Normalizer,
    ) -> Result<Vec<Entity>, AcquireError> {
        let target = adapter
            .target(&self.config.sources, normalizer.today())
            .with_timeout(self.config.fetch.request_timeout());
        let payload = self.client.fetch(&target).await?;

        let parsed = adapter.parse(&payload);
        if let Err(AdapterError::PartialParse { records, total, .. }) = &parsed {
            warn!(adapter = %adapter, parsed = records.len(), total, "partial parse accepted");
        }
        let records = AdapterError::salvage(parsed)?;
        Ok(normalizer.normalize(records)?)
    }

    /// Quotes of the round, collected on first use.
    async fn gmp_quotes(&self, round: &QuoteRound) -> Vec<GmpQuote> {
        round
            .quotes
            .get_or_init(|| self.collect_round(round.mode))
            .await
            .clone()
    }

    /// One quote from every grey-market provider slot, normalized against a
    /// shared cycle instant. A failing provider contributes its last good quotes.
    async fn collect_round(&self, mode: CacheMode) -> Vec<GmpQuote> {
        let normalizer = Normalizer::new(UtcDateTime::now());
        let [first, second, third] = SourceAdapter::GMP;
        let (a, b, c) = tokio::join!(
            self.quotes
                .get_or_fetch(first.source(), mode, || self.provider_quotes(first, normalizer)),
            self.quotes
                .get_or_fetch(second.source(), mode, || self.provider_quotes(second, normalizer)),
            self.quotes
                .get_or_fetch(third.source(), mode, || self.provider_quotes(third, normalizer)),
        );

        let quotes: Vec<GmpQuote> = [a, b, c].into_iter().flatten().collect();
        debug!(quotes = quotes.len(), "quote round collected");
        quotes
    }

    async fn provider_quotes(
        &self,
        adapter: SourceAdapter,
        normalizer: Normalizer,
    ) -> Result<Vec<GmpQuote>, AcquireError> {
        let quotes: Vec<GmpQuote> = self
            .collect(adapter, normalizer)
            .await?
            .into_iter()
            .filter_map(|entity| match entity {
                Entity::Gmp(quote) => Some(quote),
                _ => None,
            })
            .collect();
        self.history.record(&quotes, normalizer.cycle());
        Ok(quotes)
    }
}
