//! # ipolens Core
//!
//! Resilient acquisition engine for Indian IPO listings, market indices and
//! grey-market premium (GMP) quotes.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Canonical domain models** for issues, indices, market status and quotes
//! - **Resilient fetch client** with identity rotation, cookie sessions,
//!   per-host rate gating, capped backoff and circuit breakers
//! - **Source adapters** for the exchange JSON API and three GMP pages
//! - **Merge engine** resolving conflicting premium quotes deterministically,
//!   with a consensus reliability score and a rolling premium history
//! - **Fallback store** serving Live, Cache or Demo data, never an error
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Exchange and grey-market adapters |
//! | [`aggregator`] | Category pipelines and lookups |
//! | [`cache`] | Snapshot store with single-flight fetches |
//! | [`circuit_breaker`] | Circuit breaker per upstream host |
//! | [`config`] | TOML and environment configuration |
//! | [`demo`] | Bundled demo datasets |
//! | [`domain`] | Domain models (Ipo, MarketIndex, GmpQuote) |
//! | [`enrich`] | GMP merge, listing gain and risk |
//! | [`error`] | Core error types |
//! | [`fetch`] | Resilient fetch loop |
//! | [`history`] | Rolling grey-market premium history |
//! | [`http_client`] | HTTP client abstraction |
//! | [`identity`] | Client identity rotation and cooldown |
//! | [`normalize`] | Text-to-canonical coercion |
//! | [`overview`] | Major index filter and market sentiment |
//! | [`quotes`] | Last-good quotes per grey-market provider |
//! | [`retry`] | Backoff schedule |
//! | [`session`] | Per-host cookie sessions |
//! | [`source`] | Source and category identifiers |
//! | [`throttling`] | Per-host rate gate |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ipolens_core::{Aggregator, Category, EngineConfig, ReqwestHttpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::load(None)?.apply_env()?;
//!     let aggregator = Aggregator::from_config(Arc::new(ReqwestHttpClient::new()), config)?;
//!
//!     let result = aggregator.ipos(Category::CurrentIpos).await?;
//!     println!("{} issues from {:?}", result.data.len(), result.origin);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / User     │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Aggregator     │────▶│ Cache Store      │
//! └────────┬────────┘     │ (Live/Cache/Demo)│
//!          │              └──────────────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Fetch Client    │────▶│ HTTP Client      │
//! │ (FetchState)    │     │ (reqwest/script) │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Source Adapters │────▶│ Normalizer       │
//! └─────────────────┘     └────────┬─────────┘
//!                                  ▼
//!                         ┌──────────────────┐
//!                         │ Enricher (GMP)   │
//!                         └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Pipeline failures are typed and carry stable codes, but the cache store
//! absorbs them and degrades the result origin instead:
//!
//! ```rust
//! use ipolens_core::{FetchError, FetchErrorKind};
//!
//! fn describe(error: &FetchError) -> &'static str {
//!     match error.kind() {
//!         FetchErrorKind::Blocked => "rotate identity and back off",
//!         FetchErrorKind::Timeout => "retry later",
//!         FetchErrorKind::Network | FetchErrorKind::Malformed => "serve last snapshot",
//!     }
//! }
//! ```

pub mod adapters;
pub mod aggregator;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod demo;
pub mod domain;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod history;
pub mod http_client;
pub mod identity;
pub mod normalize;
pub mod overview;
pub mod quotes;
pub mod retry;
pub mod session;
pub mod source;
pub mod throttling;

// Adapters
pub use adapters::{AdapterError, IntermediateRecord, SourceAdapter};

// Aggregation
pub use aggregator::{AcquireError, Aggregator, HealthReport, LookupError};

// Caching
pub use cache::{CacheMode, CacheStore, Dataset, FetchResult, Origin, SnapshotDisk, SnapshotError};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakers, CircuitState};

// Configuration
pub use config::{ConfigError, EngineConfig};

// Domain models
pub use domain::{
    CompanyKey, Confidence, GmpQuote, Ipo, IpoKey, IpoStatus, IssueSizeCrores, MarketIndex,
    MarketState, MarketStatus, PriceRange, Recommendation, RiskLevel, Symbol, UtcDateTime,
};

// Enrichment
pub use enrich::{Enricher, EnrichmentError, RecommendationReport};

// Error types
pub use error::{CoreError, ValidationError};

// Fetching
pub use fetch::{FetchClient, FetchError, FetchErrorKind, FetchState, FetchTarget, RawPayload};

// Premium history
pub use history::{GmpHistory, HistoryEntry};

// HTTP client types
pub use http_client::{
    HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient, ScriptedHttpClient,
};

// Identities
pub use identity::{ClientIdentity, IdentityPool};

// Market overview
pub use overview::{MarketOverview, Sentiment};

// Provider quotes
pub use quotes::{ProviderHealth, ProviderQuotes, QuoteBook};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Source identifiers
pub use source::{Category, SourceId};
