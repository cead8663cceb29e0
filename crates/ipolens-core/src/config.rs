//! Engine configuration: TOML file, then `IPOLENS_*` environment overrides.
//!
//! ```toml
//! [fetch]
//! max_retries = 3
//! rate_limit_delay_ms = 2000
//!
//! [cache]
//! ttl_secs = 300
//! snapshot_dir = "/var/lib/ipolens"
//!
//! [gmp]
//! source_priority = ["ipowatch", "investorgain", "chittorgarh"]
//! history_days = 90
//! ```

use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CacheStore, SnapshotDisk};
use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakers};
use crate::enrich::Enricher;
use crate::fetch::{FetchSettings, FetchState, DEFAULT_BLOCK_SIGNATURES};
use crate::history::GmpHistory;
use crate::identity::{IdentityPool, DEFAULT_USER_AGENTS};
use crate::quotes::QuoteBook;
use crate::retry::{Backoff, RetryConfig};
use crate::session::SessionTable;
use crate::throttling::HostGate;
use crate::{SourceId, ValidationError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidEnv { name: &'static str, value: String },
    #[error("fetch.max_retries must be at least 1")]
    ZeroRetries,
    #[error("gmp.source_priority lists '{provider}' more than once")]
    DuplicatePrioritySource { provider: SourceId },
    #[error("gmp.source_priority lists '{provider}', which is not a grey-market provider")]
    NonGmpPrioritySource { provider: SourceId },
    #[error("sources.past_days must be at least 1")]
    EmptyPastWindow,
    #[error("gmp.history_days must be at least 1")]
    EmptyHistoryWindow,
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Upstream endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub nse_base_url: String,
    pub ipowatch_url: String,
    pub investorgain_url: String,
    pub chittorgarh_url: String,
    /// Days covered by the past-issues query, ending today.
    pub past_days: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            nse_base_url: String::from("https://www.nseindia.com"),
            ipowatch_url: String::from("https://ipowatch.in/ipo-grey-market-premium-latest-ipo-gmp/"),
            investorgain_url: String::from("https://www.investorgain.com/report/live-ipo-gmp/331/"),
            chittorgarh_url: String::from(
                "https://www.chittorgarh.com/report/ipo-grey-market-premium-gmp-latest/57/",
            ),
            past_days: 30,
        }
    }
}

impl SourceConfig {
    fn urls(&self) -> [&str; 4] {
        [
            &self.nse_base_url,
            &self.ipowatch_url,
            &self.investorgain_url,
            &self.chittorgarh_url,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    /// Total attempts per fetch, including the first.
    pub max_retries: u32,
    pub rate_limit_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub identity_cooldown_secs: u64,
    pub session_ttl_secs: u64,
    pub block_signatures: Vec<String>,
    pub user_agents: Vec<String>,
    pub circuit_failure_threshold: u32,
    pub circuit_open_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter: true,
            max_retries: 3,
            rate_limit_delay_ms: 2_000,
            request_timeout_ms: 10_000,
            identity_cooldown_secs: 300,
            session_ttl_secs: 600,
            block_signatures: DEFAULT_BLOCK_SIGNATURES.iter().map(|s| (*s).to_owned()).collect(),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| (*s).to_owned()).collect(),
            circuit_failure_threshold: 5,
            circuit_open_timeout_secs: 60,
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_retries,
            Backoff {
                base: Duration::from_millis(self.base_delay_ms),
                max: Duration::from_millis(self.max_delay_ms),
                jitter: self.jitter,
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Zero disables fresh-snapshot reuse; every call fetches.
    pub ttl_secs: u64,
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            snapshot_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmpConfig {
    /// Tie-break order for quotes observed at the same instant.
    pub source_priority: Vec<SourceId>,
    /// Days of premium history kept per company.
    pub history_days: u32,
}

impl Default for GmpConfig {
    fn default() -> Self {
        Self {
            source_priority: SourceId::GMP.to_vec(),
            history_days: 90,
        }
    }
}

/// Complete engine configuration; every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    pub gmp: GmpConfig,
    pub sources: SourceConfig,
}

impl EngineConfig {
    /// Reads `path` when given, otherwise starts from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Overrides fields from `IPOLENS_*` environment variables.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|name| env::var(name).ok())
    }

    pub fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(value) = parsed(&lookup, "IPOLENS_MAX_RETRIES")? {
            self.fetch.max_retries = value;
        }
        if let Some(value) = parsed(&lookup, "IPOLENS_RATE_LIMIT_DELAY_MS")? {
            self.fetch.rate_limit_delay_ms = value;
        }
        if let Some(value) = parsed(&lookup, "IPOLENS_REQUEST_TIMEOUT_MS")? {
            self.fetch.request_timeout_ms = value;
        }
        if let Some(value) = parsed(&lookup, "IPOLENS_CACHE_TTL_SECS")? {
            self.cache.ttl_secs = value;
        }
        if let Some(dir) = lookup("IPOLENS_SNAPSHOT_DIR").filter(|dir| !dir.trim().is_empty()) {
            self.cache.snapshot_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup("IPOLENS_NSE_BASE_URL") {
            self.sources.nse_base_url = url;
        }
        if let Some(value) = lookup("IPOLENS_GMP_PRIORITY") {
            self.gmp.source_priority = value
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(SourceId::from_str)
                .collect::<Result<_, _>>()
                .map_err(|_| ConfigError::InvalidEnv {
                    name: "IPOLENS_GMP_PRIORITY",
                    value: value.clone(),
                })?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        if self.fetch.user_agents.iter().all(|agent| agent.trim().is_empty()) {
            return Err(ValidationError::EmptyIdentityPool.into());
        }
        if self.sources.past_days == 0 {
            return Err(ConfigError::EmptyPastWindow);
        }
        if self.gmp.history_days == 0 {
            return Err(ConfigError::EmptyHistoryWindow);
        }

        let mut seen = BTreeSet::new();
        for provider in &self.gmp.source_priority {
            if !provider.is_gmp() {
                return Err(ConfigError::NonGmpPrioritySource { provider: *provider });
            }
            if !seen.insert(*provider) {
                return Err(ConfigError::DuplicatePrioritySource { provider: *provider });
            }
        }

        for url in self.sources.urls() {
            reqwest::Url::parse(url).map_err(|_| ValidationError::InvalidUrl {
                value: url.to_owned(),
            })?;
        }
        Ok(())
    }

    pub fn fetch_state(&self) -> Result<FetchState, ConfigError> {
        let fetch = &self.fetch;
        let identities = IdentityPool::from_user_agents(
            fetch.user_agents.iter().filter(|agent| !agent.trim().is_empty()),
            Duration::from_secs(fetch.identity_cooldown_secs),
        )?;
        Ok(FetchState::new(
            SessionTable::new(Duration::from_secs(fetch.session_ttl_secs)),
            identities,
            HostGate::new(Duration::from_millis(fetch.rate_limit_delay_ms)),
            CircuitBreakers::new(CircuitBreakerConfig {
                failure_threshold: fetch.circuit_failure_threshold,
                open_timeout: Duration::from_secs(fetch.circuit_open_timeout_secs),
            }),
        ))
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            retry: self.fetch.retry(),
            block_signatures: self.fetch.block_signatures.clone(),
        }
    }

    pub fn cache_store(&self) -> CacheStore {
        let ttl = Duration::from_secs(self.cache.ttl_secs);
        match &self.cache.snapshot_dir {
            Some(dir) => CacheStore::with_disk(ttl, SnapshotDisk::new(dir)),
            None => CacheStore::new(ttl),
        }
    }

    /// Per-provider quote slots share the category ttl.
    pub fn quote_book(&self) -> QuoteBook {
        QuoteBook::new(Duration::from_secs(self.cache.ttl_secs))
    }

    pub fn gmp_history(&self) -> GmpHistory {
        match &self.cache.snapshot_dir {
            Some(dir) => GmpHistory::with_disk(self.gmp.history_days, SnapshotDisk::new(dir)),
            None => GmpHistory::new(self.gmp.history_days),
        }
    }

    pub fn enricher(&self) -> Enricher {
        Enricher::new(self.gmp.source_priority.clone())
    }

    pub fn shared_state(&self) -> Result<Arc<FetchState>, ConfigError> {
        self.fetch_state().map(Arc::new)
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidEnv { name, value })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [fetch]
            max_retries = 5

            [gmp]
            source_priority = ["chittorgarh", "ipowatch"]
            "#,
        )
        .expect("config");

        assert_eq!(config.fetch.max_retries, 5);
        assert_eq!(config.fetch.rate_limit_delay_ms, 2_000);
        assert_eq!(
            config.gmp.source_priority,
            vec![SourceId::Chittorgarh, SourceId::IpoWatch]
        );
        assert_eq!(config.sources.past_days, 30);
        assert_eq!(config.gmp.history_days, 90);
        config.validate().expect("valid");
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ipolens.toml");
        std::fs::write(&path, "[cache]\nttl_secs = 0\n").expect("write");

        let config = EngineConfig::load(Some(&path)).expect("load");
        assert_eq!(config.cache.ttl_secs, 0);
        assert!(EngineConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("IPOLENS_MAX_RETRIES", "2"),
            ("IPOLENS_CACHE_TTL_SECS", "15"),
            ("IPOLENS_GMP_PRIORITY", "investorgain, ipowatch"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::default()
            .apply_vars(|name| vars.get(name).map(|value| (*value).to_owned()))
            .expect("env");
        assert_eq!(config.fetch.max_retries, 2);
        assert_eq!(config.cache.ttl_secs, 15);
        assert_eq!(
            config.gmp.source_priority,
            vec![SourceId::InvestorGain, SourceId::IpoWatch]
        );
    }

    #[test]
    fn invalid_env_value_is_reported() {
        let err = EngineConfig::default()
            .apply_vars(|name| (name == "IPOLENS_MAX_RETRIES").then(|| String::from("many")))
            .expect_err("invalid");
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: "IPOLENS_MAX_RETRIES",
                ..
            }
        ));
    }

    #[test]
    fn validate_rejects_bad_settings() {
        let mut config = EngineConfig::default();
        config.fetch.max_retries = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroRetries)));

        let mut config = EngineConfig::default();
        config.fetch.user_agents.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(ValidationError::EmptyIdentityPool))
        ));

        let mut config = EngineConfig::default();
        config.gmp.source_priority = vec![SourceId::IpoWatch, SourceId::IpoWatch];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicatePrioritySource { .. })
        ));

        let mut config = EngineConfig::default();
        config.gmp.history_days = 0;
        assert!(matches!(config.validate(), Err(ConfigError::EmptyHistoryWindow)));

        let mut config = EngineConfig::default();
        config.gmp.source_priority = vec![SourceId::Nse];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonGmpPrioritySource { .. })
        ));

        let mut config = EngineConfig::default();
        config.sources.ipowatch_url = String::from("not a url");
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }
}
