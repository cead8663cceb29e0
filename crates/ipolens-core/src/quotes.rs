//! Last-good grey-market quotes per provider.
//!
//! Each provider owns one slot with the same single-flight discipline as the
//! category store: concurrent callers share one in-flight fetch, a fresh slot
//! is reused within the ttl, and a failed fetch falls back to the provider's
//! last good quotes.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::CacheMode;
use crate::{GmpQuote, SourceId, UtcDateTime};

/// Quotes from one successful provider fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderQuotes {
    pub source: SourceId,
    pub fetched_at: UtcDateTime,
    pub quotes: Vec<GmpQuote>,
}

/// Health of one provider slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderHealth {
    pub source: SourceId,
    pub quotes: usize,
    /// Age of the last good quotes; `None` until a fetch succeeds.
    pub staleness_seconds: Option<u64>,
    pub attempts: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct QuoteSlot {
    flight: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    failures: AtomicU64,
    good: RwLock<Option<ProviderQuotes>>,
    served: Mutex<Option<Vec<GmpQuote>>>,
}

impl QuoteSlot {
    fn good(&self) -> Option<ProviderQuotes> {
        self.good.read().expect("quote lock is not poisoned").clone()
    }

    fn serve(&self, quotes: Vec<GmpQuote>) -> Vec<GmpQuote> {
        *self.served.lock().expect("served lock is not poisoned") = Some(quotes.clone());
        quotes
    }
}

#[derive(Debug, Clone)]
pub struct QuoteBook {
    ttl: Duration,
    slots: Arc<HashMap<SourceId, Arc<QuoteSlot>>>,
}

impl QuoteBook {
    pub fn new(ttl: Duration) -> Self {
        let slots = SourceId::GMP
            .into_iter()
            .map(|source| (source, Arc::new(QuoteSlot::default())))
            .collect();
        Self {
            ttl,
            slots: Arc::new(slots),
        }
    }

    /// Quotes for `source`, fetching at most once.
    ///
    /// A failed fetch serves the provider's last good quotes, or none.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        source: SourceId,
        mode: CacheMode,
        fetch: F,
    ) -> Vec<GmpQuote>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<GmpQuote>, E>>,
        E: Display,
    {
        let Some(slot) = self.slots.get(&source) else {
            return Vec::new();
        };

        if mode == CacheMode::Use && !self.ttl.is_zero() {
            if let Some(good) = slot.good() {
                let age = good.fetched_at.seconds_until(UtcDateTime::now());
                if Duration::from_secs(age) < self.ttl {
                    debug!(source = %source, age, "reusing fresh quotes");
                    return slot.serve(good.quotes);
                }
            }
        }

        let observed = slot.generation.load(Ordering::Acquire);
        let _flight = slot.flight.lock().await;
        if slot.generation.load(Ordering::Acquire) != observed {
            if let Some(shared) = slot.served.lock().expect("served lock is not poisoned").clone() {
                debug!(source = %source, "joined in-flight quote fetch");
                return shared;
            }
        }

        let quotes = match fetch().await {
            Ok(quotes) => {
                *slot.good.write().expect("quote lock is not poisoned") = Some(ProviderQuotes {
                    source,
                    fetched_at: UtcDateTime::now(),
                    quotes: quotes.clone(),
                });
                quotes
            }
            Err(error) => {
                slot.failures.fetch_add(1, Ordering::AcqRel);
                let fallback = slot.good().map(|good| good.quotes).unwrap_or_default();
                warn!(
                    source = %source,
                    fallback = fallback.len(),
                    "grey-market source failed, serving last good quotes: {error}"
                );
                fallback
            }
        };

        let served = slot.serve(quotes);
        slot.generation.fetch_add(1, Ordering::AcqRel);
        served
    }

    pub fn latest(&self, source: SourceId) -> Option<ProviderQuotes> {
        self.slots.get(&source).and_then(|slot| slot.good())
    }

    pub fn health(&self) -> Vec<ProviderHealth> {
        let now = UtcDateTime::now();
        SourceId::GMP
            .into_iter()
            .filter_map(|source| {
                let slot = self.slots.get(&source)?;
                let good = slot.good();
                Some(ProviderHealth {
                    source,
                    quotes: good.as_ref().map_or(0, |good| good.quotes.len()),
                    staleness_seconds: good.as_ref().map(|good| good.fetched_at.seconds_until(now)),
                    attempts: slot.generation.load(Ordering::Acquire),
                    failures: slot.failures.load(Ordering::Acquire),
                })
            })
            .collect()
    }
}
