//! Last-good snapshot store with single-flight fetches and demo fallback.
//!
//! Each [`Category`] owns one slot moving through
//! `Cold -> Live -> (Live | Cache)`; a failure while `Cold` serves demo data.
//! There is no background refresh: every call attempts at most one fetch, and
//! concurrent callers for the same category share a single in-flight attempt.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{demo, Category, Ipo, MarketIndex, MarketStatus, UtcDateTime};

/// Defines how a call may use a stored snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Serve a Live snapshot younger than the ttl without fetching. (Default)
    #[default]
    Use,
    /// Always attempt one fetch.
    Refresh,
}

/// Where a served payload came from, ordered from freshest to least fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Live,
    Cache,
    Demo,
}

impl Origin {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Cache => "cache",
            Self::Demo => "demo",
        }
    }
}

/// Records served for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum Dataset {
    Ipos(Vec<Ipo>),
    Indices(Vec<MarketIndex>),
    MarketStatus(Vec<MarketStatus>),
}

impl Dataset {
    pub fn len(&self) -> usize {
        match self {
            Self::Ipos(records) => records.len(),
            Self::Indices(records) => records.len(),
            Self::MarketStatus(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_ipos(self) -> Vec<Ipo> {
        match self {
            Self::Ipos(records) => records,
            Self::Indices(_) | Self::MarketStatus(_) => Vec::new(),
        }
    }

    pub fn into_indices(self) -> Vec<MarketIndex> {
        match self {
            Self::Indices(records) => records,
            Self::Ipos(_) | Self::MarketStatus(_) => Vec::new(),
        }
    }

    pub fn into_market_status(self) -> Vec<MarketStatus> {
        match self {
            Self::MarketStatus(records) => records,
            Self::Ipos(_) | Self::Indices(_) => Vec::new(),
        }
    }
}

/// Payload handed to callers. Every result carries exactly one origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult<T> {
    pub data: T,
    pub origin: Origin,
    pub fetched_at: UtcDateTime,
    pub staleness_seconds: u64,
}

impl<T> FetchResult<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchResult<U> {
        FetchResult {
            data: f(self.data),
            origin: self.origin,
            fetched_at: self.fetched_at,
            staleness_seconds: self.staleness_seconds,
        }
    }
}

impl<T> FetchResult<Vec<T>> {
    /// Concatenates `results` in order. The merged result reports the least
    /// fresh origin, the oldest fetch time and the largest staleness.
    pub fn merge(results: Vec<FetchResult<Vec<T>>>) -> Option<Self> {
        let mut results = results.into_iter();
        let mut merged = results.next()?;
        for result in results {
            merged.origin = merged.origin.max(result.origin);
            merged.fetched_at = merged.fetched_at.min(result.fetched_at);
            merged.staleness_seconds = merged.staleness_seconds.max(result.staleness_seconds);
            merged.data.extend(result.data);
        }
        Some(merged)
    }
}

/// Last successful dataset of a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub category: Category,
    pub fetched_at: UtcDateTime,
    pub data: Dataset,
    /// `false` for snapshots reloaded from disk; those only back failures.
    #[serde(skip)]
    pub live: bool,
}

impl Snapshot {
    fn age_seconds(&self, now: UtcDateTime) -> u64 {
        self.fetched_at.seconds_until(now)
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot at '{path}' is not valid: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// JSON files under one directory: a snapshot per category plus named
/// documents such as the premium history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDisk {
    dir: PathBuf,
}

impl SnapshotDisk {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, category: Category) -> PathBuf {
        self.document(category.as_str())
    }

    pub fn document(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        self.write(snapshot.category.as_str(), snapshot)
    }

    /// `Ok(None)` when no snapshot was ever written for `category`.
    pub fn load(&self, category: Category) -> Result<Option<Snapshot>, SnapshotError> {
        Ok(self.read::<Snapshot>(category.as_str())?.map(|mut snapshot| {
            snapshot.category = category;
            snapshot.live = false;
            snapshot
        }))
    }

    /// Writes `name` through a staging file so readers never see half a document.
    pub fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<(), SnapshotError> {
        let path = self.document(name);
        std::fs::create_dir_all(&self.dir).map_err(|source| SnapshotError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let bytes = serde_json::to_vec_pretty(value).map_err(|source| {
            SnapshotError::Serialization {
                path: path.clone(),
                source,
            }
        })?;

        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, bytes).map_err(|source| SnapshotError::Io {
            path: staging.clone(),
            source,
        })?;
        std::fs::rename(&staging, &path).map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })
    }

    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, SnapshotError> {
        let path = self.document(name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SnapshotError::Io { path, source }),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| SnapshotError::Serialization { path, source })
    }
}

/// Health of one category slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryHealth {
    pub category: Category,
    /// Origin of the last served result; `None` while never requested.
    pub origin: Option<Origin>,
    pub staleness_seconds: Option<u64>,
    pub records: usize,
    pub attempts: u64,
}

#[derive(Debug, Default)]
struct Slot {
    flight: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    snapshot: RwLock<Option<Snapshot>>,
    last: Mutex<Option<FetchResult<Dataset>>>,
}

impl Slot {
    fn snapshot(&self) -> Option<Snapshot> {
        self.snapshot
            .read()
            .expect("snapshot lock is not poisoned")
            .clone()
    }

    fn last(&self) -> Option<FetchResult<Dataset>> {
        self.last.lock().expect("result lock is not poisoned").clone()
    }

    /// Live snapshot younger than `ttl`, served as Live with its age.
    fn fresh(&self, ttl: Duration, now: UtcDateTime) -> Option<FetchResult<Dataset>> {
        if ttl.is_zero() {
            return None;
        }
        let snapshot = self.snapshot()?;
        let age = snapshot.age_seconds(now);
        let fresh = snapshot.live && Duration::from_secs(age) < ttl;
        fresh.then(|| FetchResult {
            data: snapshot.data,
            origin: Origin::Live,
            fetched_at: snapshot.fetched_at,
            staleness_seconds: age,
        })
    }
}

/// Thread-safe per-category snapshot store.
#[derive(Debug, Clone)]
pub struct CacheStore {
    ttl: Duration,
    disk: Option<SnapshotDisk>,
    slots: Arc<HashMap<Category, Arc<Slot>>>,
}

impl CacheStore {
    pub fn new(ttl: Duration) -> Self {
        let slots = Category::ALL
            .into_iter()
            .map(|category| (category, Arc::new(Slot::default())))
            .collect();
        Self {
            ttl,
            disk: None,
            slots: Arc::new(slots),
        }
    }

    /// Persists successful snapshots to `disk` and reloads any already there.
    pub fn with_disk(ttl: Duration, disk: SnapshotDisk) -> Self {
        let store = Self {
            disk: Some(disk),
            ..Self::new(ttl)
        };

        if let Some(disk) = &store.disk {
            for category in Category::ALL {
                match disk.load(category) {
                    Ok(Some(snapshot)) => {
                        info!(category = %category, records = snapshot.data.len(), "loaded persisted snapshot");
                        *store
                            .slot(category)
                            .snapshot
                            .write()
                            .expect("snapshot lock is not poisoned") = Some(snapshot);
                    }
                    Ok(None) => {}
                    Err(error) => warn!(category = %category, "ignoring persisted snapshot: {error}"),
                }
            }
        }

        store
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slot(&self, category: Category) -> &Slot {
        // Every category gets a slot in `new`.
        &self.slots[&category]
    }

    /// Serves `category`, attempting at most one fetch.
    ///
    /// Callers that queued behind an in-flight attempt receive that attempt's
    /// result instead of fetching again.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        category: Category,
        mode: CacheMode,
        fetch: F,
    ) -> FetchResult<Dataset>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Dataset, E>>,
        E: Display,
    {
        let slot = self.slot(category);
        if mode == CacheMode::Use {
            if let Some(fresh) = slot.fresh(self.ttl, UtcDateTime::now()) {
                debug!(category = %category, age = fresh.staleness_seconds, "serving fresh snapshot");
                return self.remember(slot, fresh);
            }
        }

        let observed = slot.generation.load(Ordering::Acquire);
        let _flight = slot.flight.lock().await;
        if slot.generation.load(Ordering::Acquire) != observed {
            if let Some(shared) = slot.last() {
                debug!(category = %category, "joined in-flight fetch");
                return shared;
            }
        }

        let result = match fetch().await {
            Ok(data) => self.store_live(category, slot, data),
            Err(error) => self.fallback(category, slot, &error),
        };

        let served = self.remember(slot, result);
        slot.generation.fetch_add(1, Ordering::AcqRel);
        served
    }

    pub fn snapshot(&self, category: Category) -> Option<Snapshot> {
        self.slot(category).snapshot()
    }

    pub fn health(&self) -> Vec<CategoryHealth> {
        let now = UtcDateTime::now();
        Category::ALL
            .into_iter()
            .map(|category| {
                let slot = self.slot(category);
                let last = slot.last();
                let snapshot = slot.snapshot();
                CategoryHealth {
                    category,
                    origin: last.as_ref().map(|result| result.origin),
                    staleness_seconds: snapshot.as_ref().map(|snapshot| snapshot.age_seconds(now)),
                    records: last.as_ref().map_or(0, |result| result.data.len()),
                    attempts: slot.generation.load(Ordering::Acquire),
                }
            })
            .collect()
    }

    fn store_live(&self, category: Category, slot: &Slot, data: Dataset) -> FetchResult<Dataset> {
        let snapshot = Snapshot {
            category,
            fetched_at: UtcDateTime::now(),
            data,
            live: true,
        };

        if let Some(disk) = &self.disk {
            if let Err(error) = disk.save(&snapshot) {
                warn!(category = %category, "failed to persist snapshot: {error}");
            }
        }

        info!(category = %category, records = snapshot.data.len(), origin = Origin::Live.as_str(), "snapshot updated");
        let result = FetchResult {
            data: snapshot.data.clone(),
            origin: Origin::Live,
            fetched_at: snapshot.fetched_at,
            staleness_seconds: 0,
        };
        *slot.snapshot.write().expect("snapshot lock is not poisoned") = Some(snapshot);
        result
    }

    fn fallback(&self, category: Category, slot: &Slot, error: &dyn Display) -> FetchResult<Dataset> {
        let now = UtcDateTime::now();
        match slot.snapshot() {
            Some(snapshot) => {
                let staleness = snapshot.age_seconds(now);
                warn!(
                    category = %category,
                    origin = Origin::Cache.as_str(),
                    staleness,
                    "fetch failed, serving last snapshot: {error}"
                );
                FetchResult {
                    data: snapshot.data,
                    origin: Origin::Cache,
                    fetched_at: snapshot.fetched_at,
                    staleness_seconds: staleness,
                }
            }
            None => {
                warn!(
                    category = %category,
                    origin = Origin::Demo.as_str(),
                    "fetch failed with no snapshot, serving demo data: {error}"
                );
                demo_result(category, now)
            }
        }
    }

    fn remember(&self, slot: &Slot, result: FetchResult<Dataset>) -> FetchResult<Dataset> {
        *slot.last.lock().expect("result lock is not poisoned") = Some(result.clone());
        result
    }
}

fn demo_result(category: Category, now: UtcDateTime) -> FetchResult<Dataset> {
    FetchResult {
        data: demo::dataset(category, now.date()),
        origin: Origin::Demo,
        fetched_at: now,
        staleness_seconds: 0,
    }
}
