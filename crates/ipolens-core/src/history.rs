//! Rolling grey-market premium history.
//!
//! Every successful provider fetch is folded in, keeping one entry per
//! company, provider and day. Entries older than the window are dropped.
//! With a [`SnapshotDisk`] the history survives restarts as `gmp_history.json`.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use time::Duration as DateDuration;
use tracing::warn;

use crate::cache::SnapshotDisk;
use crate::{CompanyKey, GmpQuote, SourceId, UtcDateTime};

const DOCUMENT: &str = "gmp_history";

/// One provider's premium for a company on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub company_key: CompanyKey,
    pub company_name: String,
    pub source: SourceId,
    pub premium: i64,
    pub observed_at: UtcDateTime,
}

impl HistoryEntry {
    fn from_quote(quote: &GmpQuote) -> Self {
        Self {
            company_key: quote.matched_company_key.clone(),
            company_name: quote.company_name.clone(),
            source: quote.source_id,
            premium: quote.premium_amount,
            observed_at: quote.observed_at,
        }
    }

    fn same_day(&self, other: &Self) -> bool {
        self.company_key == other.company_key
            && self.source == other.source
            && self.observed_at.date() == other.observed_at.date()
    }
}

#[derive(Debug, Clone)]
pub struct GmpHistory {
    window_days: u32,
    disk: Option<SnapshotDisk>,
    entries: Arc<Mutex<Vec<HistoryEntry>>>,
}

impl GmpHistory {
    pub fn new(window_days: u32) -> Self {
        Self {
            window_days,
            disk: None,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Loads any persisted history from `disk` and writes back on every record.
    pub fn with_disk(window_days: u32, disk: SnapshotDisk) -> Self {
        let entries = match disk.read::<Vec<HistoryEntry>>(DOCUMENT) {
            Ok(entries) => entries.unwrap_or_default(),
            Err(error) => {
                warn!("ignoring persisted premium history: {error}");
                Vec::new()
            }
        };
        let history = Self {
            window_days,
            disk: Some(disk),
            entries: Arc::new(Mutex::new(entries)),
        };
        history.prune(UtcDateTime::now());
        history
    }

    pub const fn window_days(&self) -> u32 {
        self.window_days
    }

    /// Folds `quotes` in; a later quote replaces the same company, provider and day.
    pub fn record(&self, quotes: &[GmpQuote], now: UtcDateTime) {
        if quotes.is_empty() {
            return;
        }
        {
            let mut entries = self.entries.lock().expect("history lock is not poisoned");
            for quote in quotes {
                let entry = HistoryEntry::from_quote(quote);
                match entries.iter_mut().find(|existing| existing.same_day(&entry)) {
                    Some(existing) if existing.observed_at <= entry.observed_at => *existing = entry,
                    Some(_) => {}
                    None => entries.push(entry),
                }
            }
        }
        self.prune(now);
        self.persist();
    }

    /// Entries for `key`, oldest first.
    pub fn lookup(&self, key: &CompanyKey) -> Vec<HistoryEntry> {
        let mut matched: Vec<HistoryEntry> = self
            .entries
            .lock()
            .expect("history lock is not poisoned")
            .iter()
            .filter(|entry| &entry.company_key == key)
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.observed_at
                .cmp(&b.observed_at)
                .then_with(|| a.source.cmp(&b.source))
        });
        matched
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("history lock is not poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self, now: UtcDateTime) {
        let cutoff = UtcDateTime::start_of_day(now.date() - DateDuration::days(i64::from(self.window_days)));
        self.entries
            .lock()
            .expect("history lock is not poisoned")
            .retain(|entry| entry.observed_at >= cutoff);
    }

    fn persist(&self) {
        let Some(disk) = &self.disk else {
            return;
        };
        let entries = self.entries.lock().expect("history lock is not poisoned").clone();
        if let Err(error) = disk.write(DOCUMENT, &entries) {
            warn!(entries = entries.len(), "failed to persist premium history: {error}");
        }
    }
}
