//! # Source Adapters
//!
//! Pure parsers from raw payloads to [`IntermediateRecord`]s. Adapters do no
//! I/O; the aggregator fetches the [`FetchTarget`] an adapter names and hands
//! the payload back for parsing.
//!
//! | Adapter | Payload | Produces |
//! |---------|---------|----------|
//! | [`SourceAdapter::NseCurrentIssues`] | JSON | [`RawIpo`] |
//! | [`SourceAdapter::NseUpcomingIssues`] | JSON | [`RawIpo`] |
//! | [`SourceAdapter::NsePastIssues`] | JSON | [`RawIpo`] |
//! | [`SourceAdapter::NseIndices`] | JSON | [`RawIndex`] |
//! | [`SourceAdapter::NseMarketStatus`] | JSON | [`RawMarketStatus`] |
//! | [`SourceAdapter::IpoWatch`] | HTML | [`RawGmp`] |
//! | [`SourceAdapter::InvestorGain`] | HTML | [`RawGmp`] |
//! | [`SourceAdapter::Chittorgarh`] | HTML | [`RawGmp`] |

mod gmp;
mod html;
mod nse;

use std::fmt::{Display, Formatter};

use thiserror::Error;
use time::{Date, Duration as DateDuration};

use crate::config::SourceConfig;
use crate::fetch::{FetchTarget, RawPayload};
use crate::{Category, SourceId};

pub use gmp::GmpLayout;
pub use html::{extract_tables, HtmlTable};

/// Closed set of upstream parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceAdapter {
    NseCurrentIssues,
    NseUpcomingIssues,
    NsePastIssues,
    NseIndices,
    NseMarketStatus,
    IpoWatch,
    InvestorGain,
    Chittorgarh,
}

impl SourceAdapter {
    pub const GMP: [Self; 3] = [Self::IpoWatch, Self::InvestorGain, Self::Chittorgarh];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NseCurrentIssues => "nse_current_issues",
            Self::NseUpcomingIssues => "nse_upcoming_issues",
            Self::NsePastIssues => "nse_past_issues",
            Self::NseIndices => "nse_indices",
            Self::NseMarketStatus => "nse_market_status",
            Self::IpoWatch => "ipowatch",
            Self::InvestorGain => "investorgain",
            Self::Chittorgarh => "chittorgarh",
        }
    }

    pub const fn source(self) -> SourceId {
        match self {
            Self::NseCurrentIssues
            | Self::NseUpcomingIssues
            | Self::NsePastIssues
            | Self::NseIndices
            | Self::NseMarketStatus => SourceId::Nse,
            Self::IpoWatch => SourceId::IpoWatch,
            Self::InvestorGain => SourceId::InvestorGain,
            Self::Chittorgarh => SourceId::Chittorgarh,
        }
    }

    /// Exchange adapter serving `category`.
    pub const fn for_category(category: Category) -> Self {
        match category {
            Category::CurrentIpos => Self::NseCurrentIssues,
            Category::UpcomingIpos => Self::NseUpcomingIssues,
            Category::PastIpos => Self::NsePastIssues,
            Category::Indices => Self::NseIndices,
            Category::MarketStatus => Self::NseMarketStatus,
        }
    }

    pub fn for_gmp_source(source: SourceId) -> Option<Self> {
        match source {
            SourceId::IpoWatch => Some(Self::IpoWatch),
            SourceId::InvestorGain => Some(Self::InvestorGain),
            SourceId::Chittorgarh => Some(Self::Chittorgarh),
            SourceId::Nse => None,
        }
    }

    /// Endpoint this adapter parses. `today` anchors the past-issues window.
    pub fn target(self, sources: &SourceConfig, today: Date) -> FetchTarget {
        let base = sources.nse_base_url.trim_end_matches('/');
        let nse = |path: &str| {
            FetchTarget::json(format!("{base}{path}"))
                .with_session_seed(format!("{base}/"))
                .with_referer(format!("{base}/market-data/all-upcoming-issues-ipo"))
        };

        match self {
            Self::NseCurrentIssues => nse("/api/ipo-current-issue"),
            Self::NseUpcomingIssues => nse("/api/all-upcoming-issues?category=ipo"),
            Self::NsePastIssues => {
                let from = today - DateDuration::days(i64::from(sources.past_days));
                nse(&format!(
                    "/api/public-past-issues?from_date={}&to_date={}&security_type=all",
                    urlencoding::encode(&nse_query_date(from)),
                    urlencoding::encode(&nse_query_date(today))
                ))
            }
            Self::NseIndices => nse("/api/allIndices"),
            Self::NseMarketStatus => nse("/api/marketStatus"),
            Self::IpoWatch => FetchTarget::html(sources.ipowatch_url.clone()),
            Self::InvestorGain => FetchTarget::html(sources.investorgain_url.clone()),
            Self::Chittorgarh => FetchTarget::html(sources.chittorgarh_url.clone()),
        }
    }

    pub fn parse(self, payload: &RawPayload) -> Result<Vec<IntermediateRecord>, AdapterError> {
        match self {
            Self::NseCurrentIssues | Self::NseUpcomingIssues | Self::NsePastIssues => {
                nse::parse_issues(self.as_str(), &payload.body)
            }
            Self::NseIndices => nse::parse_indices(self.as_str(), &payload.body),
            Self::NseMarketStatus => nse::parse_market_status(self.as_str(), &payload.body),
            Self::IpoWatch => gmp::parse(GmpLayout::IPOWATCH, payload),
            Self::InvestorGain => gmp::parse(GmpLayout::INVESTORGAIN, payload),
            Self::Chittorgarh => gmp::parse(GmpLayout::CHITTORGARH, payload),
        }
    }
}

impl Display for SourceAdapter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exchange issue row with every value still as source text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawIpo {
    pub symbol: Option<String>,
    pub company_name: Option<String>,
    pub series: Option<String>,
    pub issue_start_date: Option<String>,
    pub issue_end_date: Option<String>,
    pub issue_price: Option<String>,
    pub issue_size: Option<String>,
    pub status: Option<String>,
    pub subscription_times: Option<String>,
    pub shares_offered: Option<String>,
    pub shares_bid: Option<String>,
    pub listing_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawIndex {
    pub name: Option<String>,
    pub last: Option<String>,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub previous_close: Option<String>,
    pub change: Option<String>,
    pub percent_change: Option<String>,
    pub year_high: Option<String>,
    pub year_low: Option<String>,
    pub as_of: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawMarketStatus {
    pub market: Option<String>,
    pub status: Option<String>,
    pub trade_date: Option<String>,
    pub index: Option<String>,
    pub last: Option<String>,
    pub change: Option<String>,
    pub percent_change: Option<String>,
    pub message: Option<String>,
}

/// Grey-market table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawGmp {
    pub source: SourceId,
    pub company_name: String,
    pub premium: String,
    pub price: Option<String>,
    pub gain: Option<String>,
    pub updated_on: Option<String>,
}

/// Source-shaped record awaiting normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntermediateRecord {
    Ipo(RawIpo),
    Index(RawIndex),
    MarketStatus(RawMarketStatus),
    Gmp(RawGmp),
}

/// Parse failures. `PartialParse` still carries every row that did parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("{adapter}: schema changed: {detail}")]
    SchemaChanged {
        adapter: &'static str,
        detail: String,
    },
    #[error("{adapter}: payload contained no records")]
    Empty { adapter: &'static str },
    #[error("{adapter}: parsed {} of {total} rows", .records.len())]
    PartialParse {
        adapter: &'static str,
        records: Vec<IntermediateRecord>,
        total: usize,
    },
}

impl AdapterError {
    pub fn schema_changed(adapter: &'static str, detail: impl Into<String>) -> Self {
        Self::SchemaChanged {
            adapter,
            detail: detail.into(),
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::SchemaChanged { .. } => "adapter.schema_changed",
            Self::Empty { .. } => "adapter.empty",
            Self::PartialParse { .. } => "adapter.partial_parse",
        }
    }

    /// Accepts a partial parse as a smaller valid dataset.
    pub fn salvage(
        result: Result<Vec<IntermediateRecord>, Self>,
    ) -> Result<Vec<IntermediateRecord>, Self> {
        match result {
            Err(Self::PartialParse { records, .. }) => Ok(records),
            other => other,
        }
    }
}

/// Builds the adapter result from parsed rows and the count of rows seen.
pub(crate) fn finish(
    adapter: &'static str,
    records: Vec<IntermediateRecord>,
    total: usize,
) -> Result<Vec<IntermediateRecord>, AdapterError> {
    if total == 0 {
        return Err(AdapterError::Empty { adapter });
    }
    if records.is_empty() {
        return Err(AdapterError::schema_changed(
            adapter,
            format!("none of {total} rows matched the expected shape"),
        ));
    }
    if records.len() < total {
        return Err(AdapterError::PartialParse {
            adapter,
            records,
            total,
        });
    }
    Ok(records)
}

fn nse_query_date(date: Date) -> String {
    format!(
        "{:02}-{:02}-{}",
        date.day(),
        u8::from(date.month()),
        date.year()
    )
}
