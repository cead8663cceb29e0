use serde::{Deserialize, Serialize};
use time::Date;

use crate::{CompanyKey, SourceId, Symbol, UtcDateTime, ValidationError};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

const RUPEES_PER_CRORE: f64 = 10_000_000.0;

/// Lifecycle status of an issue, always derived from the issue dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpoStatus {
    Upcoming,
    Active,
    Closed,
    Listed,
}

impl IpoStatus {
    pub fn derive(start: Date, end: Date, listing: Option<Date>, today: Date) -> Self {
        if today < start {
            Self::Upcoming
        } else if today <= end {
            Self::Active
        } else if listing.is_some_and(|listing| listing <= today) {
            Self::Listed
        } else {
            Self::Closed
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Listed => "listed",
        }
    }
}

/// Risk bucket derived from the estimated listing gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Trust in a grey-market consensus, bucketed from its reliability score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub const fn from_score(score: u8) -> Self {
        match score {
            80.. => Self::High,
            50..=79 => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Investment call derived from risk and subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Neutral,
    Avoid,
}

impl Recommendation {
    /// Fixed decision table over risk level and subscription multiple.
    ///
    /// | risk \ subscription | >= 2.0 | [1.0, 2.0) | < 1.0 | unknown |
    /// |---|---|---|---|---|
    /// | Low | StrongBuy | Buy | Neutral | Buy |
    /// | Medium | Buy | Neutral | Neutral | Neutral |
    /// | High | Neutral | Avoid | Avoid | Avoid |
    /// | none | Neutral | Neutral | Avoid | Neutral |
    pub fn decide(risk: Option<RiskLevel>, subscription_times: Option<f64>) -> Self {
        let column = match subscription_times.filter(|value| value.is_finite()) {
            Some(times) if times >= 2.0 => 0,
            Some(times) if times >= 1.0 => 1,
            Some(_) => 2,
            None => 3,
        };

        const TABLE: [[Recommendation; 4]; 4] = [
            [
                Recommendation::StrongBuy,
                Recommendation::Buy,
                Recommendation::Neutral,
                Recommendation::Buy,
            ],
            [
                Recommendation::Buy,
                Recommendation::Neutral,
                Recommendation::Neutral,
                Recommendation::Neutral,
            ],
            [
                Recommendation::Neutral,
                Recommendation::Avoid,
                Recommendation::Avoid,
                Recommendation::Avoid,
            ],
            [
                Recommendation::Neutral,
                Recommendation::Neutral,
                Recommendation::Avoid,
                Recommendation::Neutral,
            ],
        ];

        let row = match risk {
            Some(RiskLevel::Low) => 0,
            Some(RiskLevel::Medium) => 1,
            Some(RiskLevel::High) => 2,
            None => 3,
        };

        TABLE[row][column]
    }
}

/// Issue price band in rupees. A fixed-price issue has `low == high`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceRange {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

impl PriceRange {
    pub fn new(low: Option<f64>, high: Option<f64>) -> Result<Self, ValidationError> {
        validate_optional_finite("issue_price_low", low)?;
        validate_optional_finite("issue_price_high", high)?;
        Ok(Self { low, high })
    }

    pub const fn unknown() -> Self {
        Self {
            low: None,
            high: None,
        }
    }
}

/// Issue size in crores of rupees across the price band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IssueSizeCrores {
    pub min: f64,
    pub max: f64,
}

/// Identity of an issue across fetch cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IpoKey {
    pub symbol: Symbol,
    #[serde(with = "iso_date")]
    pub issue_start_date: Date,
}

/// Canonical IPO record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ipo {
    pub symbol: Symbol,
    pub company_name: String,
    pub series: Option<String>,
    #[serde(with = "iso_date")]
    pub issue_start_date: Date,
    #[serde(with = "iso_date")]
    pub issue_end_date: Date,
    pub issue_price_range: PriceRange,
    pub issue_size: Option<f64>,
    pub status: IpoStatus,
    pub subscription_times: Option<f64>,
    pub shares_offered: Option<f64>,
    pub shares_bid: Option<f64>,
    #[serde(with = "iso_date::option", default)]
    pub listing_date: Option<Date>,
    pub gmp: Option<i64>,
    pub gmp_source: Option<SourceId>,
    #[serde(default)]
    pub gmp_source_count: u32,
    /// Mean of the latest premium from each provider that quoted the issue.
    #[serde(default)]
    pub gmp_consensus: Option<f64>,
    #[serde(default)]
    pub gmp_reliability: Option<u8>,
    #[serde(default)]
    pub gmp_confidence: Option<Confidence>,
    pub estimated_listing_gain: Option<f64>,
    pub risk_level: Option<RiskLevel>,
}

impl Ipo {
    /// Builds an unenriched record with status derived against `today`.
    pub fn new(
        symbol: Symbol,
        company_name: impl Into<String>,
        issue_start_date: Date,
        issue_end_date: Date,
        today: Date,
    ) -> Result<Self, ValidationError> {
        let company_name = company_name.into().trim().to_owned();
        if company_name.is_empty() {
            return Err(ValidationError::EmptyCompanyName);
        }

        if issue_end_date < issue_start_date {
            return Err(ValidationError::InvalidIssueWindow {
                start: issue_start_date.to_string(),
                end: issue_end_date.to_string(),
            });
        }

        Ok(Self {
            symbol,
            company_name,
            series: None,
            issue_start_date,
            issue_end_date,
            issue_price_range: PriceRange::unknown(),
            issue_size: None,
            status: IpoStatus::derive(issue_start_date, issue_end_date, None, today),
            subscription_times: None,
            shares_offered: None,
            shares_bid: None,
            listing_date: None,
            gmp: None,
            gmp_source: None,
            gmp_source_count: 0,
            gmp_consensus: None,
            gmp_reliability: None,
            gmp_confidence: None,
            estimated_listing_gain: None,
            risk_level: None,
        })
    }

    pub fn key(&self) -> IpoKey {
        IpoKey {
            symbol: self.symbol.clone(),
            issue_start_date: self.issue_start_date,
        }
    }

    pub fn company_key(&self) -> Result<CompanyKey, ValidationError> {
        CompanyKey::parse(&self.company_name)
    }

    pub fn set_listing_date(&mut self, listing_date: Option<Date>, today: Date) {
        self.listing_date = listing_date;
        self.status = IpoStatus::derive(
            self.issue_start_date,
            self.issue_end_date,
            listing_date,
            today,
        );
    }

    pub fn recommendation(&self) -> Recommendation {
        Recommendation::decide(self.risk_level, self.subscription_times)
    }

    /// `shares_offered * price / 1e7` across the price band, rounded to two decimals.
    pub fn issue_size_crores(&self) -> Option<IssueSizeCrores> {
        let shares = self.shares_offered.filter(|shares| *shares > 0.0)?;
        let high = self.issue_price_range.high?;
        let low = self.issue_price_range.low.unwrap_or(high);
        Some(IssueSizeCrores {
            min: round2(shares * low / RUPEES_PER_CRORE),
            max: round2(shares * high / RUPEES_PER_CRORE),
        })
    }
}

/// Exchange index snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketIndex {
    pub name: String,
    pub last: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub previous_close: Option<f64>,
    pub change: Option<f64>,
    pub percent_change: Option<f64>,
    pub year_high: Option<f64>,
    pub year_low: Option<f64>,
    pub as_of: Option<String>,
}

impl MarketIndex {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(ValidationError::EmptyCompanyName);
        }
        Ok(Self {
            name,
            last: None,
            open: None,
            high: None,
            low: None,
            previous_close: None,
            change: None,
            percent_change: None,
            year_high: None,
            year_low: None,
            as_of: None,
        })
    }
}

/// Coarse trading state parsed from free-form exchange text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketState {
    Open,
    Closed,
    Other,
}

impl MarketState {
    pub fn from_text(text: &str) -> Self {
        let lowered = text.trim().to_ascii_lowercase();
        if lowered.contains("close") {
            Self::Closed
        } else if lowered.contains("open") {
            Self::Open
        } else {
            Self::Other
        }
    }
}

/// Trading status of one exchange segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStatus {
    pub market: String,
    pub status: MarketState,
    pub status_text: String,
    pub trade_date: Option<String>,
    pub index: Option<String>,
    pub last: Option<f64>,
    pub change: Option<f64>,
    pub percent_change: Option<f64>,
    pub message: Option<String>,
}

/// Grey-market premium quoted by one provider for one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmpQuote {
    pub matched_company_key: CompanyKey,
    pub company_name: String,
    pub premium_amount: i64,
    pub observed_at: UtcDateTime,
    pub source_id: SourceId,
}

impl GmpQuote {
    pub fn new(
        company_name: impl Into<String>,
        premium_amount: i64,
        observed_at: UtcDateTime,
        source_id: SourceId,
    ) -> Result<Self, ValidationError> {
        if !source_id.is_gmp() {
            return Err(ValidationError::InvalidSource {
                value: source_id.to_string(),
            });
        }

        let company_name = company_name.into().trim().to_owned();
        let matched_company_key = CompanyKey::parse(&company_name)?;
        Ok(Self {
            matched_company_key,
            company_name,
            premium_amount,
            observed_at,
            source_id,
        })
    }
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn validate_optional_finite(field: &'static str, value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(value) if !value.is_finite() => Err(ValidationError::NonFiniteValue { field }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    fn ipo(today: Date) -> Ipo {
        Ipo::new(
            Symbol::parse("DEMO").expect("symbol"),
            "Demo Energy Ltd",
            date!(2025 - 09 - 18),
            date!(2025 - 09 - 22),
            today,
        )
        .expect("valid ipo")
    }

    #[test]
    fn status_follows_issue_window() {
        assert_eq!(ipo(date!(2025 - 09 - 17)).status, IpoStatus::Upcoming);
        assert_eq!(ipo(date!(2025 - 09 - 18)).status, IpoStatus::Active);
        assert_eq!(ipo(date!(2025 - 09 - 22)).status, IpoStatus::Active);
        assert_eq!(ipo(date!(2025 - 09 - 23)).status, IpoStatus::Closed);
    }

    #[test]
    fn listing_date_refines_closed_to_listed() {
        let today = date!(2025 - 09 - 26);
        let mut record = ipo(today);
        record.set_listing_date(Some(date!(2025 - 09 - 25)), today);
        assert_eq!(record.status, IpoStatus::Listed);

        record.set_listing_date(Some(date!(2025 - 09 - 29)), today);
        assert_eq!(record.status, IpoStatus::Closed);
    }

    #[test]
    fn rejects_inverted_issue_window() {
        let err = Ipo::new(
            Symbol::parse("DEMO").expect("symbol"),
            "Demo",
            date!(2025 - 09 - 22),
            date!(2025 - 09 - 18),
            date!(2025 - 09 - 20),
        )
        .expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidIssueWindow { .. }));
    }

    #[test]
    fn issue_size_in_crores_spans_price_band() {
        let mut record = ipo(date!(2025 - 09 - 20));
        record.shares_offered = Some(10_000_000.0);
        record.issue_price_range = PriceRange::new(Some(100.0), Some(110.0)).expect("range");

        let size = record.issue_size_crores().expect("size");
        assert_eq!(size.min, 100.0);
        assert_eq!(size.max, 110.0);
    }

    #[test]
    fn decision_table_corners() {
        assert_eq!(
            Recommendation::decide(Some(RiskLevel::Low), Some(3.5)),
            Recommendation::StrongBuy
        );
        assert_eq!(
            Recommendation::decide(Some(RiskLevel::High), Some(1.2)),
            Recommendation::Avoid
        );
        assert_eq!(Recommendation::decide(None, Some(0.4)), Recommendation::Avoid);
        assert_eq!(Recommendation::decide(None, None), Recommendation::Neutral);
        assert_eq!(
            Recommendation::decide(Some(RiskLevel::Medium), Some(2.0)),
            Recommendation::Buy
        );
    }

    #[test]
    fn market_state_prefers_closed_over_open() {
        assert_eq!(MarketState::from_text("Closed"), MarketState::Closed);
        assert_eq!(MarketState::from_text("Open"), MarketState::Open);
        assert_eq!(MarketState::from_text("Close Open"), MarketState::Closed);
        assert_eq!(MarketState::from_text("Pre-open"), MarketState::Open);
        assert_eq!(MarketState::from_text(""), MarketState::Other);
    }

    #[test]
    fn ipo_dates_serialize_as_iso() {
        let record = ipo(date!(2025 - 09 - 20));
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["issue_start_date"], "2025-09-18");
        assert_eq!(json["status"], "active");
        assert!(json["listing_date"].is_null());
    }
}
