//! Coercion of source-shaped records into canonical entities.

use once_cell::sync::Lazy;
use regex::Regex;
use time::{Date, Month};
use tracing::warn;

use crate::adapters::{
    AdapterError, IntermediateRecord, RawGmp, RawIndex, RawIpo, RawMarketStatus,
};
use crate::{
    GmpQuote, Ipo, MarketIndex, MarketState, MarketStatus, PriceRange, Symbol, UtcDateTime,
};

const ADAPTER: &str = "normalizer";

static DAY_MONTHNAME_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})[-\s/]+([A-Za-z]{3,9})\.?[-\s/,]+(\d{4})$")
        .expect("date regex is valid")
});
static MONTHNAME_DAY_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z]{3,9})\.?\s+(\d{1,2}),?\s+(\d{4})$").expect("date regex is valid")
});
static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").expect("date regex is valid"));
static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})[-/](\d{1,2})[-/](\d{4})$").expect("date regex is valid")
});
static UNSIGNED_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number regex is valid"));

/// Canonical output of one normalization pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Ipo(Ipo),
    Index(MarketIndex),
    MarketStatus(MarketStatus),
    Gmp(GmpQuote),
}

/// Normalizes a batch against one fetch cycle.
///
/// Statuses are derived against the cycle's calendar day, and undated quotes
/// are stamped with the cycle instant so that every provider fetched in the
/// same cycle quotes at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    cycle: UtcDateTime,
}

impl Normalizer {
    pub const fn new(cycle: UtcDateTime) -> Self {
        Self { cycle }
    }

    pub fn cycle(self) -> UtcDateTime {
        self.cycle
    }

    pub fn today(self) -> Date {
        self.cycle.date()
    }

    /// Rows lacking required fields are skipped; an unrecognized date format
    /// rejects the whole batch.
    pub fn normalize(self, records: Vec<IntermediateRecord>) -> Result<Vec<Entity>, AdapterError> {
        let mut entities = Vec::with_capacity(records.len());
        for record in records {
            let entity = match record {
                IntermediateRecord::Ipo(raw) => self.ipo(raw)?.map(Entity::Ipo),
                IntermediateRecord::Index(raw) => index(raw).map(Entity::Index),
                IntermediateRecord::MarketStatus(raw) => market_status(raw).map(Entity::MarketStatus),
                IntermediateRecord::Gmp(raw) => self.gmp(raw).map(Entity::Gmp),
            };
            entities.extend(entity);
        }
        Ok(entities)
    }

    fn ipo(self, raw: RawIpo) -> Result<Option<Ipo>, AdapterError> {
        let start = parse_optional_date(raw.issue_start_date.as_deref())?;
        let end = parse_optional_date(raw.issue_end_date.as_deref())?;
        let listing_date = parse_optional_date(raw.listing_date.as_deref())?;

        let Some(symbol_text) = raw.symbol.as_deref() else {
            warn!(company = ?raw.company_name, "skipping issue without symbol");
            return Ok(None);
        };
        let symbol = match Symbol::parse(symbol_text) {
            Ok(symbol) => symbol,
            Err(error) => {
                warn!(symbol = symbol_text, "skipping issue with invalid symbol: {error}");
                return Ok(None);
            }
        };
        let (Some(company_name), Some(start), Some(end)) = (raw.company_name, start, end) else {
            warn!(symbol = %symbol, "skipping issue without company name or issue dates");
            return Ok(None);
        };

        let mut ipo = match Ipo::new(symbol, company_name, start, end, self.today()) {
            Ok(ipo) => ipo,
            Err(error) => {
                warn!(symbol = symbol_text, "skipping invalid issue: {error}");
                return Ok(None);
            }
        };

        ipo.series = raw.series;
        ipo.issue_price_range = parse_price_range(raw.issue_price.as_deref());
        ipo.issue_size = raw.issue_size.as_deref().and_then(parse_number);
        ipo.subscription_times = raw.subscription_times.as_deref().and_then(parse_number);
        ipo.shares_offered = raw.shares_offered.as_deref().and_then(parse_number);
        ipo.shares_bid = raw.shares_bid.as_deref().and_then(parse_number);
        ipo.set_listing_date(listing_date, self.today());
        Ok(Some(ipo))
    }

    fn gmp(self, raw: RawGmp) -> Option<GmpQuote> {
        let Some(premium) = parse_number(&raw.premium) else {
            warn!(source = %raw.source, company = %raw.company_name, premium = %raw.premium, "skipping quote with unparsable premium");
            return None;
        };

        // A row dated before the cycle day is older than the cycle; any other
        // row is observed at the cycle instant.
        let observed_at = match raw.updated_on.as_deref().and_then(|text| parse_date(text).ok()) {
            Some(day) if day < self.today() => UtcDateTime::start_of_day(day),
            _ => self.cycle,
        };

        match GmpQuote::new(raw.company_name, round_premium(premium), observed_at, raw.source) {
            Ok(quote) => Some(quote),
            Err(error) => {
                warn!(source = %raw.source, "skipping invalid quote: {error}");
                None
            }
        }
    }
}

fn index(raw: RawIndex) -> Option<MarketIndex> {
    let mut index = MarketIndex::new(raw.name?).ok()?;
    let number = |text: Option<String>| text.as_deref().and_then(parse_number);
    index.last = number(raw.last);
    index.open = number(raw.open);
    index.high = number(raw.high);
    index.low = number(raw.low);
    index.previous_close = number(raw.previous_close);
    index.change = number(raw.change);
    index.percent_change = number(raw.percent_change);
    index.year_high = number(raw.year_high);
    index.year_low = number(raw.year_low);
    index.as_of = raw.as_of;
    Some(index)
}

fn market_status(raw: RawMarketStatus) -> Option<MarketStatus> {
    let market = raw.market?;
    let status_text = raw.status.unwrap_or_default();
    let number = |text: Option<String>| text.as_deref().and_then(parse_number);
    Some(MarketStatus {
        market,
        status: MarketState::from_text(&status_text),
        status_text,
        trade_date: raw.trade_date,
        index: raw.index,
        last: number(raw.last),
        change: number(raw.change),
        percent_change: number(raw.percent_change),
        message: raw.message,
    })
}

/// Rounds half away from zero.
pub fn round_premium(value: f64) -> i64 {
    value.round() as i64
}

/// Parses a display number such as `₹1,234.50`, `Rs. 98`, `12.5%` or `103.63x`.
/// Unparsable text yields `None`, never zero.
pub fn parse_number(text: &str) -> Option<f64> {
    let mut cleaned: String = text
        .trim()
        .replace("Rs.", "")
        .replace("Rs", "")
        .replace("rs.", "")
        .chars()
        .filter(|ch| !matches!(ch, '₹' | ',' | '%') && !ch.is_whitespace())
        .collect();
    if cleaned.ends_with(['x', 'X']) {
        cleaned.pop();
    }
    if let Some(stripped) = cleaned.strip_prefix('+') {
        cleaned = stripped.to_owned();
    }

    cleaned
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Parses `Rs.100 to Rs.110`, `100-110` or `₹120` into a band. The last
/// number is the upper bound.
pub fn parse_price_range(text: Option<&str>) -> PriceRange {
    let Some(text) = text else {
        return PriceRange::unknown();
    };
    let without_commas = text.replace(',', "");
    let numbers: Vec<f64> = UNSIGNED_NUMBER
        .find_iter(&without_commas)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect();

    match (numbers.first(), numbers.last()) {
        (Some(low), Some(high)) => PriceRange {
            low: Some(low.min(*high)),
            high: Some(low.max(*high)),
        },
        _ => PriceRange::unknown(),
    }
}

/// Parses `20-Sep-2025`, `20 Sep 2025`, `2025-09-20`, `20-09-2025` or
/// `Sep 20, 2025` (month names in any case).
pub fn parse_date(text: &str) -> Result<Date, AdapterError> {
    let trimmed = text.trim();
    let parsed = if let Some(caps) = DAY_MONTHNAME_YEAR.captures(trimmed) {
        calendar_date(&caps[3], month_from_name(&caps[2]), &caps[1])
    } else if let Some(caps) = MONTHNAME_DAY_YEAR.captures(trimmed) {
        calendar_date(&caps[3], month_from_name(&caps[1]), &caps[2])
    } else if let Some(caps) = ISO_DATE.captures(trimmed) {
        calendar_date(&caps[1], month_from_number(&caps[2]), &caps[3])
    } else if let Some(caps) = DAY_MONTH_YEAR.captures(trimmed) {
        calendar_date(&caps[3], month_from_number(&caps[2]), &caps[1])
    } else {
        None
    };

    parsed.ok_or_else(|| {
        AdapterError::schema_changed(ADAPTER, format!("unrecognized date '{trimmed}'"))
    })
}

fn parse_optional_date(text: Option<&str>) -> Result<Option<Date>, AdapterError> {
    match text.map(str::trim) {
        None | Some("") | Some("-") => Ok(None),
        Some(text) => parse_date(text).map(Some),
    }
}

fn calendar_date(year: &str, month: Option<Month>, day: &str) -> Option<Date> {
    Date::from_calendar_date(year.parse().ok()?, month?, day.parse().ok()?).ok()
}

fn month_from_name(name: &str) -> Option<Month> {
    let lowered = name.to_ascii_lowercase();
    let month = match lowered.get(..3)? {
        "jan" => Month::January,
        "feb" => Month::February,
        "mar" => Month::March,
        "apr" => Month::April,
        "may" => Month::May,
        "jun" => Month::June,
        "jul" => Month::July,
        "aug" => Month::August,
        "sep" => Month::September,
        "oct" => Month::October,
        "nov" => Month::November,
        "dec" => Month::December,
        _ => return None,
    };
    Some(month)
}

fn month_from_number(text: &str) -> Option<Month> {
    Month::try_from(text.parse::<u8>().ok()?).ok()
}
