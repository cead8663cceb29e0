use serde_json::{Map, Value};

use super::{finish, AdapterError, IntermediateRecord, RawIndex, RawIpo, RawMarketStatus};

type Row = Map<String, Value>;

// ============================================================================
// Payload shapes
// ============================================================================

/// Rows of an exchange payload: a bare array, or an object wrapping one under `key`.
fn rows<'a>(adapter: &'static str, payload: &'a Value, key: &str) -> Result<&'a Vec<Value>, AdapterError> {
    match payload {
        Value::Array(items) => Ok(items),
        Value::Object(object) => match object.get(key) {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(AdapterError::schema_changed(
                adapter,
                format!("'{key}' is not an array"),
            )),
            None => Err(AdapterError::schema_changed(
                adapter,
                format!("object payload has no '{key}' array"),
            )),
        },
        _ => Err(AdapterError::schema_changed(
            adapter,
            "payload is neither an array nor an object",
        )),
    }
}

fn decode(adapter: &'static str, body: &str) -> Result<Value, AdapterError> {
    serde_json::from_str(body)
        .map_err(|e| AdapterError::schema_changed(adapter, format!("invalid JSON: {e}")))
}

/// First present, non-blank value among `aliases`, rendered as text.
fn field(row: &Row, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|alias| match row.get(*alias)? {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty() && trimmed != "-").then(|| trimmed.to_owned())
        }
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}

fn map_rows<F>(
    adapter: &'static str,
    items: &[Value],
    build: F,
) -> Result<Vec<IntermediateRecord>, AdapterError>
where
    F: Fn(&Row) -> IntermediateRecord,
{
    let records = items
        .iter()
        .filter_map(Value::as_object)
        .map(build)
        .collect();
    finish(adapter, records, items.len())
}

// ============================================================================
// Issues
// ============================================================================

pub(super) fn parse_issues(
    adapter: &'static str,
    body: &str,
) -> Result<Vec<IntermediateRecord>, AdapterError> {
    let payload = decode(adapter, body)?;
    let items = rows(adapter, &payload, "data")?;
    map_rows(adapter, items, |row| {
        IntermediateRecord::Ipo(RawIpo {
            symbol: field(row, &["symbol"]),
            company_name: field(row, &["companyName", "company", "name"]),
            series: field(row, &["series", "securityType"]),
            issue_start_date: field(row, &["issueStartDate", "ipoStartDate", "startDate"]),
            issue_end_date: field(row, &["issueEndDate", "ipoEndDate", "endDate"]),
            issue_price: field(row, &["issuePrice", "priceRange", "priceBand"]),
            issue_size: field(row, &["issueSize"]),
            status: field(row, &["status"]),
            subscription_times: field(row, &["noOfTime", "subscriptionTimes", "noOfTotalMeant"]),
            shares_offered: field(row, &["noOfSharesOffered", "noOfShareOffered"]),
            shares_bid: field(row, &["noOfsharesBid", "noOfSharesBid"]),
            listing_date: field(row, &["listingDate", "listing_date"]),
        })
    })
}

// ============================================================================
// Indices
// ============================================================================

pub(super) fn parse_indices(
    adapter: &'static str,
    body: &str,
) -> Result<Vec<IntermediateRecord>, AdapterError> {
    let payload = decode(adapter, body)?;
    let items = rows(adapter, &payload, "data")?;
    map_rows(adapter, items, |row| {
        IntermediateRecord::Index(RawIndex {
            name: field(row, &["indexName", "index", "indexSymbol"]),
            last: field(row, &["last", "lastPrice"]),
            open: field(row, &["open"]),
            high: field(row, &["high"]),
            low: field(row, &["low"]),
            previous_close: field(row, &["previousClose", "prevClose"]),
            change: field(row, &["variation", "change"]),
            percent_change: field(row, &["percentChange", "percChange", "pChange"]),
            year_high: field(row, &["yearHigh"]),
            year_low: field(row, &["yearLow"]),
            as_of: field(row, &["timeVal", "timestamp", "tradeDate"]),
        })
    })
}

// ============================================================================
// Market status
// ============================================================================

pub(super) fn parse_market_status(
    adapter: &'static str,
    body: &str,
) -> Result<Vec<IntermediateRecord>, AdapterError> {
    let payload = decode(adapter, body)?;
    let items = rows(adapter, &payload, "marketState")?;
    map_rows(adapter, items, |row| {
        IntermediateRecord::MarketStatus(RawMarketStatus {
            market: field(row, &["market"]),
            status: field(row, &["marketStatus", "status"]),
            trade_date: field(row, &["tradeDate"]),
            index: field(row, &["index"]),
            last: field(row, &["last"]),
            change: field(row, &["variation", "change"]),
            percent_change: field(row, &["percentChange", "percChange"]),
            message: field(row, &["marketStatusMessage", "message"]),
        })
    })
}
