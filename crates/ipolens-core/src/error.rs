use thiserror::Error;

/// Validation and contract errors exposed by `ipolens-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter or digit: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("company name cannot be empty")]
    EmptyCompanyName,

    #[error("invalid source '{value}', expected one of nse, ipowatch, investorgain, chittorgarh")]
    InvalidSource { value: String },
    #[error("invalid category '{value}', expected one of current, upcoming, past, indices, market_status")]
    InvalidCategory { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },

    #[error("issue end date {end} precedes start date {start}")]
    InvalidIssueWindow { start: String, end: String },

    #[error("identity pool must contain at least one identity")]
    EmptyIdentityPool,
    #[error("invalid url '{value}'")]
    InvalidUrl { value: String },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
