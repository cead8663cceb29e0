//! # Domain Models
//!
//! Canonical entities produced by the normalizer and served by the aggregator.
//!
//! ## Models
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Ipo`] | One public issue, enriched with grey-market premium signals |
//! | [`GmpQuote`] | Premium quoted by one grey-market provider |
//! | [`MarketIndex`] | Exchange index snapshot |
//! | [`MarketStatus`] | Trading state of one exchange segment |
//! | [`Symbol`] | Validated exchange ticker |
//! | [`CompanyKey`] | Normalized join key between IPOs and quotes |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! ## Invariants
//!
//! - [`Ipo::status`] is derived from the issue dates relative to the
//!   normalizer's `today`; the upstream status text is never trusted.
//! - `gmp`, `estimated_listing_gain` and `risk_level` are only ever written by
//!   the enrichment pass.
//! - Company matching is exact on [`CompanyKey`].

mod company;
mod models;
mod symbol;
mod timestamp;

pub use company::CompanyKey;
pub(crate) use models::{round1, round2};
pub use models::{
    Confidence, GmpQuote, Ipo, IpoKey, IpoStatus, IssueSizeCrores, MarketIndex, MarketState,
    MarketStatus, PriceRange, Recommendation, RiskLevel,
};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
