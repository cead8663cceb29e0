use serde::{Deserialize, Serialize};

use crate::domain::round1;
use crate::MarketIndex;

pub const MAJOR_INDICES: [&str; 10] = [
    "NIFTY 50",
    "NIFTY BANK",
    "NIFTY IT",
    "NIFTY FMCG",
    "NIFTY AUTO",
    "NIFTY MIDCAP 100",
    "NIFTY SMLCAP 100",
    "NIFTY PHARMA",
    "NIFTY REALTY",
    "NIFTY METAL",
];

const POSITIVE_ABOVE: f64 = 60.0;
const NEGATIVE_BELOW: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Major indices with the share of them trading up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOverview {
    pub indices: Vec<MarketIndex>,
    pub sentiment: Sentiment,
    /// Percentage of major indices with a positive change; 50 when none.
    pub sentiment_score: f64,
    pub advancing: usize,
    pub declining: usize,
}

impl MarketOverview {
    pub fn from_indices(indices: Vec<MarketIndex>) -> Self {
        let indices: Vec<MarketIndex> = indices
            .into_iter()
            .filter(|index| MAJOR_INDICES.contains(&index.name.as_str()))
            .collect();

        let change = |index: &MarketIndex| index.percent_change.unwrap_or(0.0);
        let advancing = indices.iter().filter(|index| change(index) > 0.0).count();
        let declining = indices.iter().filter(|index| change(index) < 0.0).count();

        let score = if indices.is_empty() {
            50.0
        } else {
            advancing as f64 / indices.len() as f64 * 100.0
        };
        let sentiment = if score > POSITIVE_ABOVE {
            Sentiment::Positive
        } else if score < NEGATIVE_BELOW {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        };

        Self {
            indices,
            sentiment,
            sentiment_score: round1(score),
            advancing,
            declining,
        }
    }
}
