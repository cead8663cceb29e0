use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical upstream source identifiers used in quotes, logs and config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Nse,
    IpoWatch,
    InvestorGain,
    Chittorgarh,
}

impl SourceId {
    pub const ALL: [Self; 4] = [
        Self::Nse,
        Self::IpoWatch,
        Self::InvestorGain,
        Self::Chittorgarh,
    ];

    pub const GMP: [Self; 3] = [Self::IpoWatch, Self::InvestorGain, Self::Chittorgarh];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nse => "nse",
            Self::IpoWatch => "ipowatch",
            Self::InvestorGain => "investorgain",
            Self::Chittorgarh => "chittorgarh",
        }
    }

    pub const fn is_gmp(self) -> bool {
        !matches!(self, Self::Nse)
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nse" => Ok(Self::Nse),
            "ipowatch" => Ok(Self::IpoWatch),
            "investorgain" => Ok(Self::InvestorGain),
            "chittorgarh" => Ok(Self::Chittorgarh),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}

/// Dataset category served by the aggregator. Each category has its own cache
/// slot and its own single-flight fetch lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    CurrentIpos,
    UpcomingIpos,
    PastIpos,
    Indices,
    MarketStatus,
}

impl Category {
    pub const ALL: [Self; 5] = [
        Self::CurrentIpos,
        Self::UpcomingIpos,
        Self::PastIpos,
        Self::Indices,
        Self::MarketStatus,
    ];

    pub const IPO: [Self; 3] = [Self::CurrentIpos, Self::UpcomingIpos, Self::PastIpos];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CurrentIpos => "current_ipos",
            Self::UpcomingIpos => "upcoming_ipos",
            Self::PastIpos => "past_ipos",
            Self::Indices => "indices",
            Self::MarketStatus => "market_status",
        }
    }

    pub const fn is_ipo(self) -> bool {
        matches!(
            self,
            Self::CurrentIpos | Self::UpcomingIpos | Self::PastIpos
        )
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "current" | "current_ipos" => Ok(Self::CurrentIpos),
            "upcoming" | "upcoming_ipos" => Ok(Self::UpcomingIpos),
            "past" | "past_ipos" => Ok(Self::PastIpos),
            "indices" => Ok(Self::Indices),
            "market_status" | "status" => Ok(Self::MarketStatus),
            other => Err(ValidationError::InvalidCategory {
                value: other.to_owned(),
            }),
        }
    }
}
