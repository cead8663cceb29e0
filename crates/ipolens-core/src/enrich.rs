//! # Merge & Enrichment
//!
//! Joins exchange issues with grey-market quotes on [`CompanyKey`] and derives
//! listing-gain, risk and recommendation signals.
//!
//! ## Conflict policy
//!
//! When several quotes share a company key, the most recent `observed_at`
//! wins. Quotes from different providers at the same instant are ordered by
//! the configured source priority; a tie involving a provider missing from
//! that list fails the pass with [`EnrichmentError::ConflictUnresolved`].
//! Duplicate rows from one provider at the same instant resolve to the lower
//! premium. Only keys that match an issue are resolved, so a conflict on an
//! unrelated company never fails the pass.
//!
//! ## Consensus
//!
//! Every provider that quoted a matched issue contributes its latest premium
//! to a consensus: the mean premium and a reliability score of 25 points per
//! provider, scaled down by the spread of their premiums (never below half).
//!
//! Enrichment is a pure function of its inputs: derived fields on incoming
//! issues are overwritten, and issue order is preserved.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::Origin;
use crate::domain::{round1, round2};
use crate::{CompanyKey, Confidence, GmpQuote, Ipo, Recommendation, RiskLevel, SourceId, UtcDateTime};

const LOW_RISK_MIN_GAIN: f64 = 20.0;
const MEDIUM_RISK_MIN_GAIN: f64 = 5.0;
const SCORE_PER_SOURCE: f64 = 25.0;
const MIN_CONSISTENCY: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrichmentError {
    #[error("conflicting quotes for '{company}' from providers without priority: {sources:?}")]
    ConflictUnresolved {
        company: String,
        sources: Vec<SourceId>,
    },
}

impl EnrichmentError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConflictUnresolved { .. } => "enrichment.conflict_unresolved",
        }
    }
}

/// Winning quote for one company key.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Resolved {
    premium: i64,
    source: SourceId,
    source_count: u32,
    consensus: f64,
    reliability: u8,
}

/// Merge engine configured with a provider priority order (first wins ties).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enricher {
    source_priority: Vec<SourceId>,
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new(SourceId::GMP.to_vec())
    }
}

impl Enricher {
    pub fn new(source_priority: Vec<SourceId>) -> Self {
        Self { source_priority }
    }

    pub fn source_priority(&self) -> &[SourceId] {
        &self.source_priority
    }

    pub fn enrich(&self, ipos: Vec<Ipo>, quotes: Vec<GmpQuote>) -> Result<Vec<Ipo>, EnrichmentError> {
        let mut by_key: BTreeMap<CompanyKey, Vec<GmpQuote>> = BTreeMap::new();
        for quote in quotes {
            by_key
                .entry(quote.matched_company_key.clone())
                .or_default()
                .push(quote);
        }

        ipos.into_iter()
            .map(|ipo| {
                let resolved = match ipo.company_key() {
                    Ok(key) => match by_key.get(&key) {
                        Some(candidates) => Some(self.resolve(&ipo.company_name, candidates)?),
                        None => None,
                    },
                    Err(_) => None,
                };
                Ok(apply(ipo, resolved))
            })
            .collect()
    }

    fn resolve(&self, company: &str, quotes: &[GmpQuote]) -> Result<Resolved, EnrichmentError> {
        let per_source = latest_per_source(quotes);
        let premiums: Vec<f64> = per_source
            .values()
            .map(|(_, premium)| *premium as f64)
            .collect();

        let latest = quotes
            .iter()
            .map(|quote| quote.observed_at)
            .max()
            .ok_or_else(|| EnrichmentError::ConflictUnresolved {
                company: company.to_owned(),
                sources: Vec::new(),
            })?;

        let mut newest: BTreeMap<SourceId, i64> = BTreeMap::new();
        for quote in quotes.iter().filter(|quote| quote.observed_at == latest) {
            newest
                .entry(quote.source_id)
                .and_modify(|premium| *premium = (*premium).min(quote.premium_amount))
                .or_insert(quote.premium_amount);
        }

        let (source, premium) = if newest.len() == 1 {
            newest
                .into_iter()
                .next()
                .ok_or_else(|| self.unresolved(company, Vec::new()))?
        } else {
            let unranked: Vec<SourceId> = newest
                .keys()
                .copied()
                .filter(|source| !self.source_priority.contains(source))
                .collect();
            if !unranked.is_empty() {
                return Err(self.unresolved(company, newest.keys().copied().collect()));
            }
            self.source_priority
                .iter()
                .find_map(|source| newest.get(source).map(|premium| (*source, *premium)))
                .ok_or_else(|| self.unresolved(company, newest.keys().copied().collect()))?
        };

        Ok(Resolved {
            premium,
            source,
            source_count: u32::try_from(per_source.len()).unwrap_or(u32::MAX),
            consensus: round2(premiums.iter().sum::<f64>() / premiums.len() as f64),
            reliability: reliability_score(&premiums),
        })
    }

    fn unresolved(&self, company: &str, sources: Vec<SourceId>) -> EnrichmentError {
        EnrichmentError::ConflictUnresolved {
            company: company.to_owned(),
            sources,
        }
    }
}

/// Latest premium per provider; same-instant duplicates keep the lower one.
fn latest_per_source(quotes: &[GmpQuote]) -> BTreeMap<SourceId, (UtcDateTime, i64)> {
    let mut latest: BTreeMap<SourceId, (UtcDateTime, i64)> = BTreeMap::new();
    for quote in quotes {
        let candidate = (quote.observed_at, quote.premium_amount);
        latest
            .entry(quote.source_id)
            .and_modify(|current| {
                if candidate.0 > current.0 || (candidate.0 == current.0 && candidate.1 < current.1) {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }
    latest
}

fn apply(mut ipo: Ipo, resolved: Option<Resolved>) -> Ipo {
    ipo.gmp = resolved.map(|resolved| resolved.premium);
    ipo.gmp_source = resolved.map(|resolved| resolved.source);
    ipo.gmp_source_count = resolved.map_or(0, |resolved| resolved.source_count);
    ipo.gmp_consensus = resolved.map(|resolved| resolved.consensus);
    ipo.gmp_reliability = resolved.map(|resolved| resolved.reliability);
    ipo.gmp_confidence = ipo.gmp_reliability.map(Confidence::from_score);
    ipo.estimated_listing_gain = listing_gain(ipo.gmp, ipo.issue_price_range.high);
    ipo.risk_level = risk_level(ipo.gmp, ipo.estimated_listing_gain);
    ipo
}

/// `gmp / price_high * 100`, rounded to one decimal.
pub fn listing_gain(gmp: Option<i64>, price_high: Option<f64>) -> Option<f64> {
    let gmp = gmp?;
    let high = price_high.filter(|high| high.is_finite() && *high > 0.0)?;
    Some(round1(gmp as f64 / high * 100.0))
}

/// Agreement between providers on a 0-100 scale.
///
/// Each provider adds 25 points. With more than one provider and a positive
/// mean, the score is multiplied by `1 - stddev / mean`, floored at 0.5.
pub fn reliability_score(premiums: &[f64]) -> u8 {
    let count = premiums.len() as f64;
    let base = (count * SCORE_PER_SOURCE).min(100.0);
    let mut score = base;

    if premiums.len() > 1 {
        let mean = premiums.iter().sum::<f64>() / count;
        if mean > 0.0 {
            let variance = premiums
                .iter()
                .map(|premium| (premium - mean).powi(2))
                .sum::<f64>()
                / count;
            score *= (1.0 - variance.sqrt() / mean).max(MIN_CONSISTENCY);
        }
    }

    score.clamp(0.0, 100.0) as u8
}

pub fn risk_level(gmp: Option<i64>, gain: Option<f64>) -> Option<RiskLevel> {
    gmp?;
    let level = match gain {
        Some(gain) if gain >= LOW_RISK_MIN_GAIN => RiskLevel::Low,
        Some(gain) if gain >= MEDIUM_RISK_MIN_GAIN => RiskLevel::Medium,
        Some(_) => RiskLevel::High,
        None => RiskLevel::Medium,
    };
    Some(level)
}

/// Recommendation for one issue with a short rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationReport {
    pub ipo: Ipo,
    pub recommendation: Recommendation,
    pub confidence: Option<Confidence>,
    pub rationale: String,
    /// Origin of the snapshot the issue was found in.
    pub origin: Origin,
}

impl RecommendationReport {
    pub fn for_ipo(ipo: Ipo, origin: Origin) -> Self {
        let recommendation = ipo.recommendation();
        let premium = match (ipo.gmp, ipo.estimated_listing_gain, ipo.gmp_source) {
            (Some(gmp), Some(gain), Some(source)) => {
                format!("GMP {gmp} implies a {gain:.1}% listing gain ({source})")
            }
            (Some(gmp), _, _) => format!("GMP {gmp} without a known issue price"),
            (None, _, _) => String::from("no grey-market premium quoted"),
        };
        let subscription = match ipo.subscription_times {
            Some(times) => format!("subscribed {times:.2}x"),
            None => String::from("subscription unknown"),
        };
        let risk = match ipo.risk_level {
            Some(RiskLevel::Low) => "low risk",
            Some(RiskLevel::Medium) => "medium risk",
            Some(RiskLevel::High) => "high risk",
            None => "risk not assessed",
        };

        Self {
            rationale: format!("{premium}; {subscription}; {risk}"),
            recommendation,
            confidence: ipo.gmp_confidence,
            ipo,
            origin,
        }
    }
}
