//! Behavior-driven tests for GMP merge and enrichment
//!
//! These tests verify the merge policy for conflicting quotes and the derived
//! listing gain, risk and recommendation fields.

use ipolens_core::enrich::{listing_gain, risk_level};
use ipolens_core::{
    Enricher, EnrichmentError, GmpQuote, Ipo, PriceRange, Recommendation, RiskLevel, SourceId,
    Symbol, UtcDateTime,
};
use time::macros::date;

fn ipo(symbol: &str, company: &str, high: Option<f64>) -> Ipo {
    let mut ipo = Ipo::new(
        Symbol::parse(symbol).expect("symbol"),
        company,
        date!(2025 - 09 - 18),
        date!(2025 - 09 - 22),
        date!(2025 - 09 - 20),
    )
    .expect("ipo");
    ipo.issue_price_range = PriceRange::new(high.map(|high| high - 6.0), high).expect("range");
    ipo
}

fn quote(company: &str, premium: i64, at: &str, source: SourceId) -> GmpQuote {
    GmpQuote::new(
        company,
        premium,
        UtcDateTime::parse(at).expect("timestamp"),
        source,
    )
    .expect("quote")
}

// =============================================================================
// Conflict resolution
// =============================================================================

#[test]
fn when_a_newer_quote_arrives_it_replaces_the_older_one() {
    // Given: Two quotes for the same company at T1 and T2 > T1
    let quotes = vec![
        quote("Demo Energy Ltd", 50, "2025-09-19T09:00:00Z", SourceId::IpoWatch),
        quote("Demo Energy Ltd", 60, "2025-09-20T09:00:00Z", SourceId::IpoWatch),
    ];

    // When: The issue is enriched
    let enriched = Enricher::default()
        .enrich(vec![ipo("DEMOENERGY", "Demo Energy Ltd", Some(120.0))], quotes)
        .expect("enrich");

    // Then: The T2 premium wins
    assert_eq!(enriched[0].gmp, Some(60));
    assert_eq!(enriched[0].gmp_source_count, 1);
}

#[test]
fn when_providers_quote_at_the_same_instant_priority_breaks_the_tie() {
    // Given: Same-instant quotes from two ranked providers
    let at = "2025-09-20T09:00:00Z";
    let quotes = vec![
        quote("Demo Energy Limited", 70, at, SourceId::Chittorgarh),
        quote("DEMO ENERGY LTD.", 65, at, SourceId::InvestorGain),
    ];
    let enricher = Enricher::new(vec![SourceId::InvestorGain, SourceId::Chittorgarh]);

    // When: The issue is enriched
    let enriched = enricher
        .enrich(vec![ipo("DEMOENERGY", "Demo Energy Ltd", Some(120.0))], quotes)
        .expect("enrich");

    // Then: The higher-priority provider's premium is used
    assert_eq!(enriched[0].gmp, Some(65));
    assert_eq!(enriched[0].gmp_source, Some(SourceId::InvestorGain));
    assert_eq!(enriched[0].gmp_source_count, 2);
}

#[test]
fn when_a_tied_provider_has_no_priority_the_conflict_is_reported() {
    // Given: Same-instant quotes and a priority list missing one provider
    let at = "2025-09-20T09:00:00Z";
    let quotes = vec![
        quote("Demo Energy", 70, at, SourceId::Chittorgarh),
        quote("Demo Energy", 65, at, SourceId::IpoWatch),
    ];
    let enricher = Enricher::new(vec![SourceId::IpoWatch]);

    // When: The issue is enriched
    let error = enricher
        .enrich(vec![ipo("DEMOENERGY", "Demo Energy Ltd", Some(120.0))], quotes)
        .expect_err("unranked tie");

    // Then: The error names both providers
    let EnrichmentError::ConflictUnresolved { sources, .. } = &error;
    assert_eq!(sources, &vec![SourceId::IpoWatch, SourceId::Chittorgarh]);
    assert_eq!(error.code(), "enrichment.conflict_unresolved");
}

#[test]
fn quotes_for_unlisted_companies_are_ignored_and_order_is_preserved() {
    // Given: Two issues and a quote for a company not on the list
    let ipos = vec![
        ipo("ZETA", "Zeta Labs Limited", Some(200.0)),
        ipo("ALPHA", "Alpha Steel Ltd", Some(100.0)),
    ];
    let quotes = vec![
        quote("Omega Ports IPO", 40, "2025-09-20T09:00:00Z", SourceId::IpoWatch),
        quote("Alpha Steel", -10, "2025-09-20T09:00:00Z", SourceId::IpoWatch),
    ];

    // When: Enriched
    let enriched = Enricher::default().enrich(ipos, quotes).expect("enrich");

    // Then: Input order is kept and only the listed company is quoted
    assert_eq!(enriched[0].symbol.as_str(), "ZETA");
    assert_eq!(enriched[0].gmp, None);
    assert_eq!(enriched[1].gmp, Some(-10));
    assert_eq!(enriched[1].estimated_listing_gain, Some(-10.0));
    assert_eq!(enriched[1].risk_level, Some(RiskLevel::High));
}

#[test]
fn enriching_identical_input_twice_gives_identical_output() {
    // Given: A fixed batch of issues and quotes
    let ipos = vec![
        ipo("DEMOENERGY", "Demo Energy Ltd", Some(120.0)),
        ipo("ALPHA", "Alpha Steel Ltd", None),
    ];
    let quotes = vec![
        quote("Demo Energy", 85, "2025-09-20T09:00:00Z", SourceId::IpoWatch),
        quote("Demo Energy", 80, "2025-09-20T09:00:00Z", SourceId::InvestorGain),
        quote("Alpha Steel", 12, "2025-09-19T09:00:00Z", SourceId::Chittorgarh),
    ];
    let enricher = Enricher::default();

    // When: Enriched twice, including a second pass over the output
    let first = enricher.enrich(ipos.clone(), quotes.clone()).expect("first");
    let second = enricher.enrich(ipos, quotes.clone()).expect("second");
    let again = enricher.enrich(first.clone(), quotes).expect("again");

    // Then: Serialized outputs are byte-identical
    let first_json = serde_json::to_string(&first).expect("json");
    assert_eq!(first_json, serde_json::to_string(&second).expect("json"));
    assert_eq!(first_json, serde_json::to_string(&again).expect("json"));
}

// =============================================================================
// Derived fields
// =============================================================================

#[test]
fn listing_gain_and_risk_follow_the_premium() {
    assert_eq!(listing_gain(Some(85), Some(120.0)), Some(70.8));
    assert_eq!(risk_level(Some(85), Some(70.8)), Some(RiskLevel::Low));

    assert_eq!(listing_gain(Some(-10), Some(100.0)), Some(-10.0));
    assert_eq!(risk_level(Some(-10), Some(-10.0)), Some(RiskLevel::High));

    assert_eq!(risk_level(Some(6), Some(5.0)), Some(RiskLevel::Medium));
}

#[test]
fn missing_premium_leaves_gain_and_risk_absent() {
    assert_eq!(listing_gain(None, Some(120.0)), None);
    assert_eq!(risk_level(None, None), None);

    let enriched = Enricher::default()
        .enrich(vec![ipo("ALPHA", "Alpha Steel Ltd", Some(100.0))], Vec::new())
        .expect("enrich");
    assert_eq!(enriched[0].estimated_listing_gain, None);
    assert_eq!(enriched[0].risk_level, None);
    assert_eq!(enriched[0].gmp_source_count, 0);
}

#[test]
fn premium_without_issue_price_is_medium_risk() {
    let enriched = Enricher::default()
        .enrich(
            vec![ipo("ALPHA", "Alpha Steel Ltd", None)],
            vec![quote("Alpha Steel", 30, "2025-09-20T09:00:00Z", SourceId::IpoWatch)],
        )
        .expect("enrich");

    assert_eq!(enriched[0].gmp, Some(30));
    assert_eq!(enriched[0].estimated_listing_gain, None);
    assert_eq!(enriched[0].risk_level, Some(RiskLevel::Medium));
}

#[test]
fn recommendation_table_combines_risk_and_subscription() {
    use Recommendation::{Avoid, Buy, Neutral, StrongBuy};

    let cases = [
        (Some(RiskLevel::Low), Some(2.0), StrongBuy),
        (Some(RiskLevel::Low), Some(1.0), Buy),
        (Some(RiskLevel::Low), Some(0.5), Neutral),
        (Some(RiskLevel::Low), None, Buy),
        (Some(RiskLevel::Medium), Some(3.0), Buy),
        (Some(RiskLevel::Medium), Some(1.5), Neutral),
        (Some(RiskLevel::Medium), None, Neutral),
        (Some(RiskLevel::High), Some(2.5), Neutral),
        (Some(RiskLevel::High), Some(1.2), Avoid),
        (Some(RiskLevel::High), None, Avoid),
        (None, Some(4.0), Neutral),
        (None, Some(0.9), Avoid),
        (None, None, Neutral),
    ];

    for (risk, subscription, expected) in cases {
        assert_eq!(
            Recommendation::decide(risk, subscription),
            expected,
            "risk={risk:?} subscription={subscription:?}"
        );
    }
}
