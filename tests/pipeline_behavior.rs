//! Behavior-driven tests for the acquisition pipeline
//!
//! These tests verify HOW categories are served end to end: live data when
//! sources respond, the last snapshot when they fail, demo data when cold,
//! single-flight fetching under concurrency, and lookups that fetch cold
//! categories on demand.

use std::sync::Arc;
use std::time::Duration;

use ipolens_core::config::SourceConfig;
use ipolens_core::{
    Aggregator, Category, Confidence, Dataset, EngineConfig, HttpResponse, LookupError, Origin,
    Recommendation, RiskLevel, ScriptedHttpClient, Sentiment, SourceId,
};

const NSE: &str = "https://nse.test";
const CURRENT: &str = "https://nse.test/api/ipo-current-issue";
const PAST: &str = "https://nse.test/api/public-past-issues";
const INDICES: &str = "https://nse.test/api/allIndices";
const IPOWATCH: &str = "https://ipowatch.test/gmp/";
const INVESTORGAIN: &str = "https://investorgain.test/gmp/";

const CURRENT_ISSUES: &str = r#"[
    {
        "symbol": "DEMOENERGY",
        "companyName": "Demo Energy Ltd",
        "series": "EQ",
        "issueStartDate": "18-Sep-2025",
        "issueEndDate": "22-Sep-2025",
        "issuePrice": "Rs.114 to Rs.120",
        "noOfTime": "3.50",
        "noOfSharesOffered": "25000000"
    },
    {
        "symbol": "FLATFOODS",
        "companyName": "Flat Foods Limited",
        "issueStartDate": "19-Sep-2025",
        "issueEndDate": "23-Sep-2025",
        "issuePrice": "Rs.50",
        "noOfTime": "0.40"
    }
]"#;

const INDICES_BODY: &str = r#"{"data":[
    {"indexName":"NIFTY 50","last":25300.5,"percentChange":0.42},
    {"indexName":"NIFTY BANK","last":55120,"percentChange":-0.15},
    {"indexName":"NIFTY IT","last":35640,"percentChange":1.2},
    {"indexName":"INDIA VIX","last":11.2,"percentChange":-3.1}
]}"#;

fn ipowatch_page(premium: &str, updated_on: &str) -> String {
    format!(
        r#"<html><body><table>
        <tr><th>Stock / IPO</th><th>IPO GMP</th><th>IPO Price</th><th>Gain</th><th>Updated On</th></tr>
        <tr><td>Demo Energy Limited IPO</td><td>{premium}</td><td>&#8377;120</td><td>-</td><td>{updated_on}</td></tr>
        </table></body></html>"#
    )
}

fn investorgain_page(premium: &str, updated_on: &str) -> String {
    format!(
        r#"<table>
        <tr><th>IPO</th><th>Price</th><th>GMP(&#8377;)</th><th>Est Listing</th><th>Gain %</th><th>Updated On</th></tr>
        <tr><td>Demo Energy</td><td>120</td><td>{premium}</td><td>-</td><td>-</td><td>{updated_on}</td></tr>
        </table>"#
    )
}

fn config(ttl_secs: u64) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.sources = SourceConfig {
        nse_base_url: String::from(NSE),
        ipowatch_url: String::from(IPOWATCH),
        investorgain_url: String::from(INVESTORGAIN),
        chittorgarh_url: String::from("https://chittorgarh.test/gmp/"),
        past_days: 30,
    };
    config.fetch.base_delay_ms = 1;
    config.fetch.max_delay_ms = 2;
    config.fetch.jitter = false;
    config.fetch.max_retries = 2;
    config.fetch.rate_limit_delay_ms = 0;
    config.fetch.circuit_failure_threshold = 100;
    config.cache.ttl_secs = ttl_secs;
    config
}

fn aggregator(script: &ScriptedHttpClient, config: EngineConfig) -> Aggregator {
    Aggregator::from_config(Arc::new(script.clone()), config).expect("aggregator")
}

// =============================================================================
// Live pipeline
// =============================================================================

#[tokio::test]
async fn when_exchange_and_gmp_respond_ipos_are_served_live_and_enriched() {
    // Given: The exchange lists two issues and one GMP provider quotes one of them
    let script = ScriptedHttpClient::new();
    script.always(CURRENT, Ok(HttpResponse::ok(CURRENT_ISSUES)));
    script.always(IPOWATCH, Ok(HttpResponse::ok(ipowatch_page("&#8377;85", "-"))));
    let aggregator = aggregator(&script, config(60));

    // When: Current IPOs are requested
    let result = aggregator
        .ipos(Category::CurrentIpos)
        .await
        .expect("ipo category");

    // Then: The result is Live and the quoted issue carries derived fields
    assert_eq!(result.origin, Origin::Live);
    assert_eq!(result.staleness_seconds, 0);
    assert_eq!(result.data.len(), 2);

    let energy = &result.data[0];
    assert_eq!(energy.symbol.as_str(), "DEMOENERGY");
    assert_eq!(energy.gmp, Some(85));
    assert_eq!(energy.gmp_source, Some(SourceId::IpoWatch));
    assert_eq!(energy.gmp_source_count, 1);
    assert_eq!(energy.estimated_listing_gain, Some(70.8));
    assert_eq!(energy.risk_level, Some(RiskLevel::Low));
    assert_eq!(energy.recommendation(), Recommendation::StrongBuy);
    let size = energy.issue_size_crores().expect("issue size");
    assert_eq!(size.max, 300.0);

    // Then: The unquoted issue has no premium-derived fields
    let flat = &result.data[1];
    assert_eq!(flat.gmp, None);
    assert_eq!(flat.estimated_listing_gain, None);
    assert_eq!(flat.risk_level, None);
    assert_eq!(flat.recommendation(), Recommendation::Avoid);
}

#[tokio::test]
async fn when_providers_disagree_the_most_recent_quote_wins() {
    // Given: Two providers quoting the same issue on different days
    let script = ScriptedHttpClient::new();
    script.always(CURRENT, Ok(HttpResponse::ok(CURRENT_ISSUES)));
    script.always(
        IPOWATCH,
        Ok(HttpResponse::ok(ipowatch_page("50", "10-Sep-2025"))),
    );
    script.always(
        INVESTORGAIN,
        Ok(HttpResponse::ok(investorgain_page("60", "12-Sep-2025"))),
    );
    let aggregator = aggregator(&script, config(0));

    // When: Current IPOs are fetched
    let result = aggregator.ipos(Category::CurrentIpos).await.expect("ipos");

    // Then: The later quote is used and both providers are counted
    let energy = &result.data[0];
    assert_eq!(energy.gmp, Some(60));
    assert_eq!(energy.gmp_source, Some(SourceId::InvestorGain));
    assert_eq!(energy.gmp_source_count, 2);
    assert_eq!(energy.estimated_listing_gain, Some(50.0));
}

#[tokio::test]
async fn when_undated_quotes_tie_the_source_priority_decides() {
    // Given: Two providers quoting the same issue with no update date
    let script = ScriptedHttpClient::new();
    script.always(CURRENT, Ok(HttpResponse::ok(CURRENT_ISSUES)));
    script.always(IPOWATCH, Ok(HttpResponse::ok(ipowatch_page("50", "-"))));
    script.always(
        INVESTORGAIN,
        Ok(HttpResponse::ok(investorgain_page("60", "-"))),
    );
    let mut preferred = config(0);
    preferred.gmp.source_priority =
        vec![SourceId::IpoWatch, SourceId::InvestorGain, SourceId::Chittorgarh];
    let mut reversed = config(0);
    reversed.gmp.source_priority =
        vec![SourceId::InvestorGain, SourceId::IpoWatch, SourceId::Chittorgarh];

    // When: Each priority order serves current IPOs
    let first = aggregator(&script, preferred)
        .ipos(Category::CurrentIpos)
        .await
        .expect("ipos");
    let second = aggregator(&script, reversed)
        .ipos(Category::CurrentIpos)
        .await
        .expect("ipos");

    // Then: The higher-priority provider wins each time
    assert_eq!(first.data[0].gmp, Some(50));
    assert_eq!(first.data[0].gmp_source, Some(SourceId::IpoWatch));
    assert_eq!(second.data[0].gmp, Some(60));
    assert_eq!(second.data[0].gmp_source, Some(SourceId::InvestorGain));

    // Then: Both providers still feed the consensus
    assert_eq!(first.data[0].gmp_source_count, 2);
    assert_eq!(first.data[0].gmp_consensus, Some(55.0));
    assert_eq!(first.data[0].gmp_reliability, Some(45));
    assert_eq!(first.data[0].gmp_confidence, Some(Confidence::Low));
}

#[tokio::test]
async fn when_every_gmp_provider_fails_ipos_are_still_served_live() {
    // Given: A healthy exchange and no reachable GMP provider
    let script = ScriptedHttpClient::new();
    script.always(CURRENT, Ok(HttpResponse::ok(CURRENT_ISSUES)));
    script.always(IPOWATCH, Ok(HttpResponse::new(403, "Access Denied")));
    let aggregator = aggregator(&script, config(0));

    // When: Current IPOs are fetched
    let result = aggregator.ipos(Category::CurrentIpos).await.expect("ipos");

    // Then: Issues are Live without premiums
    assert_eq!(result.origin, Origin::Live);
    assert!(result.data.iter().all(|ipo| ipo.gmp.is_none()));
}

#[tokio::test]
async fn past_issues_query_covers_the_configured_window() {
    // Given: A past-issues endpoint
    let script = ScriptedHttpClient::new();
    script.always(PAST, Ok(HttpResponse::ok(CURRENT_ISSUES)));
    let aggregator = aggregator(&script, config(0));

    // When: Past IPOs are fetched
    let result = aggregator.ipos(Category::PastIpos).await.expect("ipos");

    // Then: The request carried both dates and the security type
    assert_eq!(result.origin, Origin::Live);
    let request = &script.requests_to(PAST)[0];
    assert!(request.url.contains("from_date="));
    assert!(request.url.contains("&to_date="));
    assert!(request.url.ends_with("&security_type=all"));
    assert_eq!(request.header("accept"), Some("application/json, text/plain, */*"));
}

// =============================================================================
// Fallback
// =============================================================================

#[tokio::test]
async fn when_all_sources_fail_after_a_success_the_last_snapshot_is_served() {
    // Given: One successful index fetch
    let script = ScriptedHttpClient::new();
    script.push(INDICES, Ok(HttpResponse::ok(INDICES_BODY)));
    let aggregator = aggregator(&script, config(0));
    let live = aggregator.indices().await;
    assert_eq!(live.origin, Origin::Live);

    // When: The exchange starts failing
    script.always(INDICES, Ok(HttpResponse::new(500, "down")));
    let cached = aggregator.indices().await;

    // Then: The previous snapshot is served as Cache
    assert_eq!(cached.origin, Origin::Cache);
    assert_eq!(cached.data, live.data);
    assert_eq!(cached.fetched_at, live.fetched_at);
}

#[tokio::test]
async fn when_all_sources_fail_with_no_snapshot_demo_data_is_served() {
    // Given: Nothing scripted, so every request fails
    let script = ScriptedHttpClient::new();
    let aggregator = aggregator(&script, config(0));

    // When: Every category is refreshed
    let results = aggregator.refresh_all().await;

    // Then: Every category answers with non-empty demo data
    assert_eq!(results.len(), Category::ALL.len());
    for (category, result) in results {
        assert_eq!(result.origin, Origin::Demo, "{category}");
        assert_eq!(result.staleness_seconds, 0);
        assert!(!result.data.is_empty(), "{category}");
    }
}

#[tokio::test]
async fn when_the_payload_shape_changes_the_category_degrades_instead_of_failing() {
    // Given: An exchange response without the expected array
    let script = ScriptedHttpClient::new();
    script.always(INDICES, Ok(HttpResponse::ok(r#"{"unexpected": true}"#)));
    let aggregator = aggregator(&script, config(0));

    // When: Indices are requested on a cold cache
    let result = aggregator.indices().await;

    // Then: Demo data is served and health records it
    assert_eq!(result.origin, Origin::Demo);
    let health = aggregator.health();
    let indices = health
        .categories
        .iter()
        .find(|entry| entry.category == Category::Indices)
        .expect("indices health");
    assert_eq!(indices.origin, Some(Origin::Demo));
    assert_eq!(indices.attempts, 1);
}

#[tokio::test]
async fn when_a_persisted_snapshot_exists_a_restart_serves_it_as_cache() {
    // Given: A first process that stored a live index snapshot on disk
    let dir = tempfile::tempdir().expect("tempdir");
    let mut first_config = config(60);
    first_config.cache.snapshot_dir = Some(dir.path().to_path_buf());
    let script = ScriptedHttpClient::new();
    script.always(INDICES, Ok(HttpResponse::ok(INDICES_BODY)));
    let first = aggregator(&script, first_config.clone());
    assert_eq!(first.indices().await.origin, Origin::Live);

    // When: A second process starts with no reachable source
    let offline = ScriptedHttpClient::new();
    let second = aggregator(&offline, first_config);
    let result = second.indices().await;

    // Then: The persisted snapshot is served as Cache after one attempt
    assert_eq!(result.origin, Origin::Cache);
    assert_eq!(result.data.len(), 4);
    assert!(offline.calls_to(INDICES) >= 1);
}

// =============================================================================
// Concurrency and freshness
// =============================================================================

#[tokio::test]
async fn when_two_callers_hit_a_cold_category_only_one_fetch_runs() {
    // Given: A slow exchange
    let script = ScriptedHttpClient::new().with_delay(Duration::from_millis(40));
    script.always(INDICES, Ok(HttpResponse::ok(INDICES_BODY)));
    let aggregator = aggregator(&script, config(0));

    // When: Two callers ask for indices at the same time
    let (first, second) = tokio::join!(aggregator.indices(), aggregator.indices());

    // Then: One request reached the exchange and both got the same result
    assert_eq!(script.calls_to(INDICES), 1);
    assert_eq!(first, second);
    assert_eq!(first.origin, Origin::Live);
}

#[tokio::test]
async fn one_refresh_fetches_each_gmp_provider_once() {
    // Given: Every IPO endpoint and one provider reachable
    let script = ScriptedHttpClient::new();
    script.always(CURRENT, Ok(HttpResponse::ok(CURRENT_ISSUES)));
    script.always(PAST, Ok(HttpResponse::ok(CURRENT_ISSUES)));
    script.always(IPOWATCH, Ok(HttpResponse::ok(ipowatch_page("85", "-"))));
    let aggregator = aggregator(&script, config(0));

    // When: Every category is refreshed
    aggregator.refresh_all().await;

    // Then: The three IPO categories shared one provider fetch
    assert_eq!(script.calls_to(IPOWATCH), 1);
    let health = aggregator.health();
    let ipowatch = health
        .providers
        .iter()
        .find(|provider| provider.source == SourceId::IpoWatch)
        .expect("ipowatch health");
    assert_eq!(ipowatch.attempts, 1);
    assert_eq!(ipowatch.quotes, 1);
}

#[tokio::test]
async fn fresh_snapshots_are_reused_until_a_refresh_is_forced() {
    // Given: A cache ttl of one minute
    let script = ScriptedHttpClient::new();
    script.always(INDICES, Ok(HttpResponse::ok(INDICES_BODY)));
    let aggregator = aggregator(&script, config(60));

    // When: Indices are read twice and then refreshed
    aggregator.indices().await;
    let reused = aggregator.indices().await;
    let calls_after_reads = script.calls_to(INDICES);
    let refreshed = aggregator.refresh(Category::Indices).await;

    // Then: Only the refresh fetched again
    assert_eq!(reused.origin, Origin::Live);
    assert_eq!(calls_after_reads, 1);
    assert_eq!(script.calls_to(INDICES), 2);
    assert!(matches!(refreshed.data, Dataset::Indices(ref indices) if indices.len() == 4));
}

// =============================================================================
// Lookups
// =============================================================================

#[tokio::test]
async fn search_and_recommend_fetch_a_cold_category() {
    // Given: A cold engine and an exchange listing the energy issue
    let script = ScriptedHttpClient::new();
    script.always(CURRENT, Ok(HttpResponse::ok(CURRENT_ISSUES)));
    script.always(IPOWATCH, Ok(HttpResponse::ok(ipowatch_page("85", "-"))));
    let aggregator = aggregator(&script, config(60));

    // When: Current IPOs are searched before anything was fetched
    let found = aggregator
        .search("energy", Some(Category::CurrentIpos))
        .await
        .expect("search");

    // Then: The category was fetched and the match is Live
    assert_eq!(found.origin, Origin::Live);
    assert_eq!(found.data.len(), 1);
    assert_eq!(found.data[0].symbol.as_str(), "DEMOENERGY");
    assert_eq!(found.data[0].gmp, Some(85));

    // When: A recommendation is requested across every IPO category
    let report = aggregator
        .recommend("Demo Energy Limited")
        .await
        .expect("recommendation");

    // Then: The report names the origin of the category holding the issue
    assert_eq!(report.origin, Origin::Live);
    assert_eq!(report.recommendation, Recommendation::StrongBuy);
    assert!(report.rationale.contains("70.8%"));

    // Then: The fresh category and fresh quotes were not fetched again
    assert_eq!(script.calls_to(CURRENT), 1);
    assert_eq!(script.calls_to(IPOWATCH), 1);
}

#[tokio::test]
async fn search_across_categories_reports_the_least_fresh_origin() {
    // Given: Only current issues are reachable
    let script = ScriptedHttpClient::new();
    script.always(CURRENT, Ok(HttpResponse::ok(CURRENT_ISSUES)));
    let aggregator = aggregator(&script, config(60));

    // When: Every IPO category is searched by symbol
    let found = aggregator.search("flatfoods", None).await.expect("search");

    // Then: The live match is returned and the demo fallbacks lower the origin
    assert_eq!(found.data.len(), 1);
    assert_eq!(found.data[0].company_name, "Flat Foods Limited");
    assert_eq!(found.origin, Origin::Demo);
}

#[tokio::test]
async fn unknown_company_recommendation_is_not_found() {
    let aggregator = aggregator(&ScriptedHttpClient::new(), config(0));

    let error = aggregator
        .recommend("Nonexistent Holdings")
        .await
        .expect_err("not found");
    assert_eq!(
        error,
        LookupError::NotFound {
            query: String::from("Nonexistent Holdings")
        }
    );
    assert_eq!(
        aggregator
            .search("x", Some(Category::Indices))
            .await
            .expect_err("indices hold no IPOs"),
        LookupError::NotIpoCategory {
            category: Category::Indices
        }
    );
}

#[tokio::test]
async fn premium_history_is_recorded_per_provider() {
    // Given: Two providers quoting the energy issue
    let script = ScriptedHttpClient::new();
    script.always(CURRENT, Ok(HttpResponse::ok(CURRENT_ISSUES)));
    script.always(IPOWATCH, Ok(HttpResponse::ok(ipowatch_page("50", "-"))));
    script.always(
        INVESTORGAIN,
        Ok(HttpResponse::ok(investorgain_page("60", "-"))),
    );
    let aggregator = aggregator(&script, config(0));

    // When: Current IPOs are fetched and history is looked up by symbol
    aggregator.ipos(Category::CurrentIpos).await.expect("ipos");
    let by_symbol = aggregator.gmp_history("demoenergy").expect("history");
    let by_name = aggregator
        .gmp_history("Demo Energy Ltd")
        .expect("history");

    // Then: One entry per provider, reachable by symbol or name
    let premiums: Vec<(SourceId, i64)> = by_symbol
        .iter()
        .map(|entry| (entry.source, entry.premium))
        .collect();
    assert_eq!(
        premiums,
        vec![(SourceId::IpoWatch, 50), (SourceId::InvestorGain, 60)]
    );
    assert_eq!(by_name, by_symbol);
    assert!(matches!(
        aggregator.gmp_history("Flat Foods"),
        Err(LookupError::NotFound { .. })
    ));
}

#[tokio::test]
async fn market_overview_scores_major_indices() {
    let script = ScriptedHttpClient::new();
    script.always(INDICES, Ok(HttpResponse::ok(INDICES_BODY)));
    let aggregator = aggregator(&script, config(0));

    let overview = aggregator.market_overview().await;

    assert_eq!(overview.origin, Origin::Live);
    assert_eq!(overview.data.indices.len(), 3);
    assert_eq!(overview.data.sentiment_score, 66.7);
    assert_eq!(overview.data.sentiment, Sentiment::Positive);
}
