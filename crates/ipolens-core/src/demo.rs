//! Bundled demo data served when a category has never been fetched successfully.

use time::{Date, Duration};

use crate::cache::Dataset;
use crate::{
    Category, Ipo, MarketIndex, MarketState, MarketStatus, PriceRange, Symbol,
};

struct DemoIssue {
    symbol: &'static str,
    company_name: &'static str,
    start_offset: i64,
    end_offset: i64,
    listing_offset: Option<i64>,
    price: (f64, f64),
    shares_offered: f64,
    subscription_times: Option<f64>,
}

const CURRENT: [DemoIssue; 1] = [DemoIssue {
    symbol: "SAMPLE_IPO",
    company_name: "Sample Company Limited",
    start_offset: -1,
    end_offset: 3,
    listing_offset: None,
    price: (100.0, 110.0),
    shares_offered: 10_000_000.0,
    subscription_times: Some(1.5),
}];

const UPCOMING: [DemoIssue; 1] = [DemoIssue {
    symbol: "DEMOENERGY",
    company_name: "Demo Energy Ltd",
    start_offset: 5,
    end_offset: 8,
    listing_offset: None,
    price: (114.0, 120.0),
    shares_offered: 25_000_000.0,
    subscription_times: None,
}];

const PAST: [DemoIssue; 1] = [DemoIssue {
    symbol: "DEMORETAIL",
    company_name: "Demo Retail Limited",
    start_offset: -12,
    end_offset: -10,
    listing_offset: Some(-5),
    price: (240.0, 252.0),
    shares_offered: 8_000_000.0,
    subscription_times: Some(12.4),
}];

/// Demo dataset for `category`, with issue dates anchored on `today`.
pub fn dataset(category: Category, today: Date) -> Dataset {
    match category {
        Category::CurrentIpos => Dataset::Ipos(issues(&CURRENT, today)),
        Category::UpcomingIpos => Dataset::Ipos(issues(&UPCOMING, today)),
        Category::PastIpos => Dataset::Ipos(issues(&PAST, today)),
        Category::Indices => Dataset::Indices(indices()),
        Category::MarketStatus => Dataset::MarketStatus(market_status()),
    }
}

fn issues(demo: &[DemoIssue], today: Date) -> Vec<Ipo> {
    demo.iter()
        .filter_map(|issue| {
            let symbol = Symbol::parse(issue.symbol).ok()?;
            let start = today.checked_add(Duration::days(issue.start_offset))?;
            let end = today.checked_add(Duration::days(issue.end_offset))?;
            let mut ipo = Ipo::new(symbol, issue.company_name, start, end, today).ok()?;
            ipo.series = Some(String::from("EQ"));
            ipo.issue_price_range = PriceRange::new(Some(issue.price.0), Some(issue.price.1)).ok()?;
            ipo.shares_offered = Some(issue.shares_offered);
            ipo.subscription_times = issue.subscription_times;
            let listing = issue
                .listing_offset
                .and_then(|offset| today.checked_add(Duration::days(offset)));
            ipo.set_listing_date(listing, today);
            Some(ipo)
        })
        .collect()
}

fn indices() -> Vec<MarketIndex> {
    [
        ("NIFTY 50", 25_300.0, -0.5, 25_400.0, 25_200.0),
        ("NIFTY BANK", 55_120.0, 0.3, 55_300.0, 54_900.0),
        ("NIFTY IT", 35_640.0, 0.8, 35_700.0, 35_310.0),
    ]
    .into_iter()
    .filter_map(|(name, last, percent_change, high, low)| {
        let mut index = MarketIndex::new(name).ok()?;
        index.last = Some(last);
        index.percent_change = Some(percent_change);
        index.high = Some(high);
        index.low = Some(low);
        Some(index)
    })
    .collect()
}

fn market_status() -> Vec<MarketStatus> {
    vec![MarketStatus {
        market: String::from("Capital Market"),
        status: MarketState::Closed,
        status_text: String::from("Closed"),
        trade_date: None,
        index: Some(String::from("NIFTY 50")),
        last: Some(25_300.0),
        change: None,
        percent_change: Some(-0.5),
        message: Some(String::from("Demo data: live market status unavailable")),
    }]
}
