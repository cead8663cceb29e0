//! CLI argument definitions for ipolens.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ipos` | Current, upcoming or past IPOs with GMP enrichment |
//! | `indices` | Exchange indices |
//! | `market-status` | Exchange market status |
//! | `overview` | Major indices and market sentiment |
//! | `search` | Search IPOs by symbol or company |
//! | `recommend` | Recommendation for one IPO |
//! | `history` | Grey-market premium history for one company |
//! | `refresh` | Refresh every category concurrently |
//! | `health` | Source health per host, category and provider |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | none | TOML config file |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--mock` | `false` | Offline transport; serves demo data |
//!
//! # Examples
//!
//! ```bash
//! ipolens ipos current --pretty
//! ipolens search energy --category upcoming
//! ipolens recommend "Demo Energy Ltd"
//! ipolens history DEMOENERGY --config ipolens.toml
//! RUST_LOG=ipolens_core=debug ipolens refresh
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ipolens_core::Category;

/// ipolens - Indian IPO and grey-market premium tracker
#[derive(Debug, Parser)]
#[command(
    name = "ipolens",
    author,
    version,
    about = "IPO listings enriched with grey-market premiums",
    long_about = "ipolens fetches IPO listings and market data from the exchange, merges \
grey-market premium quotes from several providers and always answers: live data when \
sources respond, the last good snapshot when they fail, and demo data otherwise.\n\
\n\
Use 'ipolens <command> --help' for command-specific help."
)]
pub struct Cli {
    /// TOML configuration file. `IPOLENS_*` environment variables override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Use an offline transport; every category falls back to demo data.
    #[arg(long, global = true, default_value_t = false)]
    pub mock: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// IPO categories accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IpoKind {
    Current,
    Upcoming,
    Past,
}

impl From<IpoKind> for Category {
    fn from(kind: IpoKind) -> Self {
        match kind {
            IpoKind::Current => Self::CurrentIpos,
            IpoKind::Upcoming => Self::UpcomingIpos,
            IpoKind::Past => Self::PastIpos,
        }
    }
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List IPOs of one category.
    ///
    /// # Examples
    ///
    ///   ipolens ipos current
    ///   ipolens ipos past --pretty
    Ipos(IposArgs),

    /// List exchange indices.
    Indices,

    /// Show exchange market status.
    MarketStatus,

    /// Show major indices with market sentiment.
    Overview,

    /// Search IPOs, fetching any category without a fresh snapshot.
    ///
    /// # Examples
    ///
    ///   ipolens search energy
    ///   ipolens search DEMO --category upcoming
    Search(SearchArgs),

    /// Recommend on one IPO by company name or symbol.
    Recommend(RecommendArgs),

    /// Show recorded grey-market premiums for a company or IPO symbol.
    ///
    /// History persists across runs only when `cache.snapshot_dir` is set.
    History(HistoryArgs),

    /// Fetch every category now, ignoring fresh snapshots.
    Refresh,

    /// Report circuit state per host, origin per category and quotes per provider.
    Health,
}

#[derive(Debug, Args)]
pub struct IposArgs {
    #[arg(value_enum)]
    pub kind: IpoKind,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Case-insensitive substring of a symbol or company name.
    pub query: String,

    /// Restrict to one IPO category.
    #[arg(long, value_enum)]
    pub category: Option<IpoKind>,
}

#[derive(Debug, Args)]
pub struct RecommendArgs {
    /// Company name (suffixes like "Limited" are ignored) or symbol.
    pub company: String,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Company name or IPO symbol.
    pub company: String,
}
