//! newsdesk: work-status desk for the article service.
//!
//! # Usage
//!
//! ```text
//! newsdesk [--base-url URL] list [--date D] [--query Q] [--filter F] [--sort time|status] [--asc] [--json]
//! newsdesk [--base-url URL] stats [--date D] [--query Q] [--server]
//! newsdesk [--base-url URL] set <id> <status> [--date D] [--query Q]
//! newsdesk [--base-url URL] cycle <id> [--date D] [--query Q]
//! newsdesk [--base-url URL] reset [--date D] [--query Q]
//! newsdesk [--base-url URL] watch [--date D] [--query Q] [--filter F]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    list::ListArgs,
    reset::ResetArgs,
    set::{CycleArgs, SetArgs},
    stats::StatsArgs,
    watch::WatchArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "newsdesk",
    version,
    about = "Track and update the work status of news articles",
    long_about = None,
)]
struct Cli {
    /// Article service origin; overrides config.yaml and NEWSDESK_BASE_URL.
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the articles of one day.
    List(ListArgs),

    /// Show status counters.
    Stats(StatsArgs),

    /// Set an article's status.
    Set(SetArgs),

    /// Advance an article to its next status (미진행 → 작업중 → 작업완료 → 미진행).
    Cycle(CycleArgs),

    /// Put every started or finished article of the day back to 미진행.
    Reset(ResetArgs),

    /// Follow live updates until ctrl-c.
    Watch(WatchArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();

    // One-shot commands keep stdout clean; `watch` reports connection changes.
    let default_level = match cli.command {
        Commands::Watch(_) => "info",
        _ => "warn",
    };
    init_tracing(default_level);

    let config = commands::load_config(cli.base_url.as_deref())?;
    match cli.command {
        Commands::List(args) => args.run(&config),
        Commands::Stats(args) => args.run(&config),
        Commands::Set(args) => args.run(&config),
        Commands::Cycle(args) => args.run(&config),
        Commands::Reset(args) => args.run(&config),
        Commands::Watch(args) => args.run(&config),
    }
}

fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
