//! `newsdesk reset`: Put every article of the day back to 미진행.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use newsdesk_core::{NewsdeskConfig, WorkStatus};

use super::{block_on, load_engine, QueryArgs};

/// Arguments for `newsdesk reset`.
#[derive(Args, Debug)]
pub struct ResetArgs {
    #[command(flatten)]
    pub query: QueryArgs,
}

impl ResetArgs {
    pub fn run(self, config: &NewsdeskConfig) -> Result<()> {
        let query = self.query.to_query();
        let report = block_on(async {
            let engine = load_engine(config, &query).await?;
            anyhow::Ok(engine.reset_all().await)
        })??;

        if report.reset == 0 && report.is_complete() {
            println!("✓ {query}: nothing to reset");
            return Ok(());
        }
        println!(
            "✓ {query}: {} article(s) set to {}",
            report.reset,
            WorkStatus::Pending.label()
        );
        if report.is_complete() {
            return Ok(());
        }

        for (id, err) in &report.failed {
            eprintln!("{} {id}: {}", "✗".red().bold(), err.user_message());
        }
        bail!("{} article(s) could not be reset", report.failed.len())
    }
}
