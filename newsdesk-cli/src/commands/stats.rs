//! `newsdesk stats`: Status counters for a day, or server-wide.

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use newsdesk_core::{NewsdeskConfig, StatusCounts, WorkStatus};
use newsdesk_sync::SyncEngine;

use super::{block_on, load_engine, QueryArgs};

/// Arguments for `newsdesk stats`.
#[derive(Args, Debug)]
pub struct StatsArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Ask the service for its all-time counters instead of counting one day.
    #[arg(long)]
    pub server: bool,
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "articles")]
    count: usize,
}

impl StatsArgs {
    pub fn run(self, config: &NewsdeskConfig) -> Result<()> {
        if self.server {
            let summary = block_on(async {
                let engine =
                    SyncEngine::from_config(config).context("failed to create sync engine")?;
                engine
                    .server_summary()
                    .await
                    .context("failed to load server status summary")
            })??;
            println!("all articles on {}", config.base_url());
            print_counts(
                summary.pending,
                summary.in_progress,
                summary.completed,
                summary.total,
            );
            return Ok(());
        }

        let query = self.query.to_query();
        let snapshot = block_on(async {
            let engine = load_engine(config, &query).await?;
            anyhow::Ok(engine.snapshot())
        })??;
        let counts = StatusCounts::from_items(&snapshot.items);
        println!("{query} | {}% done", counts.completion_percent());
        print_counts(
            counts.pending,
            counts.in_progress,
            counts.completed,
            counts.total,
        );
        Ok(())
    }
}

fn print_counts(pending: usize, in_progress: usize, completed: usize, total: usize) {
    let rows = vec![
        CountRow {
            status: WorkStatus::Pending.label().to_string(),
            count: pending,
        },
        CountRow {
            status: WorkStatus::InProgress.label().to_string(),
            count: in_progress,
        },
        CountRow {
            status: WorkStatus::Completed.label().to_string(),
            count: completed,
        },
        CountRow {
            status: "전체".to_string(),
            count: total,
        },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
