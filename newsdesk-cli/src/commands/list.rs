//! `newsdesk list`: One day's articles as a table or JSON.

use anyhow::{Context, Result};
use clap::Args;

use newsdesk_core::{
    sort_items, NewsdeskConfig, SortKey, SortOrder, StatusCounts, StatusFilter, WorkItem,
};

use super::{block_on, load_engine, print_articles, summary_line, QueryArgs};

/// Arguments for `newsdesk list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Only show one status: all, pending, in-progress, completed.
    #[arg(long, default_value = "all")]
    pub filter: StatusFilter,

    /// Order rows by `time` (newest first) or `status`.
    #[arg(long, default_value = "time")]
    pub sort: SortKey,

    /// Force ascending order.
    #[arg(long)]
    pub asc: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    pub fn run(self, config: &NewsdeskConfig) -> Result<()> {
        let query = self.query.to_query();
        let snapshot = block_on(async {
            let engine = load_engine(config, &query).await?;
            anyhow::Ok(engine.snapshot())
        })??;

        let mut items: Vec<WorkItem> = snapshot.items.as_ref().clone();
        let order = if self.asc {
            SortOrder::Asc
        } else {
            self.sort.default_order()
        };
        sort_items(&mut items, self.sort, order);
        let visible = self.filter.apply(&items);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&visible).context("failed to serialize articles")?
            );
            return Ok(());
        }

        println!("{}", summary_line(&query, &StatusCounts::from_items(&items)));
        if self.filter != StatusFilter::All {
            println!("filter: {} ({} shown)", self.filter, visible.len());
        }
        print_articles(&visible);
        Ok(())
    }
}
