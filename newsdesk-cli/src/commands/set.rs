//! `newsdesk set` and `newsdesk cycle`: Explicit status changes.

use anyhow::{bail, Result};
use clap::Args;

use newsdesk_core::{NewsId, NewsdeskConfig, WorkStatus};

use super::{block_on, load_engine, status_colored, QueryArgs};

/// Arguments for `newsdesk set`.
#[derive(Args, Debug)]
pub struct SetArgs {
    /// Article id (`news_id`).
    pub id: String,

    /// New status: 미진행 / 작업중 / 작업완료, or pending / in-progress / completed.
    pub status: WorkStatus,

    #[command(flatten)]
    pub query: QueryArgs,
}

impl SetArgs {
    pub fn run(self, config: &NewsdeskConfig) -> Result<()> {
        change_status(config, &self.query, NewsId::from(self.id), |_| self.status)
    }
}

/// Arguments for `newsdesk cycle`.
#[derive(Args, Debug)]
pub struct CycleArgs {
    /// Article id (`news_id`).
    pub id: String,

    #[command(flatten)]
    pub query: QueryArgs,
}

impl CycleArgs {
    pub fn run(self, config: &NewsdeskConfig) -> Result<()> {
        change_status(config, &self.query, NewsId::from(self.id), WorkStatus::next)
    }
}

fn change_status<F>(config: &NewsdeskConfig, query: &QueryArgs, id: NewsId, target: F) -> Result<()>
where
    F: FnOnce(WorkStatus) -> WorkStatus,
{
    let query = query.to_query();
    let (from, to) = block_on(async {
        let engine = load_engine(config, &query).await?;
        let Some(item) = engine.get(&id) else {
            bail!("article {id} is not in the list for {query}");
        };
        let from = item.status;
        let to = target(from);
        if let Err(err) = engine.set_status(&id, to).await {
            bail!(
                "could not set {id} to {}: {}",
                to.label(),
                err.user_message()
            );
        }
        Ok((from, to))
    })??;

    if from == to {
        println!("✓ {id} already {}", status_colored(to));
    } else {
        println!("✓ {id}: {} → {}", status_colored(from), status_colored(to));
    }
    Ok(())
}
