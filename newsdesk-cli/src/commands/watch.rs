//! `newsdesk watch`: Run the full engine and redraw on every change.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use newsdesk_core::{NewsQuery, NewsdeskConfig, Snapshot, StatusCounts, StatusFilter};
use newsdesk_sync::ConnectionState;

use super::{block_on, load_engine, print_articles, summary_line, QueryArgs};

/// Arguments for `newsdesk watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Only show one status: all, pending, in-progress, completed.
    #[arg(long, default_value = "all")]
    pub filter: StatusFilter,
}

impl WatchArgs {
    pub fn run(self, config: &NewsdeskConfig) -> Result<()> {
        let query = self.query.to_query();
        block_on(self.follow(config, query))?
    }

    async fn follow(&self, config: &NewsdeskConfig, query: NewsQuery) -> Result<()> {
        let engine = load_engine(config, &query).await?;
        let mut changes = engine.subscribe();
        let mut connection = engine.watch_connection();
        engine.start();

        self.render(&query, &changes.snapshot(), *connection.borrow_and_update());
        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.context("ctrl-c handler failed")?;
                    break;
                }
                alive = changes.changed() => {
                    if !alive {
                        break;
                    }
                    self.render(&query, &changes.snapshot(), *connection.borrow());
                }
                changed = connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *connection.borrow_and_update();
                    println!("{} push stream {}", "●".color(state_color(state)), state);
                }
            }
        }

        engine.shutdown().await.context("engine shutdown failed")?;
        Ok(())
    }

    fn render(&self, query: &NewsQuery, snapshot: &Snapshot, state: ConnectionState) {
        let counts = StatusCounts::from_items(&snapshot.items);
        println!();
        println!(
            "{} {}",
            summary_line(query, &counts).bold(),
            format!("[live: {state}]").color(state_color(state))
        );
        print_articles(&self.filter.apply(&snapshot.items));
    }
}

fn state_color(state: ConnectionState) -> colored::Color {
    match state {
        ConnectionState::Open => colored::Color::Green,
        ConnectionState::Connecting => colored::Color::Yellow,
        ConnectionState::Disconnected => colored::Color::Red,
        ConnectionState::Closed => colored::Color::BrightBlack,
    }
}
