//! Subcommands and the plumbing they share.

pub mod list;
pub mod reset;
pub mod set;
pub mod stats;
pub mod watch;

use std::future::Future;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use newsdesk_core::{NewsQuery, NewsdeskConfig, StatusCounts, WorkItem, WorkStatus};
use newsdesk_sync::SyncEngine;

/// `--date` / `--query`, shared by every command that loads a record set.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Publication date (YYYY-MM-DD); defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Free-text search within that date.
    #[arg(long, default_value = "")]
    pub query: String,
}

impl QueryArgs {
    pub fn to_query(&self) -> NewsQuery {
        match self.date {
            Some(date) => NewsQuery::new(date, self.query.clone()),
            None => NewsQuery::new(NewsQuery::today().date, self.query.clone()),
        }
    }
}

/// Defaults ← `~/.newsdesk/config.yaml` ← `NEWSDESK_BASE_URL` ← `--base-url`.
pub fn load_config(base_url: Option<&str>) -> Result<NewsdeskConfig> {
    let mut config = NewsdeskConfig::load()
        .context("failed to load ~/.newsdesk/config.yaml")?
        .with_process_env();
    if let Some(url) = base_url {
        config = config.with_base_url(url);
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Run one command's async body on a fresh runtime.
pub fn block_on<F>(future: F) -> Result<F::Output>
where
    F: Future,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    Ok(runtime.block_on(future))
}

/// Engine with `query` already loaded.
pub async fn load_engine(config: &NewsdeskConfig, query: &NewsQuery) -> Result<SyncEngine> {
    tracing::debug!(%query, base_url = config.base_url(), "loading articles");
    let engine = SyncEngine::from_config(config).context("failed to create sync engine")?;
    engine
        .refetch(query.clone())
        .await
        .with_context(|| format!("failed to load articles for {query} from {}", config.base_url()))?;
    Ok(engine)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct ArticleRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "time")]
    time: String,
    #[tabled(rename = "provider")]
    provider: String,
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "ai")]
    ai: String,
}

impl ArticleRow {
    fn from_item(item: &WorkItem) -> Self {
        Self {
            id: item.id.to_string(),
            status: status_colored(item.status),
            time: item.timestamp().unwrap_or("-").to_string(),
            provider: item.provider.clone().unwrap_or_default(),
            title: truncate(item.title.as_deref().unwrap_or(""), TITLE_WIDTH),
            ai: if item.has_generated_content() { "✓" } else { "" }.to_string(),
        }
    }
}

const TITLE_WIDTH: usize = 48;

pub fn print_articles(items: &[&WorkItem]) {
    if items.is_empty() {
        println!("No articles.");
        return;
    }
    let rows: Vec<ArticleRow> = items.iter().map(|item| ArticleRow::from_item(item)).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

pub fn summary_line(query: &NewsQuery, counts: &StatusCounts) -> String {
    format!(
        "{query} | {} articles | {} {} · {} {} · {} {} | {}% done",
        counts.total,
        WorkStatus::Pending.label(),
        counts.pending,
        WorkStatus::InProgress.label(),
        counts.in_progress,
        WorkStatus::Completed.label(),
        counts.completed,
        counts.completion_percent(),
    )
}

pub fn status_colored(status: WorkStatus) -> String {
    use colored::Colorize;

    match status {
        WorkStatus::Pending => status.label().bright_black().bold().to_string(),
        WorkStatus::InProgress => status.label().yellow().bold().to_string(),
        WorkStatus::Completed => status.label().green().bold().to_string(),
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_titles_are_cut() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("국회 본회의 예산안 처리", 6), "국회 본회…");
    }

    #[test]
    fn status_cell_is_colored() {
        colored::control::set_override(true);
        let row = ArticleRow::from_item(&WorkItem::new("A1", WorkStatus::Completed));
        colored::control::unset_override();

        assert!(row.status.contains("작업완료"));
        assert!(row.status.starts_with('\u{1b}'), "got: {:?}", row.status);
        assert!(row.status.contains("32m"), "completed is green: {:?}", row.status);
    }

    #[test]
    fn explicit_date_wins() {
        let args = QueryArgs {
            date: NaiveDate::from_ymd_opt(2024, 5, 1),
            query: "선거".into(),
        };
        let query = args.to_query();
        assert_eq!(query.to_string(), "2024-05-01 \"선거\"");
    }
}
