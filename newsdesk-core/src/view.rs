//! Read-side helpers for the presentation layer: status filter, counters and
//! display ordering. None of these touch the store.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;

use crate::error::ParseValueError;
use crate::types::{WorkItem, WorkStatus};

/// Which rows to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    InProgress,
    Completed,
}

impl StatusFilter {
    pub fn matches(self, item: &WorkItem) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Pending => item.status == WorkStatus::Pending,
            StatusFilter::InProgress => item.status == WorkStatus::InProgress,
            StatusFilter::Completed => item.status == WorkStatus::Completed,
        }
    }

    pub fn apply<'a>(self, items: &'a [WorkItem]) -> Vec<&'a WorkItem> {
        items.iter().filter(|item| self.matches(item)).collect()
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::All => write!(f, "all"),
            StatusFilter::Pending => write!(f, "pending"),
            StatusFilter::InProgress => write!(f, "in-progress"),
            StatusFilter::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "all" => Ok(StatusFilter::All),
            "pending" => Ok(StatusFilter::Pending),
            "in-progress" | "inprogress" => Ok(StatusFilter::InProgress),
            "completed" => Ok(StatusFilter::Completed),
            _ => Err(ParseValueError::new(
                "filter",
                s,
                "all, pending, in-progress, completed",
            )),
        }
    }
}

/// Per-status totals for the stats bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl StatusCounts {
    pub fn from_items(items: &[WorkItem]) -> Self {
        let mut counts = Self {
            total: items.len(),
            ..Self::default()
        };
        for item in items {
            match item.status {
                WorkStatus::Pending => counts.pending += 1,
                WorkStatus::InProgress => counts.in_progress += 1,
                WorkStatus::Completed => counts.completed += 1,
            }
        }
        counts
    }

    /// Share of completed work, 0–100.
    pub fn completion_percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        u8::try_from(self.completed * 100 / self.total).unwrap_or(100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// `dateline`, falling back to `published_at`.
    #[default]
    Time,
    /// Workflow order (미진행, 작업중, 작업완료), not the alphabetical order
    /// of the Korean labels.
    Status,
}

impl FromStr for SortKey {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "time" => Ok(SortKey::Time),
            "status" => Ok(SortKey::Status),
            _ => Err(ParseValueError::new("sort key", s, "time, status")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortKey {
    /// Newest first for time, workflow order for status.
    pub fn default_order(self) -> SortOrder {
        match self {
            SortKey::Time => SortOrder::Desc,
            SortKey::Status => SortOrder::Asc,
        }
    }
}

/// Stable in-place sort of a display copy; ties keep server order.
pub fn sort_items(items: &mut [WorkItem], key: SortKey, order: SortOrder) {
    items.sort_by(|a, b| {
        let ordering = match key {
            SortKey::Time => compare_time(a, b),
            SortKey::Status => a.status.cmp(&b.status),
        };
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

/// Unparseable or missing timestamps sort before every parsed one, then by
/// raw text among themselves.
fn compare_time(a: &WorkItem, b: &WorkItem) -> Ordering {
    time_key(a).cmp(&time_key(b))
}

fn time_key(item: &WorkItem) -> (Option<NaiveDateTime>, &str) {
    let raw = item.timestamp().unwrap_or_default();
    (parse_timestamp(raw), raw)
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_local());
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y%m%d%H%M%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}
