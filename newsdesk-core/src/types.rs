//! Domain types for the newsdesk record set.
//!
//! Field names follow the article API wire format (`news_id`, `ai_content`,
//! `provider_link_page`); everything the engine does not interpret is kept
//! verbatim in [`WorkItem::extra`].

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseValueError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque article identifier; the only join key across fetches, pushes and polls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NewsId(pub String);

impl NewsId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NewsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for NewsId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NewsId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Work status of an article. Declaration order is workflow order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum WorkStatus {
    #[default]
    #[serde(rename = "미진행", alias = "pending", alias = "PENDING")]
    Pending,
    #[serde(rename = "작업중", alias = "in_progress", alias = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "작업완료", alias = "completed", alias = "COMPLETED")]
    Completed,
}

impl WorkStatus {
    pub const ALL: [WorkStatus; 3] = [
        WorkStatus::Pending,
        WorkStatus::InProgress,
        WorkStatus::Completed,
    ];

    /// Next status in the click cycle: pending → in progress → completed → pending.
    pub fn next(self) -> Self {
        match self {
            WorkStatus::Pending => WorkStatus::InProgress,
            WorkStatus::InProgress => WorkStatus::Completed,
            WorkStatus::Completed => WorkStatus::Pending,
        }
    }

    /// Wire label, as stored by the article service.
    pub fn label(self) -> &'static str {
        match self {
            WorkStatus::Pending => "미진행",
            WorkStatus::InProgress => "작업중",
            WorkStatus::Completed => "작업완료",
        }
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for WorkStatus {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "미진행" => return Ok(WorkStatus::Pending),
            "작업중" => return Ok(WorkStatus::InProgress),
            "작업완료" => return Ok(WorkStatus::Completed),
            _ => {}
        }
        match trimmed.to_ascii_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(WorkStatus::Pending),
            "in_progress" | "inprogress" => Ok(WorkStatus::InProgress),
            "completed" | "done" => Ok(WorkStatus::Completed),
            _ => Err(ParseValueError::new(
                "status",
                s,
                "pending, in-progress, completed",
            )),
        }
    }
}

/// `null` and a missing field both mean pending.
fn status_or_default<'de, D>(deserializer: D) -> Result<WorkStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<WorkStatus>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One article under management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(rename = "news_id")]
    pub id: NewsId,
    #[serde(default, deserialize_with = "status_or_default")]
    pub status: WorkStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_link_page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dateline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(rename = "ai_content", default, skip_serializing_if = "Option::is_none")]
    pub generated_content: Option<String>,
    /// Fields the engine never looks at (`hilight`, `category`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkItem {
    pub fn new(id: impl Into<NewsId>, status: WorkStatus) -> Self {
        Self {
            id: id.into(),
            status,
            title: None,
            content: None,
            provider: None,
            byline: None,
            provider_link_page: None,
            dateline: None,
            published_at: None,
            generated_content: None,
            extra: Map::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_dateline(mut self, dateline: impl Into<String>) -> Self {
        self.dateline = Some(dateline.into());
        self
    }

    /// Display timestamp: `dateline`, falling back to `published_at`.
    pub fn timestamp(&self) -> Option<&str> {
        self.dateline
            .as_deref()
            .or(self.published_at.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn has_generated_content(&self) -> bool {
        self.generated_content.is_some()
    }
}

/// Partial update carried by push events and mutations.
///
/// Only the two mutable fields can be patched; passthrough payload is never
/// touched after a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkPatch {
    pub status: Option<WorkStatus>,
    pub generated_content: Option<String>,
}

impl WorkPatch {
    pub fn status(status: WorkStatus) -> Self {
        Self {
            status: Some(status),
            generated_content: None,
        }
    }

    pub fn generated_content(content: impl Into<String>) -> Self {
        Self {
            status: None,
            generated_content: Some(content.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.generated_content.is_none()
    }

    /// Apply onto `item`; returns whether anything changed.
    pub fn apply_to(&self, item: &mut WorkItem) -> bool {
        let mut changed = false;
        if let Some(status) = self.status {
            if item.status != status {
                item.status = status;
                changed = true;
            }
        }
        if let Some(content) = &self.generated_content {
            if item.generated_content.as_ref() != Some(content) {
                item.generated_content = Some(content.clone());
                changed = true;
            }
        }
        changed
    }
}

/// Selects a record set: one publication date plus a free-text filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewsQuery {
    pub date: NaiveDate,
    #[serde(default)]
    pub text: String,
}

impl NewsQuery {
    pub fn new(date: NaiveDate, text: impl Into<String>) -> Self {
        Self {
            date,
            text: text.into(),
        }
    }

    /// Today's articles (local date), no text filter.
    pub fn today() -> Self {
        Self::new(Local::now().date_naive(), "")
    }

    /// Query-string pairs for `GET /api/news`.
    pub fn query_params(&self) -> [(&'static str, String); 2] {
        [
            ("date", self.date.format("%Y-%m-%d").to_string()),
            ("query", self.text.clone()),
        ]
    }
}

impl fmt::Display for NewsQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            write!(f, "{}", self.date.format("%Y-%m-%d"))
        } else {
            write!(f, "{} \"{}\"", self.date.format("%Y-%m-%d"), self.text)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
