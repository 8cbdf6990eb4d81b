//! Wire formats of the article service.
//!
//! - JSON response envelope shared by every REST endpoint
//! - status write request body
//! - newline-delimited push events (optionally SSE-framed)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use newsdesk_core::{NewsId, WorkPatch, WorkStatus};

use crate::error::{malformed, SyncError};

/// `{success, data?, message?, total?}`, the shape of every REST response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub total: Option<usize>,
}

impl<T> ApiEnvelope<T> {
    /// `success: false` becomes [`SyncError::ServerRejected`].
    pub fn into_data(self, fallback_message: &str) -> Result<Option<T>, SyncError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(SyncError::ServerRejected {
                message: self
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| fallback_message.to_string()),
            })
        }
    }
}

/// Body of `POST /api/news/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdateRequest<'a> {
    pub news_id: &'a NewsId,
    pub status: WorkStatus,
}

/// `GET /api/news/status/summary` payload: counters over every article the
/// server has ever tracked, not just the current query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusSummary {
    #[serde(rename = "미진행", default)]
    pub pending: usize,
    #[serde(rename = "작업중", default)]
    pub in_progress: usize,
    #[serde(rename = "작업완료", default)]
    pub completed: usize,
    #[serde(rename = "전체", default)]
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Push events
// ---------------------------------------------------------------------------

/// A decoded push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    StatusChanged {
        id: NewsId,
        status: WorkStatus,
    },
    /// Generated text became available. Events that only announce the
    /// generation carry no text; the record is then marked with an empty body.
    ContentGenerated {
        id: NewsId,
        content: Option<String>,
    },
}

impl PushEvent {
    pub fn id(&self) -> &NewsId {
        match self {
            PushEvent::StatusChanged { id, .. } | PushEvent::ContentGenerated { id, .. } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::StatusChanged { .. } => STATUS_CHANGE,
            PushEvent::ContentGenerated { .. } => AI_CONTENT_GENERATED,
        }
    }

    pub fn to_patch(&self) -> WorkPatch {
        match self {
            PushEvent::StatusChanged { status, .. } => WorkPatch::status(*status),
            PushEvent::ContentGenerated { content, .. } => {
                WorkPatch::generated_content(content.clone().unwrap_or_default())
            }
        }
    }
}

const STATUS_CHANGE: &str = "status_change";
const AI_CONTENT_GENERATED: &str = "ai_content_generated";

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    news_id: Option<NewsId>,
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    ai_content: Option<String>,
}

/// Decode one line of the push stream.
///
/// Returns `Ok(None)` for lines that carry no event: blank keep-alives, SSE
/// comments (`:`) and SSE fields other than `data:`.
pub fn decode_line(line: &str) -> Result<Option<PushEvent>, SyncError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() || line.starts_with(':') {
        return Ok(None);
    }
    let payload = match line.strip_prefix("data:") {
        Some(rest) => rest.trim_start(),
        None if is_sse_field(line) => return Ok(None),
        None => line,
    };
    decode_event(payload).map(Some)
}

fn is_sse_field(line: &str) -> bool {
    ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
}

/// Decode one JSON event object.
pub fn decode_event(payload: &str) -> Result<PushEvent, SyncError> {
    let raw: RawEvent =
        serde_json::from_str(payload).map_err(|err| malformed(format!("invalid JSON: {err}")))?;
    let id = raw
        .data
        .news_id
        .filter(|id| !id.0.is_empty())
        .ok_or_else(|| malformed(format!("{} event without news_id", raw.kind)))?;

    match raw.kind.as_str() {
        STATUS_CHANGE => {
            let value = raw
                .data
                .status
                .ok_or_else(|| malformed(format!("status_change for {id} without status")))?;
            let status: WorkStatus = serde_json::from_value(value.clone())
                .map_err(|_| malformed(format!("status_change for {id} with unknown status {value}")))?;
            Ok(PushEvent::StatusChanged { id, status })
        }
        AI_CONTENT_GENERATED => Ok(PushEvent::ContentGenerated {
            id,
            content: raw.data.ai_content,
        }),
        other => Err(malformed(format!("unknown event type '{other}'"))),
    }
}
