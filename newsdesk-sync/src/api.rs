//! Remote service boundary.
//!
//! The engine talks to the article service only through two traits:
//! [`NewsApi`] for request/response calls and [`EventSource`] for the push
//! stream. [`HttpClient`] implements both over reqwest; tests substitute
//! in-memory fakes.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use reqwest::{header, Response, StatusCode};
use serde::de::DeserializeOwned;

use newsdesk_core::{NewsId, NewsQuery, NewsdeskConfig, WorkItem, WorkStatus};

use crate::error::SyncError;
use crate::protocol::{ApiEnvelope, StatusSummary, StatusUpdateRequest};

const NEWS_PATH: &str = "/api/news";
const STATUS_PATH: &str = "/api/news/status";
const SUMMARY_PATH: &str = "/api/news/status/summary";

/// Lines of the push stream, in arrival order. Ends when the server closes.
pub type EventLines = Pin<Box<dyn Stream<Item = Result<String, SyncError>> + Send>>;

/// Request/response side of the article service.
#[async_trait]
pub trait NewsApi: Send + Sync {
    /// Full record set for `query`.
    async fn fetch_news(&self, query: &NewsQuery) -> Result<Vec<WorkItem>, SyncError>;

    /// Persist one status change.
    async fn update_status(&self, id: &NewsId, status: WorkStatus) -> Result<(), SyncError>;

    /// Server-wide status counters.
    async fn status_summary(&self) -> Result<StatusSummary, SyncError>;
}

/// Push side of the article service. `connect` resolving `Ok` is the handshake.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&self) -> Result<EventLines, SyncError>;
}

/// reqwest-backed implementation of both service traits.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    events_path: String,
    request_timeout: std::time::Duration,
}

impl HttpClient {
    pub fn new(config: &NewsdeskConfig) -> Result<Self, SyncError> {
        config.validate()?;
        // No client-wide timeout: it would also cut the long-lived push stream.
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            events_path: config.events_path.clone(),
            request_timeout: config.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl NewsApi for HttpClient {
    async fn fetch_news(&self, query: &NewsQuery) -> Result<Vec<WorkItem>, SyncError> {
        let response = self
            .client
            .get(self.url(NEWS_PATH))
            .query(&query.query_params())
            .timeout(self.request_timeout)
            .send()
            .await?;
        let envelope: ApiEnvelope<Vec<WorkItem>> = read_envelope(response, NEWS_PATH).await?;
        let items = envelope
            .into_data("failed to load news")?
            .unwrap_or_default();
        tracing::debug!(query = %query, count = items.len(), "fetched record set");
        Ok(items)
    }

    async fn update_status(&self, id: &NewsId, status: WorkStatus) -> Result<(), SyncError> {
        let response = self
            .client
            .post(self.url(STATUS_PATH))
            .json(&StatusUpdateRequest { news_id: id, status })
            .timeout(self.request_timeout)
            .send()
            .await?;
        let envelope: ApiEnvelope<serde_json::Value> = read_envelope(response, STATUS_PATH).await?;
        envelope.into_data("failed to update status")?;
        Ok(())
    }

    async fn status_summary(&self) -> Result<StatusSummary, SyncError> {
        let response = self
            .client
            .get(self.url(SUMMARY_PATH))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let envelope: ApiEnvelope<StatusSummary> = read_envelope(response, SUMMARY_PATH).await?;
        Ok(envelope
            .into_data("failed to load status summary")?
            .unwrap_or_default())
    }
}

#[async_trait]
impl EventSource for HttpClient {
    async fn connect(&self) -> Result<EventLines, SyncError> {
        let response = self
            .client
            .get(self.url(&self.events_path))
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::NetworkFailure(format!(
                "push endpoint answered HTTP {status}"
            )));
        }
        Ok(split_lines(response.bytes_stream()))
    }
}

/// Decode a JSON envelope.
///
/// Error statuses with a JSON `{success: false, message}` body are explicit
/// rejections; any other error status is a network failure.
async fn read_envelope<T>(
    response: Response,
    endpoint: &'static str,
) -> Result<ApiEnvelope<T>, SyncError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        if let Ok(envelope) = serde_json::from_slice::<ApiEnvelope<serde_json::Value>>(&body) {
            if !envelope.success {
                envelope.into_data(&format!("HTTP {status}"))?;
            }
        }
        return Err(SyncError::NetworkFailure(format!(
            "{endpoint} answered HTTP {}",
            status_label(status)
        )));
    }

    serde_json::from_slice(&body).map_err(|err| SyncError::InvalidResponse {
        endpoint,
        reason: err.to_string(),
    })
}

fn status_label(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

/// Longest line accepted from the push stream before it is dropped.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Re-chunk a byte stream into `\n`-terminated lines (`\r\n` tolerated).
///
/// A transport error is yielded once and ends the stream; a trailing partial
/// line is flushed when the server closes. A line longer than
/// [`MAX_LINE_BYTES`] ends the stream with [`SyncError::MalformedEvent`].
pub fn split_lines<S, B, E>(bytes: S) -> EventLines
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<SyncError>,
{
    split_lines_capped(bytes, MAX_LINE_BYTES)
}

fn split_lines_capped<S, B, E>(bytes: S, max_line: usize) -> EventLines
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<SyncError>,
{
    struct LineState<S> {
        bytes: Pin<Box<S>>,
        buffer: Vec<u8>,
        ready: VecDeque<String>,
        failed: Option<SyncError>,
        done: bool,
    }

    let state = LineState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        ready: VecDeque::new(),
        failed: None,
        done: false,
    };

    Box::pin(stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            if let Some(err) = state.failed.take() {
                return Some((Err(err), state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    while let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                        let raw: Vec<u8> = state.buffer.drain(..=pos).collect();
                        state.ready.push_back(decode_line_bytes(&raw));
                    }
                    if state.buffer.len() > max_line {
                        state.done = true;
                        state.buffer.clear();
                        state.failed = Some(crate::error::malformed(format!(
                            "event line exceeds {max_line} bytes without a newline"
                        )));
                    }
                }
                Some(Err(err)) => {
                    state.done = true;
                    return Some((Err(err.into()), state));
                }
                None => {
                    state.done = true;
                    if !state.buffer.is_empty() {
                        let rest = std::mem::take(&mut state.buffer);
                        state.ready.push_back(decode_line_bytes(&rest));
                    }
                }
            }
        }
    }))
}

fn decode_line_bytes(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
