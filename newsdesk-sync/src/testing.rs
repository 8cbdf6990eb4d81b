//! In-memory fakes of the service traits for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::stream;
use tokio::sync::{mpsc, oneshot};

use newsdesk_core::{NewsId, NewsQuery, RecordStore, WorkItem, WorkStatus};

use crate::api::{EventLines, EventSource, NewsApi};
use crate::error::SyncError;
use crate::protocol::StatusSummary;

pub(crate) fn query(text: &str) -> NewsQuery {
    NewsQuery::new(NaiveDate::from_ymd_opt(2024, 5, 1).expect("date"), text)
}

pub(crate) fn item(id: &str, status: WorkStatus) -> WorkItem {
    WorkItem::new(id, status).with_title(format!("article {id}"))
}

pub(crate) fn store_with(items: &[(&str, WorkStatus)]) -> RecordStore {
    let store = RecordStore::new();
    let ticket = store.begin_query(query(""));
    store.replace_all(
        &ticket,
        items.iter().map(|(id, status)| item(id, *status)).collect(),
    );
    store
}

/// Let every ready task on the current-thread runtime run.
pub(crate) async fn drain() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// NewsApi
// ---------------------------------------------------------------------------

pub(crate) enum WriteScript {
    Succeed,
    Reject(&'static str),
    NetworkDown,
    /// Wait for the test: `true` succeeds, `false` (or a dropped sender) fails.
    Hold(oneshot::Receiver<bool>),
}

#[derive(Default)]
pub(crate) struct FakeApi {
    records: Mutex<Vec<WorkItem>>,
    by_query: Mutex<HashMap<String, Vec<WorkItem>>>,
    fetch_delay: Mutex<Duration>,
    fetch_error: Mutex<Option<String>>,
    fetches: AtomicUsize,
    scripts: Mutex<VecDeque<WriteScript>>,
    rejected_ids: Mutex<HashSet<NewsId>>,
    writes: Mutex<Vec<(NewsId, WorkStatus)>>,
}

impl FakeApi {
    pub(crate) fn with_records(items: Vec<WorkItem>) -> Self {
        let api = Self::default();
        *api.records.lock().unwrap() = items;
        api
    }

    pub(crate) fn set_records_for(&self, text: &str, items: Vec<WorkItem>) {
        self.by_query.lock().unwrap().insert(text.to_string(), items);
    }

    pub(crate) fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub(crate) fn fail_fetches(&self, message: Option<&str>) {
        *self.fetch_error.lock().unwrap() = message.map(str::to_string);
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn push_script(&self, script: WriteScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub(crate) fn hold_next_write(&self) -> oneshot::Sender<bool> {
        let (tx, rx) = oneshot::channel();
        self.push_script(WriteScript::Hold(rx));
        tx
    }

    pub(crate) fn reject_writes_for(&self, id: &str) {
        self.rejected_ids.lock().unwrap().insert(NewsId::from(id));
    }

    pub(crate) fn writes(&self) -> Vec<(NewsId, WorkStatus)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl NewsApi for FakeApi {
    async fn fetch_news(&self, query: &NewsQuery) -> Result<Vec<WorkItem>, SyncError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.fetch_error.lock().unwrap().clone() {
            return Err(SyncError::NetworkFailure(message));
        }
        if let Some(items) = self.by_query.lock().unwrap().get(&query.text) {
            return Ok(items.clone());
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn update_status(&self, id: &NewsId, status: WorkStatus) -> Result<(), SyncError> {
        self.writes.lock().unwrap().push((id.clone(), status));
        if self.rejected_ids.lock().unwrap().contains(id) {
            return Err(SyncError::ServerRejected {
                message: format!("{id} is locked"),
            });
        }
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(WriteScript::Succeed);
        match script {
            WriteScript::Succeed => Ok(()),
            WriteScript::Reject(message) => Err(SyncError::ServerRejected {
                message: message.to_string(),
            }),
            WriteScript::NetworkDown => Err(SyncError::NetworkFailure("connection reset".into())),
            WriteScript::Hold(rx) => match rx.await {
                Ok(true) => Ok(()),
                _ => Err(SyncError::NetworkFailure("connection reset".into())),
            },
        }
    }

    async fn status_summary(&self) -> Result<StatusSummary, SyncError> {
        let records = self.records.lock().unwrap();
        let count = |status| records.iter().filter(|i| i.status == status).count();
        Ok(StatusSummary {
            pending: count(WorkStatus::Pending),
            in_progress: count(WorkStatus::InProgress),
            completed: count(WorkStatus::Completed),
            total: records.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// EventSource
// ---------------------------------------------------------------------------

pub(crate) type LineSender = mpsc::UnboundedSender<Result<String, SyncError>>;

/// Each `connect` pops the next scripted outcome; an empty script refuses.
#[derive(Default)]
pub(crate) struct FakeEvents {
    scripted: Mutex<VecDeque<Result<mpsc::UnboundedReceiver<Result<String, SyncError>>, String>>>,
    handshake: Mutex<Duration>,
    connects: AtomicUsize,
}

impl FakeEvents {
    /// Script a connection that succeeds; the sender feeds its lines and
    /// dropping it closes the stream.
    pub(crate) fn accept_next(&self) -> LineSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripted.lock().unwrap().push_back(Ok(rx));
        tx
    }

    pub(crate) fn refuse_next(&self, reason: &str) {
        self.scripted
            .lock()
            .unwrap()
            .push_back(Err(reason.to_string()));
    }

    pub(crate) fn set_handshake(&self, duration: Duration) {
        *self.handshake.lock().unwrap() = duration;
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for FakeEvents {
    async fn connect(&self) -> Result<EventLines, SyncError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let handshake = *self.handshake.lock().unwrap();
        if !handshake.is_zero() {
            tokio::time::sleep(handshake).await;
        }
        let next = self.scripted.lock().unwrap().pop_front();
        match next {
            Some(Ok(rx)) => Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|line| (line, rx))
            }))),
            Some(Err(reason)) => Err(SyncError::NetworkFailure(reason)),
            None => Err(SyncError::NetworkFailure("connection refused".into())),
        }
    }
}
