//! [`SyncEngine`]: the facade the presentation layer talks to.
//!
//! Owns one record store and one activity tracker, wires the mutator, the
//! realtime ingester and the poller to them, and runs the two background
//! tasks until [`SyncEngine::shutdown`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{broadcast, watch};
use tokio::task::{AbortHandle, JoinHandle};

use newsdesk_core::config::{
    DEFAULT_IDLE_THRESHOLD_SECS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_RECONNECT_DELAY_SECS,
};
use newsdesk_core::{
    ActivityTracker, NewsId, NewsQuery, NewsdeskConfig, RecordStore, ReplaceOutcome, Snapshot,
    StoreSubscription, WorkItem, WorkStatus,
};

use crate::api::{EventSource, HttpClient, NewsApi};
use crate::error::SyncError;
use crate::ingester::{ConnectionState, RealtimeIngester};
use crate::mutator::OptimisticMutator;
use crate::poller::ActivityGatedPoller;
use crate::protocol::StatusSummary;

/// Timing knobs for the background tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    pub idle_threshold: Duration,
    pub reconnect_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            idle_threshold: Duration::from_secs(DEFAULT_IDLE_THRESHOLD_SECS),
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
        }
    }
}

impl From<&NewsdeskConfig> for EngineSettings {
    fn from(config: &NewsdeskConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            idle_threshold: config.idle_threshold(),
            reconnect_delay: config.reconnect_delay(),
        }
    }
}

/// Loading flag and banner text for foreground fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchState {
    pub loading: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied { count: usize },
    /// A newer query took over before this fetch landed.
    Superseded,
}

/// Result of [`SyncEngine::reset_all`].
#[derive(Debug, Default)]
pub struct ResetReport {
    pub reset: usize,
    pub failed: Vec<(NewsId, SyncError)>,
}

impl ResetReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The foreground fetch task and the query generation it was issued for.
struct ForegroundFetch {
    generation: u64,
    handle: AbortHandle,
}

struct RunningTasks {
    shutdown: broadcast::Sender<()>,
    ingester: JoinHandle<Result<(), SyncError>>,
    poller: JoinHandle<Result<(), SyncError>>,
}

pub struct SyncEngine {
    store: RecordStore,
    activity: ActivityTracker,
    api: Arc<dyn NewsApi>,
    mutator: OptimisticMutator,
    ingester: Arc<RealtimeIngester>,
    poller: Arc<ActivityGatedPoller>,
    fetch_state: Arc<watch::Sender<FetchState>>,
    foreground: Mutex<Option<ForegroundFetch>>,
    tasks: Mutex<Option<RunningTasks>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("records", &self.store.len())
            .field("connection", &self.connection_state())
            .field("running", &self.is_running())
            .finish()
    }
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn NewsApi>,
        events: Arc<dyn EventSource>,
        settings: EngineSettings,
    ) -> Self {
        let store = RecordStore::new();
        let activity = ActivityTracker::new();
        let mutator = OptimisticMutator::new(store.clone(), Arc::clone(&api));
        let ingester = Arc::new(RealtimeIngester::new(
            events,
            store.clone(),
            settings.reconnect_delay,
        ));
        let poller = Arc::new(ActivityGatedPoller::new(
            Arc::clone(&api),
            store.clone(),
            activity.clone(),
            settings.poll_interval,
            settings.idle_threshold,
        ));
        let (fetch_state, _) = watch::channel(FetchState::default());

        Self {
            store,
            activity,
            api,
            mutator,
            ingester,
            poller,
            fetch_state: Arc::new(fetch_state),
            foreground: Mutex::new(None),
            tasks: Mutex::new(None),
        }
    }

    /// Engine over the HTTP service described by `config`.
    pub fn from_config(config: &NewsdeskConfig) -> Result<Self, SyncError> {
        let client = Arc::new(HttpClient::new(config)?);
        Ok(Self::new(
            client.clone(),
            client,
            EngineSettings::from(config),
        ))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Spawn the ingester and poller. Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut tasks = lock(&self.tasks);
        if tasks.is_some() {
            return;
        }
        let (shutdown, _) = broadcast::channel::<()>(4);

        let ingester = {
            let ingester = Arc::clone(&self.ingester);
            let shutdown_rx = shutdown.subscribe();
            tokio::spawn(async move { ingester.run(shutdown_rx).await })
        };
        let poller = {
            let poller = Arc::clone(&self.poller);
            let shutdown_rx = shutdown.subscribe();
            tokio::spawn(async move { poller.run(shutdown_rx).await })
        };

        tracing::info!("sync engine started");
        *tasks = Some(RunningTasks {
            shutdown,
            ingester,
            poller,
        });
    }

    pub fn is_running(&self) -> bool {
        lock(&self.tasks).is_some()
    }

    /// Stop the background tasks, wait for them and discard every record.
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        if let Some(foreground) = lock(&self.foreground).take() {
            foreground.handle.abort();
        }
        let Some(tasks) = lock(&self.tasks).take() else {
            self.store.clear();
            return Ok(());
        };
        let _ = tasks.shutdown.send(());
        let (ingester, poller) = tokio::join!(tasks.ingester, tasks.poller);
        self.store.clear();
        handle_join("ingester", ingester)?;
        handle_join("poller", poller)?;
        tracing::info!("sync engine stopped");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn get(&self, id: &NewsId) -> Option<WorkItem> {
        self.store.get(id)
    }

    pub fn subscribe(&self) -> StoreSubscription {
        self.store.subscribe()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn activity(&self) -> &ActivityTracker {
        &self.activity
    }

    pub fn fetch_state(&self) -> FetchState {
        self.fetch_state.borrow().clone()
    }

    pub fn watch_fetch_state(&self) -> watch::Receiver<FetchState> {
        self.fetch_state.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.ingester.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.ingester.watch_state()
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    pub fn record_activity(&self) {
        self.activity.record_activity();
    }

    /// Optimistically set one record's status; see [`OptimisticMutator`].
    pub async fn set_status(&self, id: &NewsId, status: WorkStatus) -> Result<(), SyncError> {
        self.activity.record_activity();
        self.mutator.set_status(id, status).await
    }

    /// Load `query` in the foreground.
    ///
    /// Switching to a different query empties the table and abandons the
    /// previous foreground fetch. Errors are returned and also kept in
    /// [`FetchState::last_error`] while `query` stays current.
    pub async fn refetch(&self, query: NewsQuery) -> Result<FetchOutcome, SyncError> {
        let ticket = self.store.begin_query(query);
        let generation = ticket.generation();
        self.fetch_state.send_modify(|state| {
            state.loading = true;
            state.last_error = None;
        });

        let api = Arc::clone(&self.api);
        let store = self.store.clone();
        let fetch_state = Arc::clone(&self.fetch_state);
        let fetch = tokio::spawn(async move {
            let result = api.fetch_news(ticket.query()).await;
            if !store.is_current(&ticket) {
                return Ok(FetchOutcome::Superseded);
            }
            let outcome = match result {
                Ok(items) => match store.replace_all(&ticket, items) {
                    ReplaceOutcome::Applied { count } => {
                        tracing::info!(query = %ticket.query(), count, "loaded records");
                        Ok(FetchOutcome::Applied { count })
                    }
                    ReplaceOutcome::Superseded => Ok(FetchOutcome::Superseded),
                },
                Err(err) => {
                    tracing::warn!(query = %ticket.query(), error = %err, "fetch failed");
                    Err(err)
                }
            };
            fetch_state.send_modify(|state| {
                state.loading = false;
                state.last_error = outcome.as_ref().err().map(SyncError::user_message);
            });
            outcome
        });

        self.adopt_foreground(generation, fetch.abort_handle());

        match fetch.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => Ok(FetchOutcome::Superseded),
            Err(err) => Err(SyncError::TaskFailed {
                task: "fetch",
                reason: err.to_string(),
            }),
        }
    }

    /// Make `handle` the foreground fetch unless a newer query already owns
    /// the slot, in which case `handle` is the stale one and gets aborted.
    fn adopt_foreground(&self, generation: u64, handle: AbortHandle) {
        let mut slot = lock(&self.foreground);
        if let Some(current) = slot.as_ref() {
            if current.generation > generation {
                handle.abort();
                return;
            }
        }
        if let Some(previous) = slot.replace(ForegroundFetch { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Set every non-pending record of the current snapshot back to pending.
    ///
    /// Each record goes through the optimistic mutator on its own, all writes
    /// concurrently; failures are collected rather than aborting the rest.
    pub async fn reset_all(&self) -> ResetReport {
        self.activity.record_activity();
        let snapshot = self.store.snapshot();
        let targets: Vec<NewsId> = snapshot
            .items
            .iter()
            .filter(|item| item.status != WorkStatus::Pending)
            .map(|item| item.id.clone())
            .collect();

        let results = join_all(
            targets
                .iter()
                .map(|id| self.mutator.set_status(id, WorkStatus::Pending)),
        )
        .await;

        let mut report = ResetReport::default();
        for (id, result) in targets.into_iter().zip(results) {
            match result {
                Ok(()) => report.reset += 1,
                Err(err) => report.failed.push((id, err)),
            }
        }
        tracing::info!(
            reset = report.reset,
            failed = report.failed.len(),
            "reset all statuses",
        );
        report
    }

    /// Server-wide status counters.
    pub async fn server_summary(&self) -> Result<StatusSummary, SyncError> {
        self.api.status_summary().await
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if let Some(foreground) = lock(&self.foreground).take() {
            foreground.handle.abort();
        }
        if let Some(tasks) = lock(&self.tasks).take() {
            let _ = tasks.shutdown.send(());
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), SyncError>, tokio::task::JoinError>,
) -> Result<(), SyncError> {
    match result {
        Ok(inner) => inner,
        Err(err) => {
            tracing::error!(task, error = %err, "engine task join failure");
            Err(SyncError::TaskFailed {
                task,
                reason: err.to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
