//! Background refresh of the current query while the user is active.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use newsdesk_core::{ActivityTracker, RecordStore, ReplaceOutcome};

use crate::api::NewsApi;
use crate::error::SyncError;

/// What one poll tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Refreshed { count: usize },
    /// No interaction within the idle threshold.
    SkippedIdle,
    /// Nothing on screen yet.
    SkippedNoQuery,
    /// The query changed while the fetch was in flight.
    Superseded,
    /// Logged; the next tick retries.
    Failed,
}

pub struct ActivityGatedPoller {
    api: Arc<dyn NewsApi>,
    store: RecordStore,
    activity: ActivityTracker,
    interval: Duration,
    idle_threshold: Duration,
}

impl fmt::Debug for ActivityGatedPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityGatedPoller")
            .field("interval", &self.interval)
            .field("idle_threshold", &self.idle_threshold)
            .finish()
    }
}

impl ActivityGatedPoller {
    pub fn new(
        api: Arc<dyn NewsApi>,
        store: RecordStore,
        activity: ActivityTracker,
        interval: Duration,
        idle_threshold: Duration,
    ) -> Self {
        Self {
            api,
            store,
            activity,
            interval,
            idle_threshold,
        }
    }

    /// Tick every interval until `shutdown` fires. An in-flight fetch is
    /// abandoned on shutdown.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), SyncError> {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await; // the first tick completes immediately

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = interval.tick() => {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = self.tick() => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// One gated refresh. Never surfaces errors.
    pub async fn tick(&self) -> PollOutcome {
        if !self.activity.is_active_within(self.idle_threshold) {
            tracing::debug!(
                idle_secs = self.activity.idle_for().as_secs(),
                "user idle; skipping poll",
            );
            return PollOutcome::SkippedIdle;
        }
        let Some(ticket) = self.store.current_ticket() else {
            return PollOutcome::SkippedNoQuery;
        };

        match self.api.fetch_news(ticket.query()).await {
            Ok(items) => match self.store.replace_all(&ticket, items) {
                ReplaceOutcome::Applied { count } => {
                    tracing::debug!(query = %ticket.query(), count, "poll refreshed records");
                    PollOutcome::Refreshed { count }
                }
                ReplaceOutcome::Superseded => PollOutcome::Superseded,
            },
            Err(err) => {
                tracing::warn!(
                    query = %ticket.query(),
                    error = %err,
                    "background refresh failed",
                );
                PollOutcome::Failed
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
