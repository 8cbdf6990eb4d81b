//! Push-stream ingestion.
//!
//! One logical connection to the event endpoint, driven as an explicit state
//! machine:
//!
//! ```text
//! Disconnected -> Connecting -> Open -> Disconnected -> (delay) -> Connecting ...
//!                     |                      ^
//!                     +---- handshake fails -+
//! any -> Closed (shutdown, terminal)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{broadcast, watch};

use newsdesk_core::{PatchOutcome, RecordStore};

use crate::api::{EventLines, EventSource};
use crate::error::SyncError;
use crate::protocol::{decode_line, PushEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Why an open stream stopped.
enum StreamEnd {
    Shutdown,
    Dropped,
}

pub struct RealtimeIngester {
    source: Arc<dyn EventSource>,
    store: RecordStore,
    reconnect_delay: Duration,
    state: watch::Sender<ConnectionState>,
}

impl fmt::Debug for RealtimeIngester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeIngester")
            .field("state", &self.state())
            .field("reconnect_delay", &self.reconnect_delay)
            .finish()
    }
}

impl RealtimeIngester {
    pub fn new(source: Arc<dyn EventSource>, store: RecordStore, reconnect_delay: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            source,
            store,
            reconnect_delay,
            state,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connect, read and reconnect until `shutdown` fires.
    ///
    /// Connection problems never end the loop: they are logged and retried
    /// after the reconnect delay, which is always waited out in full.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), SyncError> {
        loop {
            self.transition(ConnectionState::Connecting);
            let connected = tokio::select! {
                _ = shutdown.recv() => break,
                result = self.source.connect() => result,
            };

            match connected {
                Ok(lines) => {
                    self.transition(ConnectionState::Open);
                    tracing::info!("push stream open");
                    if let StreamEnd::Shutdown = self.read(lines, &mut shutdown).await {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        retry_in_secs = self.reconnect_delay.as_secs_f64(),
                        "push stream handshake failed",
                    );
                }
            }

            self.transition(ConnectionState::Disconnected);
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        self.transition(ConnectionState::Closed);
        tracing::info!("push stream closed");
        Ok(())
    }

    async fn read(&self, mut lines: EventLines, shutdown: &mut broadcast::Receiver<()>) -> StreamEnd {
        loop {
            tokio::select! {
                _ = shutdown.recv() => return StreamEnd::Shutdown,
                next = lines.next() => match next {
                    Some(Ok(line)) => {
                        self.handle_line(&line);
                    }
                    Some(Err(err)) => {
                        tracing::warn!(
                            error = %err,
                            retry_in_secs = self.reconnect_delay.as_secs_f64(),
                            "push stream transport error",
                        );
                        return StreamEnd::Dropped;
                    }
                    None => {
                        tracing::info!(
                            retry_in_secs = self.reconnect_delay.as_secs_f64(),
                            "push stream ended by server",
                        );
                        return StreamEnd::Dropped;
                    }
                },
            }
        }
    }

    /// Decode one stream line and merge it into the store.
    ///
    /// Returns `None` for lines without an event, including malformed ones,
    /// which are dropped with a warning.
    pub fn handle_line(&self, line: &str) -> Option<(PushEvent, PatchOutcome)> {
        let event = match decode_line(line) {
            Ok(Some(event)) => event,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(error = %err, "dropping push event");
                return None;
            }
        };
        let outcome = self.store.patch(event.id(), &event.to_patch());
        tracing::debug!(
            news_id = %event.id(),
            kind = event.kind(),
            outcome = ?outcome,
            "applied push event",
        );
        Some((event, outcome))
    }

    fn transition(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == next || *state == ConnectionState::Closed {
                return false;
            }
            tracing::debug!(from = %state, to = %next, "push connection state");
            *state = next;
            true
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
