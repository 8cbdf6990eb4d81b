//! # newsdesk-sync
//!
//! Keeps a client-side [`RecordStore`](newsdesk_core::RecordStore) in step
//! with the article service.
//!
//! [`SyncEngine`] is the entry point. It combines three update sources over
//! one store:
//!
//! - [`OptimisticMutator`]: local status changes, applied first and rolled
//!   back when the service refuses them
//! - [`RealtimeIngester`]: push events, with a fixed-delay reconnect loop
//! - [`ActivityGatedPoller`]: periodic refreshes while the user is active

pub mod api;
pub mod engine;
pub mod error;
pub mod ingester;
pub mod mutator;
pub mod poller;
pub mod protocol;

#[cfg(test)]
mod testing;

pub use api::{split_lines, EventLines, EventSource, HttpClient, NewsApi};
pub use engine::{EngineSettings, FetchOutcome, FetchState, ResetReport, SyncEngine};
pub use error::SyncError;
pub use ingester::{ConnectionState, RealtimeIngester};
pub use mutator::{MutationIntent, OptimisticMutator};
pub use poller::{ActivityGatedPoller, PollOutcome};
pub use protocol::{decode_line, PushEvent, StatusSummary};
