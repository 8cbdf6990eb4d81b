//! newsdesk core library: domain types, the client-side record store,
//! activity tracking, view helpers and configuration.
//!
//! - [`types`]: newtypes and domain structs
//! - [`store`]: [`RecordStore`], the single table every update source writes to
//! - [`activity`]: [`ActivityTracker`]
//! - [`view`]: filtering, counting and ordering of snapshots
//! - [`config`]: [`NewsdeskConfig`] load / defaults
//! - [`error`]: [`ConfigError`], [`ParseValueError`]

pub mod activity;
pub mod config;
pub mod error;
pub mod store;
pub mod types;
pub mod view;

pub use activity::ActivityTracker;
pub use config::NewsdeskConfig;
pub use error::{ConfigError, ParseValueError};
pub use store::{
    PatchOutcome, QueryTicket, RecordStore, ReplaceOutcome, Snapshot, StoreSubscription,
};
pub use types::{NewsId, NewsQuery, WorkItem, WorkPatch, WorkStatus};
pub use view::{sort_items, SortKey, SortOrder, StatusCounts, StatusFilter};
