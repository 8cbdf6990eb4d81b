//! Client-side record store.
//!
//! One table of [`WorkItem`]s keyed by [`NewsId`], written by three sources
//! (optimistic mutations, push events, poll refreshes) and read by the
//! presentation layer. The state lives inside a `tokio::sync::watch` sender:
//! every mutation goes through `send_modify` / `send_if_modified`, which
//! serializes writers and notifies subscribers in one step, and readers take
//! cheap `Arc` snapshots.
//!
//! Full replacements are gated by a [`QueryTicket`]. Starting a new query
//! bumps the store generation; a fetch result carrying an older ticket is
//! discarded on arrival instead of overwriting the current record set.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;

use crate::types::{NewsId, NewsQuery, WorkItem, WorkPatch, WorkStatus};

/// Proof that a fetch was issued for a particular query generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTicket {
    generation: u64,
    query: NewsQuery,
}

impl QueryTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn query(&self) -> &NewsQuery {
        &self.query
    }
}

/// Result of [`RecordStore::replace_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Applied { count: usize },
    /// The ticket's query is no longer current; nothing was written.
    Superseded,
}

/// Result of [`RecordStore::patch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    Unchanged,
    /// Partial events never materialize a record.
    UnknownRecord,
}

/// Immutable view of the store at one revision.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub revision: u64,
    pub query: Option<NewsQuery>,
    pub items: Arc<Vec<WorkItem>>,
}

impl Snapshot {
    pub fn get(&self, id: &NewsId) -> Option<&WorkItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    items: Arc<Vec<WorkItem>>,
    index: HashMap<NewsId, usize>,
    generation: u64,
    query: Option<NewsQuery>,
    revision: u64,
}

impl StoreState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            revision: self.revision,
            query: self.query.clone(),
            items: Arc::clone(&self.items),
        }
    }

    fn ticket(&self) -> Option<QueryTicket> {
        self.query.as_ref().map(|query| QueryTicket {
            generation: self.generation,
            query: query.clone(),
        })
    }

    fn set_items(&mut self, items: Vec<WorkItem>) -> usize {
        let mut index = HashMap::with_capacity(items.len());
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            if index.contains_key(&item.id) {
                tracing::warn!(news_id = %item.id, "duplicate id in record set; keeping first");
                continue;
            }
            index.insert(item.id.clone(), kept.len());
            kept.push(item);
        }
        let count = kept.len();
        self.items = Arc::new(kept);
        self.index = index;
        self.revision += 1;
        count
    }

    fn item_mut(&mut self, id: &NewsId) -> Option<&mut WorkItem> {
        let position = *self.index.get(id)?;
        Arc::make_mut(&mut self.items).get_mut(position)
    }
}

/// Shared handle to the record table. Cloning shares the same table.
#[derive(Debug, Clone)]
pub struct RecordStore {
    state: Arc<watch::Sender<StoreState>>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    /// Empty store with no active query.
    pub fn new() -> Self {
        let (state, _) = watch::channel(StoreState::default());
        Self {
            state: Arc::new(state),
        }
    }

    // -----------------------------------------------------------------------
    // Query lifecycle
    // -----------------------------------------------------------------------

    /// Make `query` the current query and return the ticket fetches must carry.
    ///
    /// A different query empties the table; re-issuing the current query keeps
    /// the rows visible until the refresh lands. Either way every older ticket
    /// stops being current.
    pub fn begin_query(&self, query: NewsQuery) -> QueryTicket {
        let mut ticket = None;
        self.state.send_modify(|state| {
            state.generation += 1;
            if state.query.as_ref() != Some(&query) {
                state.query = Some(query.clone());
                state.set_items(Vec::new());
            }
            ticket = state.ticket();
        });
        ticket.unwrap_or(QueryTicket {
            generation: 0,
            query,
        })
    }

    /// Ticket for the query currently on screen, if any.
    pub fn current_ticket(&self) -> Option<QueryTicket> {
        self.state.borrow().ticket()
    }

    pub fn is_current(&self, ticket: &QueryTicket) -> bool {
        self.state.borrow().generation == ticket.generation
    }

    /// Drop every record and the active query (engine teardown).
    pub fn clear(&self) {
        self.state.send_modify(|state| {
            state.generation += 1;
            state.query = None;
            state.set_items(Vec::new());
        });
    }

    // -----------------------------------------------------------------------
    // Writers
    // -----------------------------------------------------------------------

    /// Atomically replace the whole table with a fetch result.
    pub fn replace_all(&self, ticket: &QueryTicket, items: Vec<WorkItem>) -> ReplaceOutcome {
        let mut outcome = ReplaceOutcome::Superseded;
        self.state.send_if_modified(|state| {
            if state.generation != ticket.generation {
                return false;
            }
            let count = state.set_items(items);
            outcome = ReplaceOutcome::Applied { count };
            true
        });
        if outcome == ReplaceOutcome::Superseded {
            tracing::debug!(
                query = %ticket.query,
                generation = ticket.generation,
                "discarding record set for superseded query",
            );
        }
        outcome
    }

    /// Merge `patch` into an existing record. Unknown ids are ignored.
    pub fn patch(&self, id: &NewsId, patch: &WorkPatch) -> PatchOutcome {
        let mut outcome = PatchOutcome::UnknownRecord;
        self.state.send_if_modified(|state| {
            let Some(item) = state.item_mut(id) else {
                return false;
            };
            if patch.apply_to(item) {
                state.revision += 1;
                outcome = PatchOutcome::Applied;
                true
            } else {
                outcome = PatchOutcome::Unchanged;
                false
            }
        });
        outcome
    }

    /// Set `id`'s status and return the status it had just before, in one step.
    ///
    /// Returns `None` (and writes nothing) when the id is not in the table.
    pub fn swap_status(&self, id: &NewsId, status: WorkStatus) -> Option<WorkStatus> {
        let mut previous = None;
        self.state.send_if_modified(|state| {
            let Some(item) = state.item_mut(id) else {
                return false;
            };
            let before = item.status;
            previous = Some(before);
            if before == status {
                return false;
            }
            item.status = status;
            state.revision += 1;
            true
        });
        previous
    }

    // -----------------------------------------------------------------------
    // Readers
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().snapshot()
    }

    pub fn get(&self, id: &NewsId) -> Option<WorkItem> {
        let state = self.state.borrow();
        state
            .index
            .get(id)
            .and_then(|position| state.items.get(*position))
            .cloned()
    }

    pub fn status_of(&self, id: &NewsId) -> Option<WorkStatus> {
        let state = self.state.borrow();
        state
            .index
            .get(id)
            .and_then(|position| state.items.get(*position))
            .map(|item| item.status)
    }

    pub fn len(&self) -> usize {
        self.state.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn revision(&self) -> u64 {
        self.state.borrow().revision
    }

    /// Change notifications for re-rendering.
    pub fn subscribe(&self) -> StoreSubscription {
        StoreSubscription {
            rx: self.state.subscribe(),
        }
    }
}

/// Receiver side of [`RecordStore::subscribe`].
#[derive(Debug)]
pub struct StoreSubscription {
    rx: watch::Receiver<StoreState>,
}

impl StoreSubscription {
    /// Wait for the next change. Returns `false` once the store is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Snapshot as of the latest change; marks it as seen.
    pub fn snapshot(&mut self) -> Snapshot {
        self.rx.borrow_and_update().snapshot()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn query(day: u32, text: &str) -> NewsQuery {
        NewsQuery::new(NaiveDate::from_ymd_opt(2024, 5, day).expect("date"), text)
    }

    fn items(ids: &[(&str, WorkStatus)]) -> Vec<WorkItem> {
        ids.iter()
            .map(|(id, status)| WorkItem::new(*id, *status))
            .collect()
    }

    #[test]
    fn replace_all_keeps_server_order() {
        let store = RecordStore::new();
        let ticket = store.begin_query(query(1, ""));
        let outcome = store.replace_all(
            &ticket,
            items(&[("C", WorkStatus::Pending), ("A", WorkStatus::Completed)]),
        );
        assert_eq!(outcome, ReplaceOutcome::Applied { count: 2 });
        let ids: Vec<_> = store.snapshot().items.iter().map(|i| i.id.0.clone()).collect();
        assert_eq!(ids, ["C", "A"]);
    }

    #[test]
    fn stale_ticket_is_discarded() {
        let store = RecordStore::new();
        let old = store.begin_query(query(1, ""));
        let new = store.begin_query(query(2, ""));

        assert_eq!(
            store.replace_all(&old, items(&[("OLD", WorkStatus::Pending)])),
            ReplaceOutcome::Superseded
        );
        assert!(store.is_empty(), "superseded result must not be applied");

        store.replace_all(&new, items(&[("NEW", WorkStatus::Pending)]));
        assert!(store.get(&NewsId::from("OLD")).is_none());
        assert!(store.get(&NewsId::from("NEW")).is_some());
    }

    #[test]
    fn changing_query_empties_table_but_refresh_of_same_query_does_not() {
        let store = RecordStore::new();
        let ticket = store.begin_query(query(1, ""));
        store.replace_all(&ticket, items(&[("A", WorkStatus::Pending)]));

        store.begin_query(query(1, ""));
        assert_eq!(store.len(), 1, "same query keeps rows until refresh lands");

        store.begin_query(query(1, "economy"));
        assert!(store.is_empty(), "new query starts empty");
    }

    #[test]
    fn patch_unknown_id_is_not_an_insert() {
        let store = RecordStore::new();
        let ticket = store.begin_query(query(1, ""));
        store.replace_all(&ticket, items(&[("A", WorkStatus::Pending)]));

        let outcome = store.patch(&NewsId::from("ZZ"), &WorkPatch::status(WorkStatus::Completed));
        assert_eq!(outcome, PatchOutcome::UnknownRecord);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn patch_existing_record() {
        let store = RecordStore::new();
        let ticket = store.begin_query(query(1, ""));
        store.replace_all(&ticket, items(&[("A", WorkStatus::Pending)]));
        let id = NewsId::from("A");

        assert_eq!(
            store.patch(&id, &WorkPatch::status(WorkStatus::Completed)),
            PatchOutcome::Applied
        );
        assert_eq!(
            store.patch(&id, &WorkPatch::status(WorkStatus::Completed)),
            PatchOutcome::Unchanged
        );
        assert_eq!(store.status_of(&id), Some(WorkStatus::Completed));
    }

    #[test]
    fn swap_status_returns_previous_value() {
        let store = RecordStore::new();
        let ticket = store.begin_query(query(1, ""));
        store.replace_all(&ticket, items(&[("A", WorkStatus::Pending)]));
        let id = NewsId::from("A");

        assert_eq!(
            store.swap_status(&id, WorkStatus::InProgress),
            Some(WorkStatus::Pending)
        );
        assert_eq!(
            store.swap_status(&id, WorkStatus::Completed),
            Some(WorkStatus::InProgress)
        );
        assert_eq!(store.swap_status(&NewsId::from("B"), WorkStatus::Completed), None);
    }

    #[test]
    fn duplicate_ids_keep_first_occurrence() {
        let store = RecordStore::new();
        let ticket = store.begin_query(query(1, ""));
        let outcome = store.replace_all(
            &ticket,
            items(&[("A", WorkStatus::Pending), ("A", WorkStatus::Completed)]),
        );
        assert_eq!(outcome, ReplaceOutcome::Applied { count: 1 });
        assert_eq!(store.status_of(&NewsId::from("A")), Some(WorkStatus::Pending));
    }

    #[test]
    fn snapshots_are_isolated_from_later_writes() {
        let store = RecordStore::new();
        let ticket = store.begin_query(query(1, ""));
        store.replace_all(&ticket, items(&[("A", WorkStatus::Pending)]));
        let before = store.snapshot();

        store.swap_status(&NewsId::from("A"), WorkStatus::Completed);

        assert_eq!(before.items[0].status, WorkStatus::Pending);
        assert!(store.snapshot().revision > before.revision);
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let store = RecordStore::new();
        let mut sub = store.subscribe();
        let ticket = store.begin_query(query(1, ""));
        store.replace_all(&ticket, items(&[("A", WorkStatus::Pending)]));

        assert!(sub.changed().await);
        let snapshot = sub.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.query, Some(query(1, "")));
    }
}
