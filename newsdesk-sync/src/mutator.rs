//! Optimistic status changes with per-record rollback.
//!
//! Every `set_status` call becomes a [`MutationIntent`]. Intents for one
//! record form a lane: the store is updated as each intent is issued, remote
//! writes leave in issue order (each waits for the previous write's gate),
//! and a failed write is settled against whatever later intents exist.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio::time::Instant;

use newsdesk_core::{NewsId, RecordStore, WorkStatus};

use crate::api::NewsApi;
use crate::error::SyncError;

/// One issued status change, tracked until its remote write settles.
#[derive(Debug, Clone)]
pub struct MutationIntent {
    pub seq: u64,
    pub id: NewsId,
    /// Rollback target. Replaced by an earlier failed intent's target when
    /// that intent hands off to this one.
    pub previous: WorkStatus,
    pub requested: WorkStatus,
    pub issued_at: Instant,
}

#[derive(Debug, Default)]
struct Lane {
    /// Unsettled intents, oldest first.
    intents: VecDeque<MutationIntent>,
    /// Resolves once the newest intent's write has settled.
    tail: Option<oneshot::Receiver<()>>,
}

#[derive(Debug, Default)]
struct Lanes {
    next_seq: u64,
    by_id: HashMap<NewsId, Lane>,
}

struct MutatorInner {
    store: RecordStore,
    api: Arc<dyn NewsApi>,
    lanes: Mutex<Lanes>,
}

/// Applies status changes to the store immediately and reconciles them with
/// the service afterwards.
#[derive(Clone)]
pub struct OptimisticMutator {
    inner: Arc<MutatorInner>,
}

impl std::fmt::Debug for OptimisticMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimisticMutator")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl OptimisticMutator {
    pub fn new(store: RecordStore, api: Arc<dyn NewsApi>) -> Self {
        Self {
            inner: Arc::new(MutatorInner {
                store,
                api,
                lanes: Mutex::new(Lanes::default()),
            }),
        }
    }

    /// Set `id` to `status` now and persist it.
    ///
    /// Fails with [`SyncError::UnknownRecord`] before any I/O when `id` is not
    /// in the store. Remote failures are returned after the record has been
    /// settled. The write runs in its own task, so dropping the returned
    /// future does not leave the record half-settled.
    pub async fn set_status(&self, id: &NewsId, status: WorkStatus) -> Result<(), SyncError> {
        let (intent, gate, done) = self.inner.issue(id, status)?;
        let inner = Arc::clone(&self.inner);
        let write = tokio::spawn(async move { inner.write_through(intent, gate, done).await });
        match write.await {
            Ok(result) => result,
            Err(err) => Err(SyncError::TaskFailed {
                task: "status write",
                reason: err.to_string(),
            }),
        }
    }

    /// Number of intents whose writes have not settled yet.
    pub fn in_flight(&self) -> usize {
        self.inner
            .lock_lanes()
            .by_id
            .values()
            .map(|lane| lane.intents.len())
            .sum()
    }

    /// Unsettled intents for one record, oldest first.
    pub fn pending_for(&self, id: &NewsId) -> Vec<MutationIntent> {
        self.inner
            .lock_lanes()
            .by_id
            .get(id)
            .map(|lane| lane.intents.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl MutatorInner {
    fn lock_lanes(&self) -> MutexGuard<'_, Lanes> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `status` locally and enqueue the intent. The lane lock is held
    /// across the store swap so lane order matches the order values became
    /// visible.
    #[allow(clippy::type_complexity)]
    fn issue(
        &self,
        id: &NewsId,
        status: WorkStatus,
    ) -> Result<
        (
            MutationIntent,
            Option<oneshot::Receiver<()>>,
            oneshot::Sender<()>,
        ),
        SyncError,
    > {
        let mut lanes = self.lock_lanes();
        let previous = self
            .store
            .swap_status(id, status)
            .ok_or_else(|| SyncError::UnknownRecord(id.clone()))?;

        lanes.next_seq += 1;
        let intent = MutationIntent {
            seq: lanes.next_seq,
            id: id.clone(),
            previous,
            requested: status,
            issued_at: Instant::now(),
        };

        let (done_tx, done_rx) = oneshot::channel();
        let lane = lanes.by_id.entry(id.clone()).or_default();
        let gate = lane.tail.replace(done_rx);
        lane.intents.push_back(intent.clone());

        tracing::debug!(
            news_id = %id,
            seq = intent.seq,
            from = %previous,
            to = %status,
            queued_behind = lane.intents.len() - 1,
            "applied optimistic status",
        );
        Ok((intent, gate, done_tx))
    }

    async fn write_through(
        &self,
        intent: MutationIntent,
        gate: Option<oneshot::Receiver<()>>,
        done: oneshot::Sender<()>,
    ) -> Result<(), SyncError> {
        if let Some(gate) = gate {
            // An aborted predecessor drops its sender; that also opens the gate.
            let _ = gate.await;
        }
        let result = self.api.update_status(&intent.id, intent.requested).await;
        self.settle(&intent, result.as_ref().err());
        let _ = done.send(());
        result
    }

    fn settle(&self, intent: &MutationIntent, failure: Option<&SyncError>) {
        let mut lanes = self.lock_lanes();
        let Some(lane) = lanes.by_id.get_mut(&intent.id) else {
            return;
        };
        let Some(position) = lane.intents.iter().position(|p| p.seq == intent.seq) else {
            return;
        };
        let Some(settled) = lane.intents.remove(position) else {
            return;
        };
        let elapsed_ms = settled.issued_at.elapsed().as_millis() as u64;

        match failure {
            None => {
                tracing::debug!(
                    news_id = %settled.id,
                    seq = settled.seq,
                    status = %settled.requested,
                    elapsed_ms,
                    "status write confirmed",
                );
            }
            Some(err) => match lane.intents.get_mut(position) {
                Some(later) => {
                    later.previous = settled.previous;
                    tracing::warn!(
                        news_id = %settled.id,
                        seq = settled.seq,
                        superseded_by = later.seq,
                        error = %err,
                        "status write failed; newer change keeps the record",
                    );
                }
                None => {
                    self.store.swap_status(&settled.id, settled.previous);
                    tracing::warn!(
                        news_id = %settled.id,
                        seq = settled.seq,
                        reverted_to = %settled.previous,
                        error = %err,
                        elapsed_ms,
                        "status write failed; reverted",
                    );
                }
            },
        }

        if lane.intents.is_empty() {
            lanes.by_id.remove(&intent.id);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain, item, FakeApi, WriteScript};
    use tokio::task::JoinHandle;

    fn setup(items: &[(&str, WorkStatus)]) -> (RecordStore, Arc<FakeApi>, OptimisticMutator) {
        let store = crate::testing::store_with(items);
        let api = Arc::new(FakeApi::default());
        let mutator = OptimisticMutator::new(store.clone(), api.clone());
        (store, api, mutator)
    }

    fn spawn_set(
        mutator: &OptimisticMutator,
        id: &str,
        status: WorkStatus,
    ) -> JoinHandle<Result<(), SyncError>> {
        let mutator = mutator.clone();
        let id = NewsId::from(id);
        tokio::spawn(async move { mutator.set_status(&id, status).await })
    }

    fn status(store: &RecordStore, id: &str) -> Option<WorkStatus> {
        store.status_of(&NewsId::from(id))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_write_reverts_after_optimistic_apply() {
        let (store, api, mutator) = setup(&[("A1", WorkStatus::Pending)]);
        let release = api.hold_next_write();

        let call = spawn_set(&mutator, "A1", WorkStatus::InProgress);
        drain().await;
        assert_eq!(status(&store, "A1"), Some(WorkStatus::InProgress));
        assert_eq!(mutator.in_flight(), 1);

        release.send(false).expect("release");
        let err = call.await.expect("join").unwrap_err();
        assert!(matches!(err, SyncError::NetworkFailure(_)), "got: {err}");
        assert_eq!(status(&store, "A1"), Some(WorkStatus::Pending));
        assert_eq!(mutator.in_flight(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn push_overwrites_pending_optimistic_value_until_rollback() {
        let (store, api, mutator) = setup(&[("A1", WorkStatus::Pending)]);
        let ingester = crate::ingester::RealtimeIngester::new(
            Arc::new(crate::testing::FakeEvents::default()),
            store.clone(),
            std::time::Duration::from_secs(5),
        );
        let release = api.hold_next_write();

        let call = spawn_set(&mutator, "A1", WorkStatus::InProgress);
        drain().await;
        assert_eq!(status(&store, "A1"), Some(WorkStatus::InProgress));

        ingester
            .handle_line(r#"{"type":"status_change","data":{"news_id":"A1","status":"작업완료"}}"#)
            .expect("event");
        assert_eq!(status(&store, "A1"), Some(WorkStatus::Completed));
        assert_eq!(mutator.in_flight(), 1);

        // No version stamps: the rollback of the older intent wins over the push.
        release.send(false).expect("release");
        call.await.expect("join").unwrap_err();
        assert_eq!(status(&store, "A1"), Some(WorkStatus::Pending));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unknown_record_fails_without_a_write() {
        let (store, api, mutator) = setup(&[("A1", WorkStatus::Pending)]);
        let revision = store.revision();
        let err = mutator
            .set_status(&NewsId::from("Z9"), WorkStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownRecord(ref id) if id.as_str() == "Z9"));
        assert!(api.writes().is_empty());
        assert_eq!(store.revision(), revision);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn writes_for_one_record_leave_in_issue_order() {
        let (store, api, mutator) = setup(&[("A1", WorkStatus::Pending)]);
        let release = api.hold_next_write();

        let first = spawn_set(&mutator, "A1", WorkStatus::InProgress);
        drain().await;
        let second = spawn_set(&mutator, "A1", WorkStatus::Completed);
        let third = spawn_set(&mutator, "A1", WorkStatus::Pending);
        drain().await;

        // Later writes wait for the held one.
        assert_eq!(api.writes().len(), 1);
        assert_eq!(status(&store, "A1"), Some(WorkStatus::Pending));

        release.send(true).expect("release");
        first.await.expect("join").expect("first");
        second.await.expect("join").expect("second");
        third.await.expect("join").expect("third");

        let sent: Vec<WorkStatus> = api.writes().into_iter().map(|(_, s)| s).collect();
        assert_eq!(
            sent,
            vec![
                WorkStatus::InProgress,
                WorkStatus::Completed,
                WorkStatus::Pending
            ]
        );
        assert_eq!(status(&store, "A1"), Some(WorkStatus::Pending));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn records_settle_independently() {
        let (store, api, mutator) =
            setup(&[("A1", WorkStatus::Pending), ("B2", WorkStatus::Pending)]);
        let release = api.hold_next_write();

        let slow = spawn_set(&mutator, "A1", WorkStatus::Completed);
        drain().await;
        mutator
            .set_status(&NewsId::from("B2"), WorkStatus::InProgress)
            .await
            .expect("B2 completes while A1 is held");

        release.send(true).expect("release");
        slow.await.expect("join").expect("A1");
        assert_eq!(status(&store, "A1"), Some(WorkStatus::Completed));
        assert_eq!(status(&store, "B2"), Some(WorkStatus::InProgress));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn rollback_targets_value_just_before_the_failed_call() {
        let (store, api, mutator) = setup(&[("A1", WorkStatus::Pending)]);

        mutator
            .set_status(&NewsId::from("A1"), WorkStatus::InProgress)
            .await
            .expect("first change");

        api.push_script(WriteScript::Reject("상태 변경 실패"));
        let err = mutator
            .set_status(&NewsId::from("A1"), WorkStatus::Completed)
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "상태 변경 실패");
        assert_eq!(status(&store, "A1"), Some(WorkStatus::InProgress));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_intent_hands_rollback_target_to_newer_intent() {
        let (store, api, mutator) = setup(&[("A1", WorkStatus::Pending)]);
        let first_release = api.hold_next_write();
        let second_release = api.hold_next_write();

        let first = spawn_set(&mutator, "A1", WorkStatus::InProgress);
        drain().await;
        let second = spawn_set(&mutator, "A1", WorkStatus::Completed);
        drain().await;

        first_release.send(false).expect("release first");
        assert!(first.await.expect("join").is_err());
        // The newer intent still owns the visible value.
        assert_eq!(status(&store, "A1"), Some(WorkStatus::Completed));
        let pending = mutator.pending_for(&NewsId::from("A1"));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].previous, WorkStatus::Pending);

        second_release.send(false).expect("release second");
        assert!(second.await.expect("join").is_err());
        assert_eq!(status(&store, "A1"), Some(WorkStatus::Pending));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn newer_success_survives_older_failure() {
        let (store, api, mutator) = setup(&[("A1", WorkStatus::Pending)]);
        let first_release = api.hold_next_write();

        let first = spawn_set(&mutator, "A1", WorkStatus::InProgress);
        drain().await;
        let second = spawn_set(&mutator, "A1", WorkStatus::Completed);
        drain().await;

        first_release.send(false).expect("release");
        assert!(first.await.expect("join").is_err());
        second.await.expect("join").expect("second succeeds");
        assert_eq!(status(&store, "A1"), Some(WorkStatus::Completed));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn dropped_caller_still_settles() {
        let (store, api, mutator) = setup(&[("A1", WorkStatus::Pending)]);
        let release = api.hold_next_write();

        let call = spawn_set(&mutator, "A1", WorkStatus::Completed);
        drain().await;
        call.abort();
        drain().await;

        release.send(false).expect("release");
        drain().await;
        assert_eq!(status(&store, "A1"), Some(WorkStatus::Pending));
        assert_eq!(mutator.in_flight(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn record_dropped_by_query_change_is_not_resurrected() {
        let (store, api, mutator) = setup(&[("A1", WorkStatus::Pending)]);
        let release = api.hold_next_write();

        let call = spawn_set(&mutator, "A1", WorkStatus::Completed);
        drain().await;
        let ticket = store.begin_query(crate::testing::query("other"));
        store.replace_all(&ticket, vec![item("B2", WorkStatus::Pending)]);

        release.send(false).expect("release");
        assert!(call.await.expect("join").is_err());
        assert!(store.get(&NewsId::from("A1")).is_none());
    }
}
