//! # Job Queue Processor
//!
//! The scheduler: holds at most one active job, runs it under a three-way
//! race, updates entry status, and drives the next job.
//!
//! ## Transition protocol
//!
//! For each descriptor at the queue head:
//!
//! 1. Subscribe to removal events and the reachability watch, then move the
//!    entry to `LOADING`. Subscriptions come first so a signal arriving
//!    during the status write cannot be missed.
//! 2. Race three operations, first-to-settle wins:
//!    - **work**: the kind-specific handler (download or verify), awaited as
//!      one operation;
//!    - **abort-watch**: a removal event for this entity, confirmed by
//!      re-reading the item set (removal events are broadcast for any
//!      entity, so the watcher re-checks before concluding);
//!    - **cancel-watch**: the reachability watch reporting `Unreachable`.
//! 3. Resolve by which branch fired:
//!    - abort: no status write (the entry is already gone), advance;
//!    - cancel: freeze. No status write, no advance; the descriptor stays at
//!      the queue head and draining resumes only via an external re-drive;
//!    - work: record the outcome (`SUCCESS`/`ERROR`), pop the queue, advance.
//!
//! Advancement is an explicit drain loop, keeping stack usage flat under long
//! queues. Losing branches of the race are dropped; for the work branch that
//! cancels the in-flight operation at its next await point rather than
//! letting it run on in the background.
//!
//! The processor never consumes `Reachable` transitions: restoration re-drives
//! arrive through [`request_process_next`](JobQueueProcessor::request_process_next),
//! invoked by the reconnect driver in [`crate::reachability`].

use crate::item_set::OfflineItemSet;
use crate::job::{JobDescriptor, JobKind, JobOutcome, QueueStatus};
use crate::reachability::{Reachability, ReachabilityState};
use crate::verifier::StalenessVerifier;
use crate::Result;
use bridge_traits::ContentDownloader;
use core_runtime::events::{CoreEvent, EventBus, OfflineEvent, Receiver, RecvError};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// How a finished race leaves the queue.
enum Advance {
    /// Move on to the next pending descriptor
    Continue,
    /// Stop draining; wait for an external re-drive
    Suspend,
}

/// Single-slot scheduler over the offline item set's pending queue.
pub struct JobQueueProcessor {
    item_set: Arc<OfflineItemSet>,
    verifier: StalenessVerifier,
    downloader: Arc<dyn ContentDownloader>,
    reachability: Arc<Reachability>,
    event_bus: EventBus,
    wake: Notify,
    status_tx: watch::Sender<QueueStatus>,
    shutdown: CancellationToken,
}

impl JobQueueProcessor {
    /// Create a processor. `shutdown` stops the [`run`](Self::run) loop.
    pub fn new(
        item_set: Arc<OfflineItemSet>,
        verifier: StalenessVerifier,
        downloader: Arc<dyn ContentDownloader>,
        reachability: Arc<Reachability>,
        event_bus: EventBus,
        shutdown: CancellationToken,
    ) -> Self {
        let (status_tx, _) = watch::channel(QueueStatus::Idle);
        Self {
            item_set,
            verifier,
            downloader,
            reachability,
            event_bus,
            wake: Notify::new(),
            status_tx,
            shutdown,
        }
    }

    /// The processor's aggregate state.
    pub fn queue_status(&self) -> QueueStatus {
        *self.status_tx.borrow()
    }

    /// Subscribe to aggregate state changes.
    pub fn subscribe_status(&self) -> watch::Receiver<QueueStatus> {
        self.status_tx.subscribe()
    }

    /// Request a drive of the pending queue.
    ///
    /// The external re-drive entry point: called by the reconnect driver
    /// after reachability is restored, or by the host after recovering from
    /// a crash with a non-empty persisted queue.
    pub fn request_process_next(&self) {
        self.wake.notify_one();
    }

    /// Long-running processing loop.
    ///
    /// Drains the queue, then parks until new work is enqueued or a re-drive
    /// arrives. Returns when the shutdown token fires.
    pub async fn run(&self) {
        let mut events = self.event_bus.subscribe();
        info!("Job queue processor started");

        loop {
            if let Err(err) = self.drain().await {
                error!(error = %err, "Queue drain failed");
            }

            let woken = self.wait_for_wake(&mut events).await;
            if !woken {
                break;
            }
        }

        info!("Job queue processor stopped");
    }

    /// Park until new work or a re-drive arrives. Returns `false` on
    /// shutdown.
    async fn wait_for_wake(&self, events: &mut Receiver<CoreEvent>) -> bool {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = self.wake.notified() => return true,
                event = events.recv() => match event {
                    Ok(CoreEvent::Offline(OfflineEvent::ItemEnqueued { .. })) => return true,
                    Ok(_) => {}
                    // An enqueue may have been among the missed events
                    Err(RecvError::Lagged(_)) => return true,
                    Err(RecvError::Closed) => return false,
                },
            }
        }
    }

    /// Process pending descriptors FIFO until the queue empties or a
    /// cancellation freezes it.
    pub async fn drain(&self) -> Result<()> {
        loop {
            if self.reachability.current() == ReachabilityState::Unreachable {
                self.set_queue_status(QueueStatus::Paused);
                return Ok(());
            }

            let Some(descriptor) = self.item_set.next_pending().await? else {
                self.set_queue_status(QueueStatus::Idle);
                return Ok(());
            };

            self.set_queue_status(QueueStatus::Processing);

            match self.process_one(&descriptor).await? {
                Advance::Continue => continue,
                Advance::Suspend => {
                    self.set_queue_status(QueueStatus::Paused);
                    return Ok(());
                }
            }
        }
    }

    /// Run one job under the three-way race.
    #[instrument(skip(self), fields(descriptor = %descriptor))]
    async fn process_one(&self, descriptor: &JobDescriptor) -> Result<Advance> {
        // Subscriptions precede the status write; a removal or reachability
        // loss arriving from here on is guaranteed to be observed.
        let removals = self.event_bus.subscribe();
        let reachability_rx = self.reachability.subscribe();

        if !self.item_set.start_job(descriptor).await? {
            // Entry vanished between peek and start; drop the orphaned
            // queue entry.
            self.item_set.discard(descriptor).await?;
            return Ok(Advance::Continue);
        }

        debug!("Job started");
        self.emit(OfflineEvent::JobStarted {
            kind: descriptor.kind.as_str().to_string(),
            entity_id: descriptor.entity_id.to_string(),
        });

        tokio::select! {
            (outcome, remote_updated_at) = self.execute(descriptor) => {
                self.settle(descriptor, outcome, remote_updated_at).await?;
                Ok(Advance::Continue)
            }
            _ = self.removal_watch(removals, descriptor) => {
                // The removal already deleted the entry and purged its queue
                // rows; a status write here would violate the no-dangling-
                // writes invariant.
                info!("Job aborted: entity removed from offline set");
                self.emit(OfflineEvent::JobAborted {
                    kind: descriptor.kind.as_str().to_string(),
                    entity_id: descriptor.entity_id.to_string(),
                });
                Ok(Advance::Continue)
            }
            _ = Self::wait_unreachable(reachability_rx) => {
                // Frozen, not failed: the entry stays LOADING and the
                // descriptor stays at the queue head.
                info!("Network unreachable; job suspended");
                Ok(Advance::Suspend)
            }
        }
    }

    /// Dispatch the kind-specific handler.
    async fn execute(&self, descriptor: &JobDescriptor) -> (JobOutcome, Option<i64>) {
        match descriptor.kind {
            JobKind::DownloadTrack => {
                match self.downloader.download_track(descriptor.entity_id.as_str()).await {
                    Ok(item) => (JobOutcome::Success, item.remote_updated_at),
                    Err(err) => {
                        warn!(error = %err, "Track download failed");
                        (JobOutcome::Error, None)
                    }
                }
            }
            JobKind::DownloadCollection => {
                match self
                    .downloader
                    .download_collection(descriptor.entity_id.as_str())
                    .await
                {
                    Ok(item) => (JobOutcome::Success, item.remote_updated_at),
                    Err(err) => {
                        warn!(error = %err, "Collection download failed");
                        (JobOutcome::Error, None)
                    }
                }
            }
            JobKind::VerifyStaleTrack | JobKind::VerifyStaleCollection => {
                (self.verifier.verify(descriptor).await, None)
            }
        }
    }

    /// Record a settled work outcome and pop the queue entry.
    async fn settle(
        &self,
        descriptor: &JobDescriptor,
        outcome: JobOutcome,
        remote_updated_at: Option<i64>,
    ) -> Result<()> {
        match outcome {
            JobOutcome::Success => {
                let completed_at = chrono::Utc::now().timestamp();
                self.item_set
                    .complete_job(descriptor, completed_at, remote_updated_at)
                    .await?;
                info!("Job completed");
                self.emit(OfflineEvent::JobCompleted {
                    kind: descriptor.kind.as_str().to_string(),
                    entity_id: descriptor.entity_id.to_string(),
                    verified_at: completed_at,
                });
            }
            JobOutcome::Error => {
                self.item_set.error_job(descriptor).await?;
                warn!("Job failed");
                self.emit(OfflineEvent::JobErrored {
                    kind: descriptor.kind.as_str().to_string(),
                    entity_id: descriptor.entity_id.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Resolve once this job's entity has actually left the offline set.
    async fn removal_watch(&self, mut events: Receiver<CoreEvent>, descriptor: &JobDescriptor) {
        loop {
            match events.recv().await {
                Ok(CoreEvent::Offline(OfflineEvent::ItemRemoved {
                    entity_id,
                    entity_type,
                })) if entity_id == descriptor.entity_id.as_str()
                    && entity_type == descriptor.entity_type().as_str() =>
                {
                    // Events are broadcast for any entity; conclude only once
                    // a re-read confirms this entry is gone.
                    if self.entry_absent(descriptor).await == Some(true) {
                        return;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    debug!(missed, "Abort watcher lagged; re-checking entry");
                    if self.entry_absent(descriptor).await == Some(true) {
                        return;
                    }
                }
                Err(RecvError::Closed) => {
                    // No more removal signals can arrive; leave the race to
                    // the other branches.
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    async fn entry_absent(&self, descriptor: &JobDescriptor) -> Option<bool> {
        match self
            .item_set
            .get(&descriptor.entity_id, descriptor.entity_type())
            .await
        {
            Ok(entry) => Some(entry.is_none()),
            Err(err) => {
                warn!(error = %err, "Abort re-check failed");
                None
            }
        }
    }

    /// Resolve when the network becomes unreachable.
    async fn wait_unreachable(mut rx: watch::Receiver<ReachabilityState>) {
        let unreachable_err = rx
            .wait_for(|state| *state == ReachabilityState::Unreachable)
            .await
            .is_err();

        if unreachable_err {
            // Reachability sender dropped; cancellation can no longer fire
            std::future::pending::<()>().await;
        }
    }

    fn set_queue_status(&self, next: QueueStatus) {
        let changed = self.status_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        if changed {
            debug!(status = %next, "Queue status changed");
            self.emit(OfflineEvent::QueueStatusChanged {
                status: next.as_str().to_string(),
            });
        }
    }

    fn emit(&self, event: OfflineEvent) {
        self.event_bus.emit(CoreEvent::Offline(event)).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{DownloadStatus, EntityId, EntityType};
    use bridge_traits::catalog::{CatalogClient, RemoteMetadata};
    use bridge_traits::downloader::DownloadedItem;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::session::SessionProvider;
    use bridge_traits::BridgeError;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        Succeed(Option<i64>),
        Fail,
        Hang,
    }

    /// Downloader whose per-entity behavior is scripted by the test.
    struct ScriptedDownloader {
        behaviors: StdMutex<HashMap<String, Behavior>>,
        started: StdMutex<Vec<String>>,
    }

    impl ScriptedDownloader {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                behaviors: StdMutex::new(HashMap::new()),
                started: StdMutex::new(Vec::new()),
            })
        }

        fn script(&self, entity_id: &str, behavior: Behavior) {
            self.behaviors
                .lock()
                .unwrap()
                .insert(entity_id.to_string(), behavior);
        }

        fn started(&self) -> Vec<String> {
            self.started.lock().unwrap().clone()
        }

        async fn perform(&self, entity_id: &str) -> BridgeResult<DownloadedItem> {
            self.started.lock().unwrap().push(entity_id.to_string());
            let behavior = self
                .behaviors
                .lock()
                .unwrap()
                .get(entity_id)
                .copied()
                .unwrap_or(Behavior::Succeed(None));

            match behavior {
                Behavior::Succeed(remote_updated_at) => Ok(DownloadedItem { remote_updated_at }),
                Behavior::Fail => Err(BridgeError::Transport("scripted failure".to_string())),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    #[async_trait::async_trait]
    impl ContentDownloader for ScriptedDownloader {
        async fn download_track(&self, track_id: &str) -> BridgeResult<DownloadedItem> {
            self.perform(track_id).await
        }

        async fn download_collection(&self, collection_id: &str) -> BridgeResult<DownloadedItem> {
            self.perform(collection_id).await
        }
    }

    struct NullCatalog;

    #[async_trait::async_trait]
    impl CatalogClient for NullCatalog {
        async fn get_track(
            &self,
            _track_id: &str,
            _user_id: &str,
        ) -> BridgeResult<Option<RemoteMetadata>> {
            Ok(None)
        }

        async fn get_collection(
            &self,
            _collection_id: &str,
            _user_id: &str,
        ) -> BridgeResult<Option<RemoteMetadata>> {
            Ok(None)
        }
    }

    struct NullSession;

    #[async_trait::async_trait]
    impl SessionProvider for NullSession {
        async fn current_user_id(&self) -> Option<String> {
            None
        }
    }

    struct Harness {
        item_set: Arc<OfflineItemSet>,
        reachability: Arc<Reachability>,
        downloader: Arc<ScriptedDownloader>,
        processor: Arc<JobQueueProcessor>,
    }

    async fn harness() -> Harness {
        let pool = crate::db::create_test_pool().await.unwrap();
        let event_bus = EventBus::new(64);
        let item_set = Arc::new(OfflineItemSet::new(pool, event_bus.clone()).await.unwrap());
        let reachability = Arc::new(Reachability::new(event_bus.clone()));
        let downloader = ScriptedDownloader::new();
        let verifier = StalenessVerifier::new(
            Arc::new(NullCatalog),
            Arc::new(NullSession),
            item_set.clone(),
        );
        let processor = Arc::new(JobQueueProcessor::new(
            item_set.clone(),
            verifier,
            downloader.clone(),
            reachability.clone(),
            event_bus,
            CancellationToken::new(),
        ));

        Harness {
            item_set,
            reachability,
            downloader,
            processor,
        }
    }

    async fn wait_for_status(
        item_set: &OfflineItemSet,
        entity_id: &str,
        status: DownloadStatus,
    ) {
        let id = EntityId::new(entity_id);
        timeout(Duration::from_secs(2), async {
            loop {
                if let Some(entry) = item_set.get(&id, EntityType::Track).await.unwrap() {
                    if entry.download_status == status {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{} never reached {}", entity_id, status));
    }

    #[tokio::test]
    async fn test_fifo_order_and_mixed_outcomes() {
        let h = harness().await;
        h.downloader.script("a", Behavior::Fail);
        h.downloader.script("b", Behavior::Succeed(Some(500)));

        h.item_set
            .mark_for_offline(&EntityId::new("a"), EntityType::Track)
            .await
            .unwrap();
        h.item_set
            .mark_for_offline(&EntityId::new("b"), EntityType::Track)
            .await
            .unwrap();

        h.processor.drain().await.unwrap();

        assert_eq!(h.downloader.started(), vec!["a", "b"]);

        let a = h
            .item_set
            .get(&EntityId::new("a"), EntityType::Track)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.download_status, DownloadStatus::Error);
        assert!(a.verified_at.is_none());

        let b = h
            .item_set
            .get(&EntityId::new("b"), EntityType::Track)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(b.download_status, DownloadStatus::Success);
        assert!(b.verified_at.is_some());
        assert_eq!(b.remote_updated_at, Some(500));

        assert!(h.item_set.list_pending().await.unwrap().is_empty());
        assert_eq!(h.processor.queue_status(), QueueStatus::Idle);
    }

    #[tokio::test]
    async fn test_abort_on_removal_advances_without_status_write() {
        let h = harness().await;
        h.downloader.script("a", Behavior::Hang);
        h.downloader.script("b", Behavior::Succeed(None));

        h.item_set
            .mark_for_offline(&EntityId::new("a"), EntityType::Track)
            .await
            .unwrap();
        h.item_set
            .mark_for_offline(&EntityId::new("b"), EntityType::Track)
            .await
            .unwrap();

        let processor = h.processor.clone();
        let drain = tokio::spawn(async move { processor.drain().await });

        wait_for_status(&h.item_set, "a", DownloadStatus::Loading).await;

        h.item_set
            .remove_from_offline(&EntityId::new("a"), EntityType::Track)
            .await
            .unwrap();

        // The drain advances past the aborted job and finishes the queue
        timeout(Duration::from_secs(2), drain)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert!(h
            .item_set
            .get(&EntityId::new("a"), EntityType::Track)
            .await
            .unwrap()
            .is_none());

        let b = h
            .item_set
            .get(&EntityId::new("b"), EntityType::Track)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(b.download_status, DownloadStatus::Success);
        assert!(h.item_set.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_removal_of_other_entity_does_not_abort() {
        let h = harness().await;
        h.downloader.script("a", Behavior::Hang);

        h.item_set
            .mark_for_offline(&EntityId::new("a"), EntityType::Track)
            .await
            .unwrap();
        h.item_set
            .mark_for_offline(&EntityId::new("other"), EntityType::Track)
            .await
            .unwrap();

        let processor = h.processor.clone();
        let drain = tokio::spawn(async move { processor.drain().await });

        wait_for_status(&h.item_set, "a", DownloadStatus::Loading).await;

        // Removing an unrelated entity must not resolve a's abort watch
        h.item_set
            .remove_from_offline(&EntityId::new("other"), EntityType::Track)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let a = h
            .item_set
            .get(&EntityId::new("a"), EntityType::Track)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.download_status, DownloadStatus::Loading);
        assert!(!drain.is_finished());

        drain.abort();
    }

    #[tokio::test]
    async fn test_cancel_freeze_on_unreachable() {
        let h = harness().await;
        h.downloader.script("c", Behavior::Hang);

        h.item_set
            .mark_for_offline(&EntityId::new("c"), EntityType::Track)
            .await
            .unwrap();

        let processor = h.processor.clone();
        let drain = tokio::spawn(async move { processor.drain().await });

        wait_for_status(&h.item_set, "c", DownloadStatus::Loading).await;

        h.reachability.set_state(ReachabilityState::Unreachable);

        // Drain suspends without touching the entry or the queue
        timeout(Duration::from_secs(2), drain)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let c = h
            .item_set
            .get(&EntityId::new("c"), EntityType::Track)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c.download_status, DownloadStatus::Loading);
        assert_eq!(h.item_set.list_pending().await.unwrap().len(), 1);
        assert_eq!(h.processor.queue_status(), QueueStatus::Paused);

        // Restoration plus an explicit re-drive restarts the job
        h.downloader.script("c", Behavior::Succeed(Some(700)));
        h.reachability.set_state(ReachabilityState::Reachable);
        h.processor.drain().await.unwrap();

        let c = h
            .item_set
            .get(&EntityId::new("c"), EntityType::Track)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c.download_status, DownloadStatus::Success);
        assert_eq!(h.processor.queue_status(), QueueStatus::Idle);
    }

    #[tokio::test]
    async fn test_drain_pauses_when_already_unreachable() {
        let h = harness().await;

        h.item_set
            .mark_for_offline(&EntityId::new("a"), EntityType::Track)
            .await
            .unwrap();
        h.reachability.set_state(ReachabilityState::Unreachable);

        h.processor.drain().await.unwrap();

        // No job started while offline
        assert!(h.downloader.started().is_empty());
        let a = h
            .item_set
            .get(&EntityId::new("a"), EntityType::Track)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.download_status, DownloadStatus::Init);
        assert_eq!(h.processor.queue_status(), QueueStatus::Paused);
    }

    #[tokio::test]
    async fn test_unconfirmed_state_processes_optimistically() {
        let h = harness().await;
        h.downloader.script("a", Behavior::Succeed(None));

        h.item_set
            .mark_for_offline(&EntityId::new("a"), EntityType::Track)
            .await
            .unwrap();

        assert_eq!(h.reachability.current(), ReachabilityState::Unconfirmed);
        h.processor.drain().await.unwrap();

        let a = h
            .item_set
            .get(&EntityId::new("a"), EntityType::Track)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.download_status, DownloadStatus::Success);
    }

    #[tokio::test]
    async fn test_failed_verify_leaves_entry_status() {
        let h = harness().await;
        h.downloader.script("a", Behavior::Succeed(Some(100)));

        h.item_set
            .mark_for_offline(&EntityId::new("a"), EntityType::Track)
            .await
            .unwrap();
        h.processor.drain().await.unwrap();

        // NullSession has no user, so the verify job fails fast
        h.item_set
            .request_stale_check(&EntityId::new("a"), EntityType::Track)
            .await
            .unwrap();
        h.processor.drain().await.unwrap();

        let a = h
            .item_set
            .get(&EntityId::new("a"), EntityType::Track)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.download_status, DownloadStatus::Success);
        assert!(h.item_set.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_wakes_on_enqueue_and_redrive() {
        let h = harness().await;
        h.downloader.script("a", Behavior::Succeed(None));

        let processor = h.processor.clone();
        let run = tokio::spawn(async move { processor.run().await });

        // Enqueueing while the loop is parked wakes it via the event bus
        h.item_set
            .mark_for_offline(&EntityId::new("a"), EntityType::Track)
            .await
            .unwrap();
        wait_for_status(&h.item_set, "a", DownloadStatus::Success).await;

        // An explicit re-drive also wakes the parked loop
        h.downloader.script("b", Behavior::Succeed(None));
        h.item_set
            .mark_for_offline(&EntityId::new("b"), EntityType::Track)
            .await
            .unwrap();
        h.processor.request_process_next();
        wait_for_status(&h.item_set, "b", DownloadStatus::Success).await;

        run.abort();
    }
}
