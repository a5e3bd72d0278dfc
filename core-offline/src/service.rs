//! # Offline Sync Facade
//!
//! Wires the scheduler components from a [`CoreConfig`] and manages their
//! background tasks.
//!
//! ## Overview
//!
//! `OfflineSync` is the assembly point the embedding application talks to:
//! it builds the sqlite pool, item set, reachability monitor, verifier and
//! queue processor, then [`start`](OfflineSync::start) spawns the processing
//! loop, the reconnect re-drive driver, and (when a platform monitor was
//! configured) the reachability feed. [`shutdown`](OfflineSync::shutdown)
//! cancels and reaps all of them.

use crate::db::{create_pool, DatabaseConfig};
use crate::error::Result;
use crate::item_set::OfflineItemSet;
use crate::job::{EntityId, EntityType, OfflineEntry, OfflineProgress, QueueStatus};
use crate::processor::JobQueueProcessor;
use crate::reachability::{spawn_reconnect_redrive, Reachability};
use crate::verifier::StalenessVerifier;
use bridge_traits::NetworkMonitor;
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, Receiver};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The assembled offline sync scheduler.
pub struct OfflineSync {
    event_bus: EventBus,
    item_set: Arc<OfflineItemSet>,
    reachability: Arc<Reachability>,
    processor: Arc<JobQueueProcessor>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    shutdown: CancellationToken,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl OfflineSync {
    /// Build all components from a validated configuration.
    pub async fn initialize(config: CoreConfig) -> Result<Self> {
        let event_bus = EventBus::new(config.event_capacity);

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;

        let item_set = Arc::new(OfflineItemSet::new(pool, event_bus.clone()).await?);
        let reachability = Arc::new(Reachability::new(event_bus.clone()));
        let verifier = StalenessVerifier::new(
            config.catalog_client,
            config.session_provider,
            item_set.clone(),
        );

        let shutdown = CancellationToken::new();
        let processor = Arc::new(JobQueueProcessor::new(
            item_set.clone(),
            verifier,
            config.content_downloader,
            reachability.clone(),
            event_bus.clone(),
            shutdown.clone(),
        ));

        Ok(Self {
            event_bus,
            item_set,
            reachability,
            processor,
            network_monitor: config.network_monitor,
            shutdown,
            tasks: StdMutex::new(Vec::new()),
        })
    }

    /// Spawn the background tasks. Calling twice is a no-op.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().expect("task registry poisoned");
        if !tasks.is_empty() {
            return;
        }

        let processor = self.processor.clone();
        tasks.push(tokio::spawn(async move { processor.run().await }));

        let redrive_target = self.processor.clone();
        tasks.push(spawn_reconnect_redrive(
            &self.event_bus,
            self.shutdown.clone(),
            move || redrive_target.request_process_next(),
        ));

        if let Some(monitor) = &self.network_monitor {
            let reachability = self.reachability.clone();
            let monitor = monitor.clone();
            let shutdown = self.shutdown.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(err) = reachability.drive(monitor, shutdown).await {
                    warn!(error = %err, "Network monitor feed stopped");
                }
            }));
        }

        info!("Offline sync started");
    }

    /// Cancel and reap the background tasks.
    ///
    /// An in-flight job is dropped at its next await point.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let tasks: Vec<_> = {
            let mut guard = self.tasks.lock().expect("task registry poisoned");
            guard.drain(..).collect()
        };

        for task in tasks {
            task.abort();
            task.await.ok();
        }

        info!("Offline sync stopped");
    }

    /// The offline item set (marking, removal, status reads).
    pub fn item_set(&self) -> &Arc<OfflineItemSet> {
        &self.item_set
    }

    /// The reachability monitor.
    pub fn reachability(&self) -> &Arc<Reachability> {
        &self.reachability
    }

    /// Subscribe to core events for UI binding.
    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// The processor's aggregate state.
    pub fn queue_status(&self) -> QueueStatus {
        self.processor.queue_status()
    }

    /// Subscribe to aggregate state changes.
    pub fn subscribe_queue_status(&self) -> watch::Receiver<QueueStatus> {
        self.processor.subscribe_status()
    }

    /// Request a drive of the pending queue (crash-recovery re-drive).
    pub fn request_process_next(&self) {
        self.processor.request_process_next();
    }

    /// Mark an entity to be kept offline.
    pub async fn mark_for_offline(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
    ) -> Result<bool> {
        self.item_set.mark_for_offline(entity_id, entity_type).await
    }

    /// Remove an entity from the offline set.
    pub async fn remove_from_offline(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
    ) -> Result<bool> {
        self.item_set
            .remove_from_offline(entity_id, entity_type)
            .await
    }

    /// Enqueue a staleness verification for a tracked entity.
    pub async fn request_stale_check(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
    ) -> Result<bool> {
        self.item_set
            .request_stale_check(entity_id, entity_type)
            .await
    }

    /// Get the offline entry for an entity, if tracked.
    pub async fn status(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
    ) -> Result<Option<OfflineEntry>> {
        self.item_set.get(entity_id, entity_type).await
    }

    /// Aggregate progress for "N / M downloaded" rendering.
    pub async fn progress(&self) -> Result<OfflineProgress> {
        self.item_set.progress().await
    }
}
