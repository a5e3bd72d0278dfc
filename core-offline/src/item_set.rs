//! # Offline Item Set
//!
//! Durable set of entities the user has asked to keep offline, plus the FIFO
//! queue of pending jobs that services them.
//!
//! ## Overview
//!
//! The item set is the single shared mutable resource of the scheduler. All
//! mutations flow through this module: user actions (`mark_for_offline`,
//! `remove_from_offline`) and the processor's status transitions
//! (`start_job`, `complete_job`, `error_job`). Everything else only reads or
//! listens to events.
//!
//! ## Persistence
//!
//! State persists in SQLite behind the [`OfflineItemRepository`] trait so the
//! set survives restarts and tests can run against `:memory:` pools:
//!
//! - `offline_items` holds one row per entry, keyed by
//!   `(entity_id, entity_type)`.
//! - `offline_queue` holds pending job descriptors; an autoincrement `seq`
//!   gives FIFO order and a unique `(job_kind, entity_id)` index keeps a job
//!   identity from being queued twice.
//!
//! The active job stays at the queue head while it runs; only terminal
//! outcomes pop it. A job suspended by network loss therefore remains at the
//! head, ready for the next drive.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{OfflineError, Result};
use crate::job::{
    DownloadStatus, EntityId, EntityType, JobDescriptor, JobKind, OfflineEntry, OfflineProgress,
};
use core_runtime::events::{CoreEvent, EventBus, OfflineEvent};

/// Repository trait for persisting the offline item set.
#[async_trait]
pub trait OfflineItemRepository: Send + Sync {
    /// Insert a new entry.
    async fn insert_entry(&self, entry: &OfflineEntry) -> Result<()>;

    /// Find an entry by identity.
    async fn find_entry(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
    ) -> Result<Option<OfflineEntry>>;

    /// Delete an entry. Returns `true` when a row was removed.
    async fn delete_entry(&self, entity_id: &EntityId, entity_type: EntityType) -> Result<bool>;

    /// Set an entry's download status. Returns `false` when the entry is
    /// absent; the row is never recreated.
    async fn set_status(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
        status: DownloadStatus,
        now: i64,
    ) -> Result<bool>;

    /// Record a completed download: status `SUCCESS`, verification and
    /// download timestamps, and the downloaded revision's `updated_at`.
    /// Returns `false` when the entry is absent.
    async fn record_completion(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
        completed_at: i64,
        remote_updated_at: Option<i64>,
    ) -> Result<bool>;

    /// Record a completed staleness verification: bumps `verified_at` only.
    /// Returns `false` when the entry is absent.
    async fn record_verification(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
        verified_at: i64,
    ) -> Result<bool>;

    /// Count all entries.
    async fn count_entries(&self) -> Result<u64>;

    /// Count entries with the given status.
    async fn count_by_status(&self, status: DownloadStatus) -> Result<u64>;

    /// Append a descriptor to the queue. Returns `false` when the identity is
    /// already queued.
    async fn push_queue(&self, descriptor: &JobDescriptor) -> Result<bool>;

    /// Remove a specific descriptor from the queue. Returns `true` when a row
    /// was removed.
    async fn remove_queued(&self, descriptor: &JobDescriptor) -> Result<bool>;

    /// Remove every queued descriptor (download and verify) for an entity.
    async fn purge_queue_for(&self, entity_id: &EntityId, entity_type: EntityType) -> Result<u64>;

    /// Peek the queue head without popping.
    async fn peek_queue(&self) -> Result<Option<JobDescriptor>>;

    /// List the whole queue in FIFO order.
    async fn list_queue(&self) -> Result<Vec<JobDescriptor>>;

    /// Wipe all entries and the queue.
    async fn clear(&self) -> Result<()>;
}

/// SQLite implementation of the offline item repository.
pub struct SqliteOfflineItemRepository {
    pool: SqlitePool,
}

impl SqliteOfflineItemRepository {
    /// Create a new repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize database tables if they don't exist.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS offline_items (
                entity_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                download_status TEXT NOT NULL,
                remote_updated_at INTEGER,
                verified_at INTEGER,
                downloaded_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (entity_id, entity_type)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| OfflineError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS offline_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                job_kind TEXT NOT NULL,
                entity_id TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| OfflineError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_offline_queue_identity
            ON offline_queue(job_kind, entity_id)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| OfflineError::Database(e.to_string()))?;

        Ok(())
    }

    fn map_entry(row: &sqlx::sqlite::SqliteRow) -> Result<OfflineEntry> {
        Ok(OfflineEntry {
            entity_id: EntityId::new(row.get::<String, _>("entity_id")),
            entity_type: EntityType::from_str(&row.get::<String, _>("entity_type"))?,
            download_status: DownloadStatus::from_str(&row.get::<String, _>("download_status"))?,
            remote_updated_at: row.get("remote_updated_at"),
            verified_at: row.get("verified_at"),
            downloaded_at: row.get("downloaded_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn map_descriptor(row: &sqlx::sqlite::SqliteRow) -> Result<JobDescriptor> {
        Ok(JobDescriptor {
            kind: JobKind::from_str(&row.get::<String, _>("job_kind"))?,
            entity_id: EntityId::new(row.get::<String, _>("entity_id")),
        })
    }
}

#[async_trait]
impl OfflineItemRepository for SqliteOfflineItemRepository {
    async fn insert_entry(&self, entry: &OfflineEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO offline_items (
                entity_id, entity_type, download_status, remote_updated_at,
                verified_at, downloaded_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.entity_id.as_str())
        .bind(entry.entity_type.as_str())
        .bind(entry.download_status.as_str())
        .bind(entry.remote_updated_at)
        .bind(entry.verified_at)
        .bind(entry.downloaded_at)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| OfflineError::Database(e.to_string()))?;

        Ok(())
    }

    async fn find_entry(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
    ) -> Result<Option<OfflineEntry>> {
        let row = sqlx::query(
            r#"
            SELECT entity_id, entity_type, download_status, remote_updated_at,
                   verified_at, downloaded_at, created_at, updated_at
            FROM offline_items
            WHERE entity_id = ? AND entity_type = ?
            "#,
        )
        .bind(entity_id.as_str())
        .bind(entity_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OfflineError::Database(e.to_string()))?;

        row.as_ref().map(Self::map_entry).transpose()
    }

    async fn delete_entry(&self, entity_id: &EntityId, entity_type: EntityType) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM offline_items WHERE entity_id = ? AND entity_type = ?",
        )
        .bind(entity_id.as_str())
        .bind(entity_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| OfflineError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_status(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
        status: DownloadStatus,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE offline_items SET download_status = ?, updated_at = ?
            WHERE entity_id = ? AND entity_type = ?
            "#,
        )
        .bind(status.as_str())
        .bind(now)
        .bind(entity_id.as_str())
        .bind(entity_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| OfflineError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_completion(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
        completed_at: i64,
        remote_updated_at: Option<i64>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE offline_items SET
                download_status = 'SUCCESS',
                verified_at = ?,
                downloaded_at = ?,
                remote_updated_at = COALESCE(?, remote_updated_at),
                updated_at = ?
            WHERE entity_id = ? AND entity_type = ?
            "#,
        )
        .bind(completed_at)
        .bind(completed_at)
        .bind(remote_updated_at)
        .bind(completed_at)
        .bind(entity_id.as_str())
        .bind(entity_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| OfflineError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_verification(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
        verified_at: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE offline_items SET verified_at = ?, updated_at = ?
            WHERE entity_id = ? AND entity_type = ?
            "#,
        )
        .bind(verified_at)
        .bind(verified_at)
        .bind(entity_id.as_str())
        .bind(entity_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| OfflineError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_entries(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM offline_items")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| OfflineError::Database(e.to_string()))?;

        Ok(count as u64)
    }

    async fn count_by_status(&self, status: DownloadStatus) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM offline_items WHERE download_status = ?")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| OfflineError::Database(e.to_string()))?;

        Ok(count as u64)
    }

    async fn push_queue(&self, descriptor: &JobDescriptor) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO offline_queue (job_kind, entity_id) VALUES (?, ?)",
        )
        .bind(descriptor.kind.as_str())
        .bind(descriptor.entity_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| OfflineError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_queued(&self, descriptor: &JobDescriptor) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM offline_queue WHERE job_kind = ? AND entity_id = ?",
        )
        .bind(descriptor.kind.as_str())
        .bind(descriptor.entity_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| OfflineError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_queue_for(&self, entity_id: &EntityId, entity_type: EntityType) -> Result<u64> {
        let kinds = (
            JobKind::download_for(entity_type),
            JobKind::verify_for(entity_type),
        );

        let result = sqlx::query(
            "DELETE FROM offline_queue WHERE entity_id = ? AND job_kind IN (?, ?)",
        )
        .bind(entity_id.as_str())
        .bind(kinds.0.as_str())
        .bind(kinds.1.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| OfflineError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn peek_queue(&self) -> Result<Option<JobDescriptor>> {
        let row = sqlx::query(
            "SELECT job_kind, entity_id FROM offline_queue ORDER BY seq ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OfflineError::Database(e.to_string()))?;

        row.as_ref().map(Self::map_descriptor).transpose()
    }

    async fn list_queue(&self) -> Result<Vec<JobDescriptor>> {
        let rows = sqlx::query("SELECT job_kind, entity_id FROM offline_queue ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OfflineError::Database(e.to_string()))?;

        rows.iter().map(Self::map_descriptor).collect()
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM offline_items")
            .execute(&self.pool)
            .await
            .map_err(|e| OfflineError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM offline_queue")
            .execute(&self.pool)
            .await
            .map_err(|e| OfflineError::Database(e.to_string()))?;

        Ok(())
    }
}

/// The offline item set: entries plus the FIFO job queue.
///
/// Holds exclusive mutation rights over the persisted state; other components
/// read entries or consume the events this set emits.
pub struct OfflineItemSet {
    repository: Arc<dyn OfflineItemRepository>,
    event_bus: EventBus,
}

impl OfflineItemSet {
    /// Create an item set backed by SQLite, initializing the schema.
    pub async fn new(pool: SqlitePool, event_bus: EventBus) -> Result<Self> {
        let repository = SqliteOfflineItemRepository::new(pool);
        repository.initialize().await?;

        Ok(Self {
            repository: Arc::new(repository),
            event_bus,
        })
    }

    /// Create an item set with a custom repository.
    pub fn with_repository(repository: Arc<dyn OfflineItemRepository>, event_bus: EventBus) -> Self {
        Self {
            repository,
            event_bus,
        }
    }

    /// Mark an entity to be kept offline.
    ///
    /// Creates an `INIT` entry and enqueues its download job. Idempotent when
    /// the entity is already tracked with a status other than `ERROR`; an
    /// `ERROR` entry is reset to `INIT` and re-enqueued. Returns `true` when
    /// a job was enqueued.
    pub async fn mark_for_offline(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        match self.repository.find_entry(entity_id, entity_type).await? {
            Some(entry) if entry.download_status != DownloadStatus::Error => {
                debug!(
                    entity_id = %entity_id,
                    entity_type = %entity_type,
                    status = %entry.download_status,
                    "Entity already tracked for offline"
                );
                return Ok(false);
            }
            Some(_) => {
                self.repository
                    .set_status(entity_id, entity_type, DownloadStatus::Init, now)
                    .await?;
            }
            None => {
                let entry = OfflineEntry::new(entity_id.clone(), entity_type, now);
                self.repository.insert_entry(&entry).await?;
            }
        }

        let descriptor = JobDescriptor::download(entity_type, entity_id.clone());
        self.repository.push_queue(&descriptor).await?;

        info!(
            entity_id = %entity_id,
            entity_type = %entity_type,
            "Entity marked for offline"
        );
        self.emit_enqueued(entity_id, entity_type);

        Ok(true)
    }

    /// Remove an entity from the offline set.
    ///
    /// Deletes the entry and purges its queued jobs *before* broadcasting the
    /// removal, so an active job's abort watcher re-reads the set and
    /// observes the absence. Returns `true` when an entry was removed.
    pub async fn remove_from_offline(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
    ) -> Result<bool> {
        let existed = self.repository.delete_entry(entity_id, entity_type).await?;
        let purged = self.repository.purge_queue_for(entity_id, entity_type).await?;

        if existed {
            info!(
                entity_id = %entity_id,
                entity_type = %entity_type,
                purged_jobs = purged,
                "Entity removed from offline set"
            );
            self.event_bus
                .emit(CoreEvent::Offline(OfflineEvent::ItemRemoved {
                    entity_id: entity_id.to_string(),
                    entity_type: entity_type.as_str().to_string(),
                }))
                .ok();
        }

        Ok(existed)
    }

    /// Get the offline entry for an entity, if tracked.
    pub async fn get(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
    ) -> Result<Option<OfflineEntry>> {
        self.repository.find_entry(entity_id, entity_type).await
    }

    /// List pending job descriptors in FIFO order.
    pub async fn list_pending(&self) -> Result<Vec<JobDescriptor>> {
        self.repository.list_queue().await
    }

    /// Peek the next pending descriptor without popping it.
    ///
    /// The head is popped only by a terminal outcome, so a job frozen by
    /// network loss stays resumable.
    pub async fn next_pending(&self) -> Result<Option<JobDescriptor>> {
        self.repository.peek_queue().await
    }

    /// Move an entry to `LOADING` as its job becomes active. Returns `false`
    /// when the entry no longer exists.
    pub async fn start_job(&self, descriptor: &JobDescriptor) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        self.repository
            .set_status(
                &descriptor.entity_id,
                descriptor.entity_type(),
                DownloadStatus::Loading,
                now,
            )
            .await
    }

    /// Record a job's successful outcome and pop it from the queue.
    ///
    /// Download kinds move the entry to `SUCCESS` and stamp
    /// `verified_at`/`downloaded_at`; verify kinds only bump `verified_at`.
    /// A write racing a removal is skipped: the entry is never recreated.
    pub async fn complete_job(
        &self,
        descriptor: &JobDescriptor,
        completed_at: i64,
        remote_updated_at: Option<i64>,
    ) -> Result<()> {
        let written = if descriptor.kind.is_verify() {
            self.repository
                .record_verification(&descriptor.entity_id, descriptor.entity_type(), completed_at)
                .await?
        } else {
            self.repository
                .record_completion(
                    &descriptor.entity_id,
                    descriptor.entity_type(),
                    completed_at,
                    remote_updated_at,
                )
                .await?
        };

        if !written {
            debug!(
                descriptor = %descriptor,
                "Entry removed before completion write; skipped"
            );
        }

        self.repository.remove_queued(descriptor).await?;
        Ok(())
    }

    /// Record a job's failed outcome and pop it from the queue.
    ///
    /// Download kinds move the entry to `ERROR`; a failed verification leaves
    /// the entry's status untouched.
    pub async fn error_job(&self, descriptor: &JobDescriptor) -> Result<()> {
        if !descriptor.kind.is_verify() {
            let now = chrono::Utc::now().timestamp();
            self.repository
                .set_status(
                    &descriptor.entity_id,
                    descriptor.entity_type(),
                    DownloadStatus::Error,
                    now,
                )
                .await?;
        }

        self.repository.remove_queued(descriptor).await?;
        Ok(())
    }

    /// Drop a queued descriptor without touching the entry.
    pub async fn discard(&self, descriptor: &JobDescriptor) -> Result<bool> {
        self.repository.remove_queued(descriptor).await
    }

    /// Reset an entry to `INIT` and enqueue a fresh download.
    ///
    /// The staleness verifier's reconciliation side effect, and the retry
    /// path for `ERROR` entries. Returns `false` when the entity is no longer
    /// tracked.
    pub async fn redownload(&self, entity_id: &EntityId, entity_type: EntityType) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let reset = self
            .repository
            .set_status(entity_id, entity_type, DownloadStatus::Init, now)
            .await?;

        if !reset {
            return Ok(false);
        }

        let descriptor = JobDescriptor::download(entity_type, entity_id.clone());
        self.repository.push_queue(&descriptor).await?;
        self.emit_enqueued(entity_id, entity_type);

        Ok(true)
    }

    /// Enqueue a staleness verification for a tracked entity. Returns `false`
    /// when the entity is not tracked or the check is already queued.
    pub async fn request_stale_check(
        &self,
        entity_id: &EntityId,
        entity_type: EntityType,
    ) -> Result<bool> {
        if self.repository.find_entry(entity_id, entity_type).await?.is_none() {
            return Ok(false);
        }

        let descriptor = JobDescriptor::verify(entity_type, entity_id.clone());
        let queued = self.repository.push_queue(&descriptor).await?;

        if queued {
            debug!(descriptor = %descriptor, "Staleness check enqueued");
            self.emit_enqueued(entity_id, entity_type);
        }

        Ok(queued)
    }

    /// Aggregate progress over all entries.
    pub async fn progress(&self) -> Result<OfflineProgress> {
        let total = self.repository.count_entries().await?;
        let succeeded = self.repository.count_by_status(DownloadStatus::Success).await?;
        let errored = self.repository.count_by_status(DownloadStatus::Error).await?;

        Ok(OfflineProgress {
            total,
            finished: succeeded + errored,
            succeeded,
        })
    }

    /// Wipe all entries and pending jobs.
    pub async fn clear(&self) -> Result<()> {
        self.repository.clear().await?;
        info!("Offline item set cleared");
        Ok(())
    }

    fn emit_enqueued(&self, entity_id: &EntityId, entity_type: EntityType) {
        self.event_bus
            .emit(CoreEvent::Offline(OfflineEvent::ItemEnqueued {
                entity_id: entity_id.to_string(),
                entity_type: entity_type.as_str().to_string(),
            }))
            .ok();
    }
}
