//! # Offline Job Model
//!
//! Identifies and classifies the units of work the queue processor runs.
//!
//! ## Overview
//!
//! A job is identified by `(kind, entity_id)`: at most one job with a given
//! identity may be active at a time, and the pending queue never holds two
//! descriptors with the same identity. Download kinds produce local content;
//! verify kinds diff remote metadata against the cached copy and enqueue a
//! re-download when the remote copy is newer.
//!
//! ## Job lifecycle
//!
//! ```text
//! Pending ──→ Active ──→ {Succeeded, Failed, Aborted, Cancelled}
//! ```
//!
//! `Pending` is implicit membership in the offline queue; `Active` begins at
//! dequeue. `Cancelled` (network loss) is not terminal: the descriptor stays
//! at the queue head, eligible for re-drive once connectivity returns.

use crate::{OfflineError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Entity Identity
// ============================================================================

/// Server-assigned identifier of a track or collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an entity id from its server-side string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string representation of this id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The kind of entity a job targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A single audio track
    Track,
    /// A collection (playlist/album) of tracks
    Collection,
}

impl EntityType {
    /// Get the string representation for storage and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Track => "track",
            EntityType::Collection => "collection",
        }
    }
}

impl FromStr for EntityType {
    type Err = OfflineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "track" => Ok(EntityType::Track),
            "collection" => Ok(EntityType::Collection),
            _ => Err(OfflineError::InvalidEntityType(s.to_string())),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Job Kinds
// ============================================================================

/// Closed set of job kinds the processor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// Download a track's content for offline playback
    DownloadTrack,
    /// Download a collection's content for offline use
    DownloadCollection,
    /// Check a cached track against the authoritative remote copy
    VerifyStaleTrack,
    /// Check a cached collection against the authoritative remote copy
    VerifyStaleCollection,
}

impl JobKind {
    /// The entity kind this job targets.
    pub fn entity_type(&self) -> EntityType {
        match self {
            JobKind::DownloadTrack | JobKind::VerifyStaleTrack => EntityType::Track,
            JobKind::DownloadCollection | JobKind::VerifyStaleCollection => EntityType::Collection,
        }
    }

    /// Whether this is a staleness-verification kind.
    pub fn is_verify(&self) -> bool {
        matches!(self, JobKind::VerifyStaleTrack | JobKind::VerifyStaleCollection)
    }

    /// The download kind for an entity type.
    pub fn download_for(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Track => JobKind::DownloadTrack,
            EntityType::Collection => JobKind::DownloadCollection,
        }
    }

    /// The verify kind for an entity type.
    pub fn verify_for(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Track => JobKind::VerifyStaleTrack,
            EntityType::Collection => JobKind::VerifyStaleCollection,
        }
    }

    /// Get the string representation for storage and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::DownloadTrack => "download-track",
            JobKind::DownloadCollection => "download-collection",
            JobKind::VerifyStaleTrack => "verify-stale-track",
            JobKind::VerifyStaleCollection => "verify-stale-collection",
        }
    }
}

impl FromStr for JobKind {
    type Err = OfflineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "download-track" => Ok(JobKind::DownloadTrack),
            "download-collection" => Ok(JobKind::DownloadCollection),
            "verify-stale-track" => Ok(JobKind::VerifyStaleTrack),
            "verify-stale-collection" => Ok(JobKind::VerifyStaleCollection),
            _ => Err(OfflineError::InvalidJobKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Job Descriptor
// ============================================================================

/// Immutable identity of a unit of work: `(kind, entity_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// The kind of work
    pub kind: JobKind,
    /// The target entity
    pub entity_id: EntityId,
}

impl JobDescriptor {
    /// Create a descriptor.
    pub fn new(kind: JobKind, entity_id: impl Into<EntityId>) -> Self {
        Self {
            kind,
            entity_id: entity_id.into(),
        }
    }

    /// The download descriptor for an entity.
    pub fn download(entity_type: EntityType, entity_id: impl Into<EntityId>) -> Self {
        Self::new(JobKind::download_for(entity_type), entity_id)
    }

    /// The staleness-verification descriptor for an entity.
    pub fn verify(entity_type: EntityType, entity_id: impl Into<EntityId>) -> Self {
        Self::new(JobKind::verify_for(entity_type), entity_id)
    }

    /// The entity kind this descriptor targets.
    pub fn entity_type(&self) -> EntityType {
        self.kind.entity_type()
    }
}

impl std::fmt::Display for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.entity_id)
    }
}

// ============================================================================
// Job Outcome
// ============================================================================

/// Terminal result of a job's work, with no payload beyond the discriminant.
///
/// Staleness itself is not an error: a verify job that found the cached copy
/// outdated still reports `Success`; the re-download it enqueued is its only
/// side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The work finished
    Success,
    /// The work failed (transient or missing-context)
    Error,
}

impl JobOutcome {
    /// Whether the outcome is `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// Externally observable projection of an entry's download progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadStatus {
    /// Queued, not yet started
    Init,
    /// Download or verification in flight (a suspended job renders the same)
    Loading,
    /// Content downloaded and verified
    Success,
    /// The last attempt failed; retryable by re-marking for offline
    Error,
}

impl DownloadStatus {
    /// Check if this status represents a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadStatus::Success | DownloadStatus::Error)
    }

    /// Get the string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Init => "INIT",
            DownloadStatus::Loading => "LOADING",
            DownloadStatus::Success => "SUCCESS",
            DownloadStatus::Error => "ERROR",
        }
    }
}

impl FromStr for DownloadStatus {
    type Err = OfflineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "INIT" => Ok(DownloadStatus::Init),
            "LOADING" => Ok(DownloadStatus::Loading),
            "SUCCESS" => Ok(DownloadStatus::Success),
            "ERROR" => Ok(DownloadStatus::Error),
            _ => Err(OfflineError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate state of the queue processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    /// No pending work
    Idle,
    /// Suspended by network loss; waiting for an external re-drive
    Paused,
    /// Actively draining the queue
    Processing,
}

impl QueueStatus {
    /// Get the string representation for events.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Idle => "IDLE",
            QueueStatus::Paused => "PAUSED",
            QueueStatus::Processing => "PROCESSING",
        }
    }
}

impl FromStr for QueueStatus {
    type Err = OfflineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "IDLE" => Ok(QueueStatus::Idle),
            "PAUSED" => Ok(QueueStatus::Paused),
            "PROCESSING" => Ok(QueueStatus::Processing),
            _ => Err(OfflineError::InvalidQueueStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Offline Entry
// ============================================================================

/// Persisted per-entity record in the offline item set.
///
/// Created when the user marks an entity for offline; mutated only by the
/// queue processor's status transitions; destroyed when the user removes the
/// entity from the offline set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineEntry {
    /// The entity this entry tracks
    pub entity_id: EntityId,
    /// Track or collection
    pub entity_type: EntityType,
    /// Observable download status
    pub download_status: DownloadStatus,
    /// `updated_at` of the revision held locally, from the download result
    pub remote_updated_at: Option<i64>,
    /// Unix timestamp of the last successful verification or download
    pub verified_at: Option<i64>,
    /// Unix timestamp of the last completed download
    pub downloaded_at: Option<i64>,
    /// Unix timestamp when the entry was created
    pub created_at: i64,
    /// Unix timestamp when the entry was last updated
    pub updated_at: i64,
}

impl OfflineEntry {
    /// Create a fresh entry in `INIT` state.
    pub fn new(entity_id: EntityId, entity_type: EntityType, now: i64) -> Self {
        Self {
            entity_id,
            entity_type,
            download_status: DownloadStatus::Init,
            remote_updated_at: None,
            verified_at: None,
            downloaded_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Aggregate Progress
// ============================================================================

/// Aggregate download progress over the whole offline item set, for
/// "N / M downloaded" style rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineProgress {
    /// Total number of offline entries
    pub total: u64,
    /// Entries in a terminal status (`SUCCESS` or `ERROR`)
    pub finished: u64,
    /// Entries in `SUCCESS`
    pub succeeded: u64,
}

impl OfflineProgress {
    /// Whether every entry has reached a terminal status.
    pub fn is_complete(&self) -> bool {
        self.finished == self.total
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_round_trip() {
        let id = EntityId::new("track-42");
        assert_eq!(id.as_str(), "track-42");
        assert_eq!(id.to_string(), "track-42");
        assert_eq!(EntityId::from("track-42"), id);
    }

    #[test]
    fn test_entity_type_parsing() {
        assert_eq!("track".parse::<EntityType>().unwrap(), EntityType::Track);
        assert_eq!(
            "COLLECTION".parse::<EntityType>().unwrap(),
            EntityType::Collection
        );
        assert!("album".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_job_kind_entity_type() {
        assert_eq!(JobKind::DownloadTrack.entity_type(), EntityType::Track);
        assert_eq!(JobKind::VerifyStaleTrack.entity_type(), EntityType::Track);
        assert_eq!(
            JobKind::DownloadCollection.entity_type(),
            EntityType::Collection
        );
        assert_eq!(
            JobKind::VerifyStaleCollection.entity_type(),
            EntityType::Collection
        );
    }

    #[test]
    fn test_job_kind_is_verify() {
        assert!(!JobKind::DownloadTrack.is_verify());
        assert!(!JobKind::DownloadCollection.is_verify());
        assert!(JobKind::VerifyStaleTrack.is_verify());
        assert!(JobKind::VerifyStaleCollection.is_verify());
    }

    #[test]
    fn test_job_kind_string_round_trip() {
        for kind in [
            JobKind::DownloadTrack,
            JobKind::DownloadCollection,
            JobKind::VerifyStaleTrack,
            JobKind::VerifyStaleCollection,
        ] {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
        }
        assert!("upload-track".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_descriptor_identity() {
        let download = JobDescriptor::download(EntityType::Track, "t1");
        let verify = JobDescriptor::verify(EntityType::Track, "t1");

        // Same entity, different kinds: distinct identities
        assert_ne!(download, verify);
        assert_eq!(download, JobDescriptor::new(JobKind::DownloadTrack, "t1"));
        assert_eq!(download.entity_type(), EntityType::Track);
        assert_eq!(download.to_string(), "download-track:t1");
    }

    #[test]
    fn test_download_status_parsing() {
        assert_eq!(
            "LOADING".parse::<DownloadStatus>().unwrap(),
            DownloadStatus::Loading
        );
        assert_eq!(
            "success".parse::<DownloadStatus>().unwrap(),
            DownloadStatus::Success
        );
        assert!("ABANDONED".parse::<DownloadStatus>().is_err());
    }

    #[test]
    fn test_download_status_is_terminal() {
        assert!(!DownloadStatus::Init.is_terminal());
        assert!(!DownloadStatus::Loading.is_terminal());
        assert!(DownloadStatus::Success.is_terminal());
        assert!(DownloadStatus::Error.is_terminal());
    }

    #[test]
    fn test_queue_status_round_trip() {
        for status in [
            QueueStatus::Idle,
            QueueStatus::Paused,
            QueueStatus::Processing,
        ] {
            assert_eq!(status.as_str().parse::<QueueStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_offline_entry_new() {
        let entry = OfflineEntry::new(EntityId::new("t1"), EntityType::Track, 1700000000);

        assert_eq!(entry.download_status, DownloadStatus::Init);
        assert!(entry.remote_updated_at.is_none());
        assert!(entry.verified_at.is_none());
        assert!(entry.downloaded_at.is_none());
        assert_eq!(entry.created_at, 1700000000);
    }

    #[test]
    fn test_outcome_is_success() {
        assert!(JobOutcome::Success.is_success());
        assert!(!JobOutcome::Error.is_success());
    }

    #[test]
    fn test_progress_is_complete() {
        let progress = OfflineProgress {
            total: 3,
            finished: 2,
            succeeded: 2,
        };
        assert!(!progress.is_complete());

        let done = OfflineProgress {
            total: 3,
            finished: 3,
            succeeded: 2,
        };
        assert!(done.is_complete());
    }
}
