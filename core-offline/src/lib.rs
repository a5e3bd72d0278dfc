//! # Offline Content Synchronization Scheduler
//!
//! Keeps locally cached tracks and collections consistent with server state
//! under an unreliable, intermittently connected network.
//!
//! ## Overview
//!
//! This crate manages the lifecycle of offline content jobs, including:
//! - Tracking which entities the user wants kept offline
//! - Running downloads and staleness verifications one at a time, FIFO
//! - Racing each active job against cooperative abort (entity removed) and
//!   hard cancellation (network unreachable)
//! - Re-enqueueing downloads when the remote copy is newer than the cache
//!
//! ## Components
//!
//! - **Job Model** (`job`): descriptors, kinds, outcomes and status types
//! - **Offline Item Set** (`item_set`): durable entry set + FIFO job queue,
//!   persisted in SQLite behind a repository trait
//! - **Reachability Monitor** (`reachability`): process-wide connectivity
//!   signal and the reconnect re-drive driver
//! - **Staleness Verifier** (`verifier`): remote-vs-local metadata diffing
//! - **Job Queue Processor** (`processor`): the single-slot scheduler and its
//!   three-way race
//! - **Facade** (`service`): component wiring and task management

pub mod db;
pub mod error;
pub mod item_set;
pub mod job;
pub mod processor;
pub mod reachability;
pub mod service;
pub mod verifier;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{OfflineError, Result};
pub use item_set::{OfflineItemRepository, OfflineItemSet, SqliteOfflineItemRepository};
pub use job::{
    DownloadStatus, EntityId, EntityType, JobDescriptor, JobKind, JobOutcome, OfflineEntry,
    OfflineProgress, QueueStatus,
};
pub use processor::JobQueueProcessor;
pub use reachability::{spawn_reconnect_redrive, Reachability, ReachabilityState};
pub use service::OfflineSync;
pub use verifier::StalenessVerifier;
