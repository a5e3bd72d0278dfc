//! # Staleness Verifier
//!
//! Decides whether a cached entity is outdated relative to the authoritative
//! remote copy, and enqueues a re-download when it is.
//!
//! ## Algorithm
//!
//! 1. Read the cached entry and the current user id; missing either is a
//!    fast-fail (`Error`) with no network call, since verification without an
//!    identity context could mask access-control-gated drift.
//! 2. Fetch the remote copy scoped to the current user; a transport failure
//!    or a missing entity is `Error`.
//! 3. A remote `updated_at` strictly newer than the cached revision enqueues
//!    a fresh download for the same entity, fire-and-forget relative to this
//!    job.
//! 4. Staleness itself is `Success`: it is a trigger, not an error.
//!
//! The verifier never retries; re-enqueueing after `Error` is the queue's
//! responsibility.

use crate::item_set::OfflineItemSet;
use crate::job::{EntityType, JobDescriptor, JobOutcome};
use bridge_traits::{CatalogClient, RemoteMetadata, SessionProvider};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Verifies cached entries against authoritative remote metadata.
pub struct StalenessVerifier {
    catalog: Arc<dyn CatalogClient>,
    session: Arc<dyn SessionProvider>,
    item_set: Arc<OfflineItemSet>,
}

impl StalenessVerifier {
    /// Create a verifier.
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        session: Arc<dyn SessionProvider>,
        item_set: Arc<OfflineItemSet>,
    ) -> Self {
        Self {
            catalog,
            session,
            item_set,
        }
    }

    /// Verify one cached entity.
    ///
    /// Outcomes never propagate as errors; the re-download side effect is the
    /// only write this performs.
    #[instrument(skip(self), fields(descriptor = %descriptor))]
    pub async fn verify(&self, descriptor: &JobDescriptor) -> JobOutcome {
        let entity_type = descriptor.entity_type();

        let entry = match self.item_set.get(&descriptor.entity_id, entity_type).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!("No cached entry; cannot verify");
                return JobOutcome::Error;
            }
            Err(error) => {
                warn!(%error, "Failed to read cached entry");
                return JobOutcome::Error;
            }
        };

        let Some(user_id) = self.session.current_user_id().await else {
            debug!("No authenticated user; cannot verify");
            return JobOutcome::Error;
        };

        let remote = match self.fetch_remote(descriptor, entity_type, &user_id).await {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                debug!("Entity not found on remote");
                return JobOutcome::Error;
            }
            Err(error) => {
                warn!(%error, "Remote metadata fetch failed");
                return JobOutcome::Error;
            }
        };

        let is_stale = match entry.remote_updated_at {
            Some(local) => remote.updated_at > local,
            // No recorded revision: treat the cached copy as outdated
            None => true,
        };

        if is_stale {
            match self
                .item_set
                .redownload(&descriptor.entity_id, entity_type)
                .await
            {
                Ok(true) => info!(
                    remote_updated_at = remote.updated_at,
                    local_updated_at = ?entry.remote_updated_at,
                    "Cached copy outdated; re-download enqueued"
                ),
                Ok(false) => debug!("Entry removed before re-download could be enqueued"),
                Err(error) => warn!(%error, "Failed to enqueue re-download"),
            }
        } else {
            debug!(
                remote_updated_at = remote.updated_at,
                "Cached copy up to date"
            );
        }

        JobOutcome::Success
    }

    async fn fetch_remote(
        &self,
        descriptor: &JobDescriptor,
        entity_type: EntityType,
        user_id: &str,
    ) -> bridge_traits::error::Result<Option<RemoteMetadata>> {
        match entity_type {
            EntityType::Track => {
                self.catalog
                    .get_track(descriptor.entity_id.as_str(), user_id)
                    .await
            }
            EntityType::Collection => {
                self.catalog
                    .get_collection(descriptor.entity_id.as_str(), user_id)
                    .await
            }
        }
    }
}
