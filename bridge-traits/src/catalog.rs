//! Catalog Client Abstraction
//!
//! Authoritative remote metadata lookups for tracks and collections.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Authoritative metadata for a remote entity, scoped to the requesting user
/// so that access-control-gated fields resolve correctly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMetadata {
    /// Server-assigned entity id
    pub entity_id: String,
    /// Unix timestamp of the entity's last modification on the server
    pub updated_at: i64,
    /// Owner of the entity, when the backend exposes it
    pub owner_id: Option<String>,
}

/// Backend catalog client.
///
/// A missing entity is `Ok(None)`, never an error, so callers can treat
/// "not found" and transport failures differently.
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch the authoritative metadata for a track, scoped to `user_id`.
    async fn get_track(&self, track_id: &str, user_id: &str) -> Result<Option<RemoteMetadata>>;

    /// Fetch the authoritative metadata for a collection, scoped to `user_id`.
    async fn get_collection(
        &self,
        collection_id: &str,
        user_id: &str,
    ) -> Result<Option<RemoteMetadata>>;
}
