//! Content Downloader Abstraction
//!
//! The byte-level download collaborator. The scheduler treats each download
//! as one awaitable operation; transcoding, disk writes and media-file
//! persistence all live behind this trait.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Result of a completed download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedItem {
    /// `updated_at` of the revision that was downloaded, when the backend
    /// reports it. Recorded locally so later staleness checks can compare
    /// against the authoritative copy.
    pub remote_updated_at: Option<i64>,
}

/// Downloads track and collection content for offline use.
#[async_trait::async_trait]
pub trait ContentDownloader: Send + Sync {
    /// Download a track's audio and artwork for offline playback.
    async fn download_track(&self, track_id: &str) -> Result<DownloadedItem>;

    /// Download a collection's metadata and artwork for offline use.
    async fn download_collection(&self, collection_id: &str) -> Result<DownloadedItem>;
}
