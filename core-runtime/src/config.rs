//! # Core Configuration Module
//!
//! Provides configuration management for the offline sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `CoreConfig` instance that holds all dependencies and settings required by
//! the scheduler. It enforces fail-fast validation so that a missing bridge
//! surfaces as an actionable error at startup rather than a panic deep inside
//! a job.
//!
//! ## Required Dependencies
//!
//! - `CatalogClient` - Remote metadata lookups for staleness verification
//! - `SessionProvider` - Current authenticated user resolution
//! - `ContentDownloader` - Byte-level track/collection downloads
//!
//! ## Optional Dependencies
//!
//! - `NetworkMonitor` - Platform connectivity signal source. When absent, the
//!   host is expected to feed reachability transitions into the core itself.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/offline.db")
//!     .catalog_client(Arc::new(MyCatalogClient))
//!     .session_provider(Arc::new(MySessionProvider))
//!     .content_downloader(Arc::new(MyDownloader))
//!     .build()
//!     .expect("Failed to build config");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{CatalogClient, ContentDownloader, NetworkMonitor, SessionProvider};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default event bus buffer size.
const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Core configuration for the offline sync scheduler.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file holding the offline item set
    pub database_path: PathBuf,

    /// Buffer size for the broadcast event bus
    pub event_capacity: usize,

    /// Catalog client for authoritative remote metadata
    pub catalog_client: Arc<dyn CatalogClient>,

    /// Current-user provider
    pub session_provider: Arc<dyn SessionProvider>,

    /// Byte-level content downloader
    pub content_downloader: Arc<dyn ContentDownloader>,

    /// Optional platform network monitor
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,
}

impl CoreConfig {
    /// Create a new builder.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("event_capacity", &self.event_capacity)
            .field("has_network_monitor", &self.network_monitor.is_some())
            .finish()
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    event_capacity: Option<usize>,
    catalog_client: Option<Arc<dyn CatalogClient>>,
    session_provider: Option<Arc<dyn SessionProvider>>,
    content_downloader: Option<Arc<dyn ContentDownloader>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
}

impl CoreConfigBuilder {
    /// Set the SQLite database path.
    pub fn database_path(mut self, path: impl AsRef<Path>) -> Self {
        self.database_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the event bus buffer size.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    /// Inject the catalog client bridge.
    pub fn catalog_client(mut self, client: Arc<dyn CatalogClient>) -> Self {
        self.catalog_client = Some(client);
        self
    }

    /// Inject the session provider bridge.
    pub fn session_provider(mut self, provider: Arc<dyn SessionProvider>) -> Self {
        self.session_provider = Some(provider);
        self
    }

    /// Inject the content downloader bridge.
    pub fn content_downloader(mut self, downloader: Arc<dyn ContentDownloader>) -> Self {
        self.content_downloader = Some(downloader);
        self
    }

    /// Inject the optional platform network monitor.
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Build the configuration, validating that all required capabilities are
    /// present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no database path was given, and
    /// [`Error::CapabilityMissing`] with an actionable message for each
    /// missing required bridge.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self
            .database_path
            .ok_or_else(|| Error::Config("database_path is required".to_string()))?;

        let catalog_client = self.catalog_client.ok_or_else(|| Error::CapabilityMissing {
            capability: "CatalogClient".to_string(),
            message: "No catalog client provided. Inject the platform's backend API adapter."
                .to_string(),
        })?;

        let session_provider = self
            .session_provider
            .ok_or_else(|| Error::CapabilityMissing {
                capability: "SessionProvider".to_string(),
                message: "No session provider given. Inject the host's authentication adapter."
                    .to_string(),
            })?;

        let content_downloader = self
            .content_downloader
            .ok_or_else(|| Error::CapabilityMissing {
                capability: "ContentDownloader".to_string(),
                message: "No content downloader given. Inject the host's download engine adapter."
                    .to_string(),
            })?;

        Ok(CoreConfig {
            database_path,
            event_capacity: self.event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY),
            catalog_client,
            session_provider,
            content_downloader,
            network_monitor: self.network_monitor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::catalog::RemoteMetadata;
    use bridge_traits::downloader::DownloadedItem;
    use bridge_traits::network::{NetworkChangeStream, NetworkInfo};

    struct NullCatalog;

    #[async_trait::async_trait]
    impl CatalogClient for NullCatalog {
        async fn get_track(
            &self,
            _track_id: &str,
            _user_id: &str,
        ) -> bridge_traits::error::Result<Option<RemoteMetadata>> {
            Ok(None)
        }

        async fn get_collection(
            &self,
            _collection_id: &str,
            _user_id: &str,
        ) -> bridge_traits::error::Result<Option<RemoteMetadata>> {
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

    struct NullDownloader;

    #[async_trait::async_trait]
    impl ContentDownloader for NullDownloader {
        async fn download_track(
            &self,
            _track_id: &str,
        ) -> bridge_traits::error::Result<DownloadedItem> {
            Ok(DownloadedItem {
                remote_updated_at: None,
            })
        }

        async fn download_collection(
            &self,
            _collection_id: &str,
        ) -> bridge_traits::error::Result<DownloadedItem> {
            Ok(DownloadedItem {
                remote_updated_at: None,
            })
        }
    }

    struct NullMonitor;

    #[async_trait::async_trait]
    impl NetworkMonitor for NullMonitor {
        async fn get_network_info(&self) -> bridge_traits::error::Result<NetworkInfo> {
            Err(bridge_traits::BridgeError::NotAvailable(
                "test monitor".to_string(),
            ))
        }

        async fn subscribe_changes(
            &self,
        ) -> bridge_traits::error::Result<Box<dyn NetworkChangeStream>> {
            Err(bridge_traits::BridgeError::NotAvailable(
                "test monitor".to_string(),
            ))
        }
    }

    fn full_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .database_path("/tmp/offline.db")
            .catalog_client(Arc::new(NullCatalog))
            .session_provider(Arc::new(NullSession))
            .content_downloader(Arc::new(NullDownloader))
    }

    #[test]
    fn test_build_with_required_bridges() {
        let config = full_builder().build().unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/offline.db"));
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert!(config.network_monitor.is_none());
    }

    #[test]
    fn test_build_with_network_monitor() {
        let config = full_builder()
            .network_monitor(Arc::new(NullMonitor))
            .event_capacity(32)
            .build()
            .unwrap();

        assert!(config.network_monitor.is_some());
        assert_eq!(config.event_capacity, 32);
    }

    #[test]
    fn test_missing_database_path() {
        let result = CoreConfig::builder()
            .catalog_client(Arc::new(NullCatalog))
            .session_provider(Arc::new(NullSession))
            .content_downloader(Arc::new(NullDownloader))
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_catalog_client() {
        let result = CoreConfig::builder()
            .database_path("/tmp/offline.db")
            .session_provider(Arc::new(NullSession))
            .content_downloader(Arc::new(NullDownloader))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "CatalogClient");
            }
            other => panic!("expected CapabilityMissing, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_missing_downloader() {
        let result = CoreConfig::builder()
            .database_path("/tmp/offline.db")
            .catalog_client(Arc::new(NullCatalog))
            .session_provider(Arc::new(NullSession))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "ContentDownloader");
            }
            other => panic!("expected CapabilityMissing, got {:?}", other.err()),
        }
    }
}
