//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the offline sync core and
//! platform-specific or backend-specific implementations. Each trait
//! represents a capability the scheduler requires but that lives outside the
//! core: fetching authoritative catalog metadata, resolving the signed-in
//! user, performing the actual byte-level downloads, and observing network
//! connectivity.
//!
//! ## Traits
//!
//! - [`CatalogClient`](catalog::CatalogClient) - Authoritative remote metadata lookups
//! - [`SessionProvider`](session::SessionProvider) - Current authenticated user
//! - [`ContentDownloader`](downloader::ContentDownloader) - Byte-level track/collection downloads
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity and metered network detection
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Implementations should convert platform-specific errors to `BridgeError`
//! and provide actionable messages. A "not found" catalog lookup is *not* an
//! error: it is surfaced as `Ok(None)` so the core can handle missing
//! entities uniformly.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent
//! usage across async tasks.

pub mod catalog;
pub mod downloader;
pub mod error;
pub mod network;
pub mod session;

pub use error::BridgeError;

// Re-export commonly used types
pub use catalog::{CatalogClient, RemoteMetadata};
pub use downloader::{ContentDownloader, DownloadedItem};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use session::SessionProvider;
