//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the offline sync core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the scheduler crates depend
//! on. It establishes the logging conventions, the broadcast event bus used
//! for cross-component signaling (item removals, reachability transitions,
//! job lifecycle), and the fail-fast configuration builder through which host
//! applications inject their bridge implementations.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
