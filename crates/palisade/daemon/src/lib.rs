//! Palisade daemon library
//!
//! This module provides the core components for the palisade daemon:
//! - REST API handlers for decision submission, rule reloads, and ledger audit
//! - Configuration loading with CLI/env overrides
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod server;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError, DaemonResult};
pub use server::Server;
