//! Shared types and configuration for Depot.
//!
//! This crate provides common types used across all other crates:
//! - Typed file identifiers
//! - Normalized file metadata and link types
//! - Configuration management

pub mod config;
pub mod types;

pub use config::{AppConfig, LogConfig, RetryConfig, StorageConfig, StorageProvider};
pub use types::{FileId, FileInfo, GetResponse, PublicLink};
