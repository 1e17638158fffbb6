//! Core storage logic for Depot.
//!
//! One capability, several backends: S3, Google Cloud Storage and the local
//! filesystem through OpenDAL, plus the OAuth2 protected Storage API over
//! HTTP.
//!
//! # Modules
//!
//! - `storage` - The `Storage` trait, its adapters and the backend factory
//! - `storage::mime` - Content type sniffing from leading bytes
//! - `storage::naming` - File name sanitization

pub mod storage;

pub use storage::{Storage, StorageError, connect};
