//! File storage behind a single capability.
//!
//! Callers hold an `Arc<dyn Storage>` built by [`connect`] and never see which
//! backend serves it.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        dyn Storage                            │
//! ├───────────────────────────────┬──────────────────────────────┤
//! │ ObjectStorage (OpenDAL)       │ StorageApi (HTTP + OIDC)     │
//! │ s3 / gcs / local fs           │ POST/GET/DELETE /d/files     │
//! └───────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Every remote call goes through [`RetryPolicy`]. Content types are sniffed
//! from the first 512 bytes of the upload, never taken from the caller.

mod error;
pub mod mime;
pub mod naming;
mod object_store;
mod retry;
mod service;
mod storage_api;

pub use error::StorageError;
pub use object_store::{ObjectStorage, SIDECAR_DIR};
pub use retry::RetryPolicy;
pub use service::{Storage, UploadSource, connect};
pub use storage_api::{ACCESS_TOKEN_HEADER, CLIENT_ID_HEADER, StorageApi};
