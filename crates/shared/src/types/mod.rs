//! Common types used across the application.

pub mod file;
pub mod id;

pub use file::{FileInfo, GetResponse, PublicLink};
pub use id::FileId;
