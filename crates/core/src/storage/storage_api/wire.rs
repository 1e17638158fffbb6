//! JSON bodies exchanged with the Storage API.

use chrono::{DateTime, NaiveDateTime, Utc};
use depot_shared::{FileId, FileInfo};
use serde::{Deserialize, Serialize};

/// Status value of a successful response envelope.
pub const STATUS_OK: &str = "OK";

/// Upload request body.
#[derive(Debug, Serialize)]
pub struct UploadBody<'a> {
    pub file_name: &'a str,
    pub file_ext: &'a str,
    pub mime_type: &'a str,
    pub binary_data_b64: String,
}

/// Every Storage API response wraps its payload in a status envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Payload of upload and delete responses.
#[derive(Debug, Deserialize)]
pub struct FilePayload {
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub info: Option<ApiFileInfo>,
}

/// Payload of get responses.
#[derive(Debug, Deserialize)]
pub struct DataPayload {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub info: Option<ApiFileInfo>,
}

/// File metadata as the Storage API reports it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApiFileInfo {
    pub file_ext: String,
    pub file_id: String,
    pub file_mimetype: String,
    pub file_name: String,
    pub file_size: u64,
    pub public_link: String,
    pub tag: String,
    pub timestamp: String,
}

/// Parse the timestamp formats seen from the Storage API.
///
/// RFC 3339 first, then `YYYY-MM-DD HH:MM:SS` taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

impl ApiFileInfo {
    /// Normalize into a [`FileInfo`], filling gaps from `fallback_id`.
    pub fn into_file_info(self, fallback_id: &str) -> FileInfo {
        let file_id = if self.file_id.is_empty() {
            fallback_id.to_string()
        } else {
            self.file_id
        };

        FileInfo {
            file_id: FileId::new(file_id),
            file_ext: self.file_ext.trim_start_matches('.').to_string(),
            file_mimetype: self.file_mimetype,
            file_name: non_empty(self.file_name),
            file_size: self.file_size,
            etag: self.tag,
            public_link: non_empty(self.public_link),
            timestamp: parse_timestamp(&self.timestamp).unwrap_or_else(Utc::now),
        }
    }
}
