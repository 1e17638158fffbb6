//! Normalized values returned by every storage backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::FileId;

/// Metadata of a stored file.
///
/// A fresh value is produced by every call; nothing keeps it in sync with the
/// backend afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Identifier to pass back for later operations.
    pub file_id: FileId,
    /// Extension without the leading dot, empty if unknown.
    pub file_ext: String,
    /// Content type detected at upload.
    pub file_mimetype: String,
    /// Sanitized file name stored alongside the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Size in bytes.
    pub file_size: u64,
    /// Backend reported content hash or version token.
    pub etag: String,
    /// Permanent link, when the backend hands one out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_link: Option<String>,
    /// Creation or last modification instant.
    pub timestamp: DateTime<Utc>,
}

/// Metadata plus the base64 encoded content of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    /// Standard base64 encoding of the content.
    pub data: String,
    /// File metadata.
    pub info: FileInfo,
}

/// Time bounded URL granting read access to a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicLink {
    /// Absolute signed URL.
    pub url: String,
    /// When the URL stops working.
    pub expired_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_info() -> FileInfo {
        FileInfo {
            file_id: FileId::new("13c91aa0-94f2-4e37-8167-5d6297a99646"),
            file_ext: "jpg".to_string(),
            file_mimetype: "image/jpeg".to_string(),
            file_name: None,
            file_size: 750,
            etag: "\"cf4cb127768fbc6ba1484fa6270d5c54\"".to_string(),
            public_link: None,
            timestamp: Utc.with_ymd_and_hms(2023, 12, 19, 3, 23, 15).unwrap(),
        }
    }

    #[test]
    fn test_file_info_wire_format() {
        let json = serde_json::to_value(sample_info()).expect("serialize");
        assert_eq!(json["file_id"], "13c91aa0-94f2-4e37-8167-5d6297a99646");
        assert_eq!(json["file_mimetype"], "image/jpeg");
        assert_eq!(json["file_size"], 750);
        assert_eq!(json["timestamp"], "2023-12-19T03:23:15Z");
        assert!(json.get("file_name").is_none());
        assert!(json.get("public_link").is_none());
    }

    #[test]
    fn test_public_link_serializes_rfc3339() {
        let link = PublicLink {
            url: "https://bucket.s3.amazonaws.com/key?X-Amz-Signature=abc".to_string(),
            expired_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap(),
        };
        let json = serde_json::to_value(&link).expect("serialize");
        assert_eq!(json["expired_at"], "2024-01-01T00:30:00Z");
    }
}
