//! File name sanitization and object key checks.

use chrono::Utc;
use depot_shared::FileId;

use super::error::StorageError;

/// Prefix of the placeholder used when nothing of a name survives.
pub const PLACEHOLDER_PREFIX: &str = "undefined_";

/// Sanitize a file name (without extension) for storage metadata.
///
/// Every run of characters outside `[A-Za-z0-9]` collapses to a single `_`,
/// and underscores at either end are dropped. An empty result is replaced by
/// `undefined_{unix_seconds}`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            sanitized.push(c);
        } else if !sanitized.ends_with('_') {
            sanitized.push('_');
        }
    }

    let trimmed = sanitized.trim_matches('_');
    if trimmed.is_empty() {
        return format!("{PLACEHOLDER_PREFIX}{}", Utc::now().timestamp());
    }
    trimmed.to_string()
}

/// Split `name` into stem and extension (without the dot).
///
/// Only the last dot counts, and a leading dot (hidden files) is part of the
/// stem.
#[must_use]
pub fn split_file_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => (&name[..idx], &name[idx + 1..]),
    }
}

/// Check that `id` names a single object, not a path.
///
/// Identifiers are used verbatim as object keys and URL segments, so path
/// separators, `..`, a leading dot (reserved for metadata sidecars) and
/// control characters are refused before any backend call.
///
/// # Errors
///
/// Returns an invalid payload error for identifiers that fail the check.
pub fn check_file_id(id: &FileId) -> Result<&str, StorageError> {
    let key = id.as_str();
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && !key.contains("..")
        && !key.chars().any(|c| c == '/' || c == '\\' || c.is_control());
    if valid {
        Ok(key)
    } else {
        Err(StorageError::invalid_payload(format!(
            "file id {key:?} is not a valid object key"
        )))
    }
}
