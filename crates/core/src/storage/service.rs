//! The storage capability shared by every backend adapter.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::TimeDelta;
use depot_shared::{FileId, FileInfo, GetResponse, PublicLink, StorageConfig, StorageProvider};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWriteExt};
use tracing::info;

use super::error::StorageError;
use super::mime;
use super::object_store::ObjectStorage;
use super::storage_api::StorageApi;

/// Seekable upload source.
///
/// Sniffing consumes the head of the stream before the body is sent, so the
/// source has to support rewinding. Unseekable input must be buffered first,
/// for example into a `std::io::Cursor`.
pub trait UploadSource: AsyncRead + AsyncSeek + Unpin + Send {}

impl<T: AsyncRead + AsyncSeek + Unpin + Send> UploadSource for T {}

/// Operations every storage backend supports.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Short backend name, e.g. `s3`.
    fn provider_name(&self) -> &'static str;

    /// Upload the full content of `file` under a new identifier.
    ///
    /// `name` is sanitized before it is stored; `ext` is stored without a
    /// leading dot.
    async fn upload(
        &self,
        file: &mut dyn UploadSource,
        name: &str,
        ext: &str,
    ) -> Result<FileInfo, StorageError>;

    /// Upload standard base64 encoded content.
    async fn upload_base64(
        &self,
        data: &str,
        name: &str,
        ext: &str,
    ) -> Result<FileInfo, StorageError> {
        let bytes = STANDARD
            .decode(data)
            .map_err(|e| StorageError::invalid_payload(format!("base64 upload body: {e}")))?;
        let mut cursor = std::io::Cursor::new(bytes);
        self.upload(&mut cursor, name, ext).await
    }

    /// Fetch metadata without transferring content where the backend allows.
    async fn file_info(&self, id: &FileId) -> Result<FileInfo, StorageError>;

    /// Fetch metadata and base64 encoded content.
    async fn get(&self, id: &FileId) -> Result<GetResponse, StorageError>;

    /// Write the content to `destination`, returning the file rewound to the
    /// start.
    async fn download(&self, id: &FileId, destination: &Path) -> Result<File, StorageError> {
        let response = self.get(id).await?;
        let bytes = STANDARD
            .decode(response.data)
            .map_err(|e| StorageError::invalid_payload(format!("base64 file content: {e}")))?;
        write_download(destination, &bytes).await
    }

    /// Fetch the content as standard base64.
    async fn download_base64(&self, id: &FileId) -> Result<String, StorageError> {
        Ok(self.get(id).await?.data)
    }

    /// Remove the file. Backend errors are returned unchanged.
    async fn delete(&self, id: &FileId) -> Result<(), StorageError>;

    /// Generate a signed, time bounded read URL.
    ///
    /// A non-positive `expiry` falls back to the configured default.
    async fn public_link(
        &self,
        id: &FileId,
        expiry: TimeDelta,
    ) -> Result<PublicLink, StorageError>;
}

/// Build the adapter selected by `config`.
///
/// # Errors
///
/// Returns a configuration error if the backend cannot be initialized. For the
/// Storage API this includes an unreachable OIDC discovery endpoint.
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn Storage>, StorageError> {
    let storage: Arc<dyn Storage> = match &config.provider {
        StorageProvider::StorageApi { .. } => Arc::new(StorageApi::from_config(config).await?),
        StorageProvider::S3 { .. } | StorageProvider::Gcs { .. } | StorageProvider::LocalFs { .. } => {
            Arc::new(ObjectStorage::from_config(config)?)
        }
    };
    info!(provider = storage.provider_name(), "storage backend ready");
    Ok(storage)
}

/// Body and sniffed content type of an upload source.
pub(crate) struct PreparedUpload {
    pub mime: &'static str,
    pub body: Vec<u8>,
}

/// Sniff the content type, then read the whole source from offset zero.
///
/// The source is left rewound so callers can reuse it.
pub(crate) async fn prepare_upload(
    file: &mut dyn UploadSource,
) -> Result<PreparedUpload, StorageError> {
    let mime = mime::detect(&mut *file).await?;

    let mut body = Vec::new();
    file.read_to_end(&mut body).await?;
    file.seek(SeekFrom::Start(0)).await?;

    Ok(PreparedUpload { mime, body })
}

/// Resolve the caller supplied link expiry against the default.
pub(crate) fn resolve_expiry(expiry: TimeDelta, default: Duration) -> Duration {
    if expiry <= TimeDelta::zero() {
        return default;
    }
    expiry.to_std().unwrap_or(default)
}

/// Write `bytes` to `destination` and rewind the handle.
pub(crate) async fn write_download(destination: &Path, bytes: &[u8]) -> Result<File, StorageError> {
    let mut file = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(destination)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.seek(SeekFrom::Start(0)).await?;
    Ok(file)
}
