//! Object storage adapter using Apache OpenDAL.
//!
//! One adapter serves every object-store backend:
//! - S3-compatible: AWS S3, Cloudflare R2, MinIO
//! - Google Cloud Storage
//! - Local filesystem (development only)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Apache OpenDAL                              │
//! │                   (Unified Storage API)                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ op.write_with("id", data)  │ op.presign_read("id", duration)    │
//! │ op.read("id")              │ op.stat("id")                      │
//! │ op.delete("id")            │                                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Backends without user metadata (local fs) keep extension, name, content
//! type and etag in a JSON sidecar object under [`SIDECAR_DIR`].

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use depot_shared::{FileId, FileInfo, GetResponse, PublicLink, StorageConfig, StorageProvider};
use opendal::{Metadata, Operator, services};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tracing::{debug, instrument};

use super::error::StorageError;
use super::naming::{check_file_id, sanitize_file_name};
use super::retry::RetryPolicy;
use super::service::{Storage, UploadSource, prepare_upload, resolve_expiry, write_download};

/// Directory holding metadata sidecars on backends without user metadata.
pub const SIDECAR_DIR: &str = ".depot";

const META_EXT: &str = "ext";
const META_NAME: &str = "name";

/// Metadata stored next to the object when the backend cannot carry it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sidecar {
    ext: String,
    name: String,
    mimetype: String,
    etag: String,
}

/// Storage adapter over an OpenDAL operator.
pub struct ObjectStorage {
    operator: Operator,
    provider: &'static str,
    retry: RetryPolicy,
    default_link_expiry: Duration,
    native_metadata: bool,
}

impl ObjectStorage {
    /// Create the adapter from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is not an object store or OpenDAL
    /// rejects its parameters.
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let operator = Self::create_operator(&config.provider)?;
        Ok(Self::with_operator(
            operator,
            config.provider.name(),
            RetryPolicy::from(&config.retry),
            Duration::from_secs(config.default_link_expiry_secs),
        ))
    }

    /// Wrap an already built operator.
    #[must_use]
    pub fn with_operator(
        operator: Operator,
        provider: &'static str,
        retry: RetryPolicy,
        default_link_expiry: Duration,
    ) -> Self {
        let capability = operator.info().full_capability();
        let native_metadata =
            capability.write_with_user_metadata && capability.write_with_content_type;
        Self {
            operator,
            provider,
            retry,
            default_link_expiry,
            native_metadata,
        }
    }

    /// Create OpenDAL operator from provider config.
    fn create_operator(provider: &StorageProvider) -> Result<Operator, StorageError> {
        match provider {
            StorageProvider::S3 {
                endpoint,
                bucket,
                region,
                access_key_id,
                secret_access_key,
            } => {
                let mut builder = services::S3::default()
                    .bucket(bucket)
                    .region(region)
                    .access_key_id(access_key_id)
                    .secret_access_key(secret_access_key);
                if let Some(endpoint) = endpoint {
                    builder = builder.endpoint(endpoint);
                }

                Ok(Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish())
            }
            StorageProvider::Gcs {
                bucket,
                credential,
                credential_path,
                endpoint,
            } => {
                let mut builder = services::Gcs::default().bucket(bucket);
                if let Some(credential) = credential {
                    builder = builder.credential(credential);
                }
                if let Some(path) = credential_path {
                    builder = builder.credential_path(path);
                }
                if let Some(endpoint) = endpoint {
                    builder = builder.endpoint(endpoint);
                }

                Ok(Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish())
            }
            StorageProvider::LocalFs { root } => {
                let builder = services::Fs::default().root(
                    root.to_str()
                        .ok_or_else(|| StorageError::configuration("invalid path"))?,
                );

                Ok(Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish())
            }
            StorageProvider::StorageApi { .. } => Err(StorageError::configuration(
                "storage api provider is not an object store",
            )),
        }
    }

    fn sidecar_path(id: &FileId) -> String {
        format!("{SIDECAR_DIR}/{id}.json")
    }

    async fn read_object(&self, id: &FileId) -> Result<Vec<u8>, StorageError> {
        let operator = &self.operator;
        let key = check_file_id(id)?;
        let buffer = self
            .retry
            .run("read", || async move {
                operator
                    .read(key)
                    .await
                    .map_err(|e| StorageError::opendal("read", key, &e))
            })
            .await?;
        Ok(buffer.to_vec())
    }

    async fn write_sidecar(&self, id: &FileId, sidecar: &Sidecar) -> Result<(), StorageError> {
        let operator = &self.operator;
        let path = Self::sidecar_path(id);
        let path = path.as_str();
        let body = Bytes::from(
            serde_json::to_vec(sidecar).map_err(|e| StorageError::invalid_payload(e.to_string()))?,
        );
        self.retry
            .run("write metadata", || {
                let body = body.clone();
                async move {
                    operator
                        .write(path, body)
                        .await
                        .map(|_| ())
                        .map_err(|e| StorageError::opendal("write metadata", path, &e))
                }
            })
            .await
    }

    async fn read_sidecar(&self, id: &FileId) -> Result<Option<Sidecar>, StorageError> {
        let operator = &self.operator;
        let path = Self::sidecar_path(id);
        let path = path.as_str();
        let result = self
            .retry
            .run("read metadata", || async move {
                operator
                    .read(path)
                    .await
                    .map_err(|e| StorageError::opendal("read metadata", path, &e))
            })
            .await;

        match result {
            Ok(buffer) => serde_json::from_slice(&buffer.to_vec())
                .map(Some)
                .map_err(|e| StorageError::invalid_payload(format!("metadata of {id}: {e}"))),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn to_file_info(id: &FileId, meta: &Metadata, sidecar: Option<Sidecar>) -> FileInfo {
        let timestamp = meta
            .last_modified()
            .and_then(|t| t.to_string().parse::<DateTime<Utc>>().ok())
            .unwrap_or_else(Utc::now);

        if let Some(sidecar) = sidecar {
            return FileInfo {
                file_id: id.clone(),
                file_ext: sidecar.ext,
                file_mimetype: sidecar.mimetype,
                file_name: Some(sidecar.name),
                file_size: meta.content_length(),
                etag: sidecar.etag,
                public_link: None,
                timestamp,
            };
        }

        let user_metadata = meta.user_metadata();
        let lookup = |key: &str| user_metadata.and_then(|m| m.get(key)).cloned();

        FileInfo {
            file_id: id.clone(),
            file_ext: lookup(META_EXT).unwrap_or_default(),
            file_mimetype: meta.content_type().unwrap_or_default().to_string(),
            file_name: lookup(META_NAME),
            file_size: meta.content_length(),
            etag: meta.etag().unwrap_or_default().to_string(),
            public_link: None,
            timestamp,
        }
    }
}

/// User metadata written with the object on backends that support it.
fn user_metadata(ext: &str, name: &str) -> HashMap<String, String> {
    HashMap::from([
        (META_EXT.to_string(), ext.to_string()),
        (META_NAME.to_string(), name.to_string()),
    ])
}

/// Hex SHA-256 of `body`, used as etag when the backend reports none.
fn content_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

#[async_trait]
impl Storage for ObjectStorage {
    fn provider_name(&self) -> &'static str {
        self.provider
    }

    #[instrument(skip(self, file), fields(provider = self.provider))]
    async fn upload(
        &self,
        file: &mut dyn UploadSource,
        name: &str,
        ext: &str,
    ) -> Result<FileInfo, StorageError> {
        let prepared = prepare_upload(file).await?;
        let id = FileId::generate();
        let name = sanitize_file_name(name);
        let ext = ext.trim_start_matches('.').to_string();
        let size = prepared.body.len() as u64;
        let body = Bytes::from(prepared.body);

        let operator = &self.operator;
        let key = id.as_str();
        let written = self
            .retry
            .run("upload", || {
                let mut write = operator.write_with(key, body.clone());
                if self.native_metadata {
                    write = write
                        .content_type(prepared.mime)
                        .user_metadata(user_metadata(&ext, &name));
                }
                async move {
                    write
                        .await
                        .map_err(|e| StorageError::opendal("upload", key, &e))
                }
            })
            .await?;

        let etag = written
            .etag()
            .map_or_else(|| content_hash(&body), ToString::to_string);

        if !self.native_metadata {
            let sidecar = Sidecar {
                ext: ext.clone(),
                name: name.clone(),
                mimetype: prepared.mime.to_string(),
                etag: etag.clone(),
            };
            self.write_sidecar(&id, &sidecar).await?;
        }

        debug!(file_id = %id, size, mime = prepared.mime, "uploaded object");

        Ok(FileInfo {
            file_id: id,
            file_ext: ext,
            file_mimetype: prepared.mime.to_string(),
            file_name: Some(name),
            file_size: size,
            etag,
            public_link: None,
            timestamp: Utc::now(),
        })
    }

    #[instrument(skip(self), fields(provider = self.provider))]
    async fn file_info(&self, id: &FileId) -> Result<FileInfo, StorageError> {
        let operator = &self.operator;
        let key = check_file_id(id)?;
        let meta = self
            .retry
            .run("stat", || async move {
                operator
                    .stat(key)
                    .await
                    .map_err(|e| StorageError::opendal("stat", key, &e))
            })
            .await?;

        let sidecar = if self.native_metadata {
            None
        } else {
            self.read_sidecar(id).await?
        };

        Ok(Self::to_file_info(id, &meta, sidecar))
    }

    #[instrument(skip(self), fields(provider = self.provider))]
    async fn get(&self, id: &FileId) -> Result<GetResponse, StorageError> {
        let info = self.file_info(id).await?;
        let content = self.read_object(id).await?;
        Ok(GetResponse {
            data: STANDARD.encode(content),
            info,
        })
    }

    #[instrument(skip(self), fields(provider = self.provider))]
    async fn download(&self, id: &FileId, destination: &Path) -> Result<File, StorageError> {
        let content = self.read_object(id).await?;
        let file = write_download(destination, &content).await?;
        debug!(file_id = %id, bytes = content.len(), "downloaded object");
        Ok(file)
    }

    #[instrument(skip(self), fields(provider = self.provider))]
    async fn download_base64(&self, id: &FileId) -> Result<String, StorageError> {
        let content = self.read_object(id).await?;
        Ok(STANDARD.encode(content))
    }

    #[instrument(skip(self), fields(provider = self.provider))]
    async fn delete(&self, id: &FileId) -> Result<(), StorageError> {
        let operator = &self.operator;
        let key = check_file_id(id)?;
        self.retry
            .run("delete", || async move {
                operator
                    .delete(key)
                    .await
                    .map_err(|e| StorageError::opendal("delete", key, &e))
            })
            .await?;

        if !self.native_metadata {
            let path = Self::sidecar_path(id);
            let path = path.as_str();
            self.retry
                .run("delete metadata", || async move {
                    operator
                        .delete(path)
                        .await
                        .map_err(|e| StorageError::opendal("delete metadata", path, &e))
                })
                .await?;
        }

        debug!(file_id = %id, "deleted object");
        Ok(())
    }

    #[instrument(skip(self), fields(provider = self.provider))]
    async fn public_link(
        &self,
        id: &FileId,
        expiry: TimeDelta,
    ) -> Result<PublicLink, StorageError> {
        let key = check_file_id(id)?;
        let now = Utc::now();
        let ttl = resolve_expiry(expiry, self.default_link_expiry);
        let expired_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| StorageError::configuration(format!("link expiry {ttl:?} out of range")))?;

        let operator = &self.operator;
        let presigned = self
            .retry
            .run("presign", || async move {
                operator
                    .presign_read(key, ttl)
                    .await
                    .map_err(|e| StorageError::opendal("presign", key, &e))
            })
            .await?;

        Ok(PublicLink {
            url: presigned.uri().to_string(),
            expired_at,
        })
    }
}
