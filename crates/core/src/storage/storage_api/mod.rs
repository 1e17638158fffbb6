//! Adapter for the remote Storage API.
//!
//! The API takes JSON with base64 content and authenticates each request with
//! an OAuth2 client-credentials token carried in two custom headers,
//! `x-client-id` and `x-code`, instead of a bearer token.

mod oidc;
mod wire;

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::TimeDelta;
use depot_shared::{FileId, FileInfo, GetResponse, PublicLink, StorageConfig, StorageProvider};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use self::oidc::{TokenSource, discover_token_endpoint};
use self::wire::{DataPayload, Envelope, FilePayload, UploadBody};
use super::error::StorageError;
use super::naming::{check_file_id, sanitize_file_name};
use super::retry::RetryPolicy;
use super::service::{Storage, UploadSource, prepare_upload};

/// Header carrying the OAuth2 client ID.
pub const CLIENT_ID_HEADER: &str = "x-client-id";
/// Header carrying the access token.
pub const ACCESS_TOKEN_HEADER: &str = "x-code";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Storage API adapter.
pub struct StorageApi {
    client: Client,
    base_url: Url,
    tokens: TokenSource,
    retry: RetryPolicy,
}

impl StorageApi {
    /// Create the adapter from configuration.
    ///
    /// Resolves the token endpoint through OIDC discovery once, up front.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the provider is not the Storage API or
    /// discovery fails. Discovery is not retried.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let StorageProvider::StorageApi {
            client_id,
            client_secret,
            oidc_provider_url,
            storage_api_url,
        } = &config.provider
        else {
            return Err(StorageError::configuration(format!(
                "{} provider is not the storage api",
                config.provider.name()
            )));
        };

        let base_url = Url::parse(storage_api_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                StorageError::configuration(format!("invalid storage api url {storage_api_url:?}"))
            })?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::configuration(e.to_string()))?;

        let token_url = discover_token_endpoint(&client, oidc_provider_url).await?;
        debug!(%token_url, "resolved oidc token endpoint");

        Ok(Self {
            tokens: TokenSource::new(
                client.clone(),
                token_url,
                client_id.clone(),
                client_secret.clone(),
            ),
            client,
            base_url,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    /// `{base}/d/files`, followed by the percent-encoded `id` when given.
    fn files_url(&self, id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        // Bases that cannot carry a path are refused in `from_config`.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["d", "files"]);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url
    }

    /// Send one authenticated request per attempt and decode the envelope.
    ///
    /// Token fetch, transport errors and non-2xx statuses share one retry
    /// budget. A non-OK envelope is a logical failure and is returned without
    /// retrying.
    async fn call<T, F>(&self, operation: &'static str, build: F) -> Result<T, StorageError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let build = &build;
        let envelope: Envelope<T> = self
            .retry
            .run(operation, || async move {
                let token = self.tokens.token().await?;
                let response = build(&self.client)
                    .header(CLIENT_ID_HEADER, self.tokens.client_id())
                    .header(ACCESS_TOKEN_HEADER, token)
                    .send()
                    .await
                    .map_err(|e| StorageError::request(operation, &e))?;

                let status = response.status();
                if !status.is_success() {
                    let body = response
                        .text()
                        .await
                        .map_err(|e| StorageError::request(operation, &e))?;
                    return Err(StorageError::Http {
                        operation,
                        status: status.as_u16(),
                        body,
                    });
                }

                response
                    .json::<Envelope<T>>()
                    .await
                    .map_err(|e| StorageError::invalid_payload(format!("{operation} response: {e}")))
            })
            .await?;

        if !envelope.is_ok() {
            return Err(StorageError::Rejected {
                operation,
                message: envelope.message,
            });
        }
        Ok(envelope.payload)
    }
}

#[async_trait]
impl Storage for StorageApi {
    fn provider_name(&self) -> &'static str {
        "storage_api"
    }

    #[instrument(skip(self, file))]
    async fn upload(
        &self,
        file: &mut dyn UploadSource,
        name: &str,
        ext: &str,
    ) -> Result<FileInfo, StorageError> {
        let prepared = prepare_upload(file).await?;
        let name = sanitize_file_name(name);
        let ext = ext.trim_start_matches('.');
        let size = prepared.body.len() as u64;

        let body = serde_json::to_vec(&UploadBody {
            file_name: &name,
            file_ext: ext,
            mime_type: prepared.mime,
            binary_data_b64: STANDARD.encode(&prepared.body),
        })
        .map_err(|e| StorageError::invalid_payload(e.to_string()))?;

        let url = self.files_url(None);
        let payload: FilePayload = self
            .call("upload", |client| {
                client
                    .request(Method::POST, url.clone())
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body.clone())
            })
            .await?;

        let mut info = payload
            .info
            .unwrap_or_default()
            .into_file_info(&payload.file_id);
        if info.file_ext.is_empty() {
            info.file_ext = ext.to_string();
        }
        if info.file_mimetype.is_empty() {
            info.file_mimetype = prepared.mime.to_string();
        }
        if info.file_size == 0 {
            info.file_size = size;
        }
        if info.file_name.is_none() {
            info.file_name = Some(name);
        }

        debug!(file_id = %info.file_id, size, "uploaded file to storage api");
        Ok(info)
    }

    #[instrument(skip(self))]
    async fn file_info(&self, id: &FileId) -> Result<FileInfo, StorageError> {
        Ok(self.get(id).await?.info)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &FileId) -> Result<GetResponse, StorageError> {
        let url = self.files_url(Some(check_file_id(id)?));
        let payload: DataPayload = self
            .call("get", |client| client.request(Method::GET, url.clone()))
            .await?;

        Ok(GetResponse {
            info: payload.info.unwrap_or_default().into_file_info(id.as_str()),
            data: payload.data,
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &FileId) -> Result<(), StorageError> {
        let url = self.files_url(Some(check_file_id(id)?));
        let _: FilePayload = self
            .call("delete", |client| client.request(Method::DELETE, url.clone()))
            .await?;

        debug!(file_id = %id, "deleted file from storage api");
        Ok(())
    }

    async fn public_link(
        &self,
        _id: &FileId,
        _expiry: TimeDelta,
    ) -> Result<PublicLink, StorageError> {
        Err(StorageError::PresignNotSupported)
    }
}

impl std::fmt::Debug for StorageApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageApi")
            .field("base_url", &self.base_url.as_str())
            .field("client_id", &self.tokens.client_id())
            .finish_non_exhaustive()
    }
}
