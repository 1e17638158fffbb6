//! OpenID Connect discovery and OAuth2 client-credentials tokens.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::storage::error::StorageError;

/// Tokens are refreshed this long before the server side expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    token_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Look up the token endpoint from `{provider_url}/.well-known/openid-configuration`.
///
/// # Errors
///
/// Any failure is a configuration error: the adapter cannot work without it.
pub async fn discover_token_endpoint(
    client: &Client,
    provider_url: &str,
) -> Result<String, StorageError> {
    let url = format!(
        "{}/.well-known/openid-configuration",
        provider_url.trim_end_matches('/')
    );

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| StorageError::configuration(format!("oidc discovery at {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(StorageError::configuration(format!(
            "oidc discovery at {url} returned {}",
            response.status()
        )));
    }

    let document: DiscoveryDocument = response
        .json()
        .await
        .map_err(|e| StorageError::configuration(format!("oidc discovery document: {e}")))?;

    document
        .token_endpoint
        .filter(|endpoint| !endpoint.is_empty())
        .ok_or_else(|| StorageError::configuration("oidc discovery document has no token_endpoint"))
}

/// When a token issued at `now` with `expires_in` seconds of validity should
/// be replaced. `None` when the deadline is not representable.
fn refresh_deadline(now: Instant, expires_in: u64) -> Option<Instant> {
    now.checked_add(Duration::from_secs(expires_in).saturating_sub(EXPIRY_MARGIN))
}

/// Client-credentials token source with an in-memory cache.
pub struct TokenSource {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(
        client: Client,
        token_url: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            client,
            token_url,
            client_id,
            client_secret,
            cached: Mutex::new(None),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Return a valid access token, fetching a new one when the cached token
    /// is missing or about to expire.
    ///
    /// A fetch is a single request; callers retry it as part of the request
    /// that needs the token.
    pub async fn token(&self) -> Result<String, StorageError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let response = self.fetch().await?;
        let value = response.access_token;

        *cached = response
            .expires_in
            .and_then(|secs| refresh_deadline(Instant::now(), secs))
            .map(|refresh_at| CachedToken {
                value: value.clone(),
                refresh_at,
            });

        debug!(expires_in = ?response.expires_in, "fetched access token");
        Ok(value)
    }

    async fn fetch(&self) -> Result<TokenResponse, StorageError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StorageError::request("token", &e))?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Http {
                operation: "token",
                status: status.as_u16(),
                body,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::unauthorized(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| StorageError::unauthorized(format!("token response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_deadline_keeps_margin() {
        let now = Instant::now();
        assert_eq!(
            refresh_deadline(now, 3600),
            Some(now + Duration::from_secs(3570))
        );
        assert_eq!(refresh_deadline(now, 10), Some(now));
    }

    #[test]
    fn test_refresh_deadline_overflow_is_not_cached() {
        assert_eq!(refresh_deadline(Instant::now(), u64::MAX), None);
    }
}
