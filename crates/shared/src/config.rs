//! Application configuration management.

use std::path::PathBuf;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Storage backend configuration.
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,
}

/// Storage backend selection and its connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageProvider {
    /// S3-compatible storage: AWS S3, Cloudflare R2, MinIO.
    S3 {
        /// Custom endpoint URL. Empty for AWS.
        #[serde(default)]
        endpoint: Option<String>,
        /// Bucket name.
        bucket: String,
        /// Region.
        region: String,
        /// Access key ID.
        access_key_id: String,
        /// Secret access key.
        secret_access_key: String,
    },
    /// Google Cloud Storage.
    Gcs {
        /// Bucket name.
        bucket: String,
        /// Base64 encoded service account JSON.
        #[serde(default)]
        credential: Option<String>,
        /// Path to a service account JSON file.
        #[serde(default)]
        credential_path: Option<String>,
        /// Custom endpoint URL.
        #[serde(default)]
        endpoint: Option<String>,
    },
    /// Remote Storage API secured by OAuth2 client credentials.
    StorageApi {
        /// OAuth2 client ID.
        client_id: String,
        /// OAuth2 client secret.
        client_secret: String,
        /// OpenID Connect provider URL (discovery document parent).
        oidc_provider_url: String,
        /// Storage API base URL.
        storage_api_url: String,
    },
    /// Local filesystem (development only).
    LocalFs {
        /// Root directory path.
        root: PathBuf,
    },
}

impl StorageProvider {
    /// Create S3-compatible provider.
    #[must_use]
    pub fn s3(
        bucket: impl Into<String>,
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self::S3 {
            endpoint: None,
            bucket: bucket.into(),
            region: region.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    /// Create Google Cloud Storage provider using ambient credentials.
    #[must_use]
    pub fn gcs(bucket: impl Into<String>) -> Self {
        Self::Gcs {
            bucket: bucket.into(),
            credential: None,
            credential_path: None,
            endpoint: None,
        }
    }

    /// Create Storage API provider.
    #[must_use]
    pub fn storage_api(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        oidc_provider_url: impl Into<String>,
        storage_api_url: impl Into<String>,
    ) -> Self {
        Self::StorageApi {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            oidc_provider_url: oidc_provider_url.into(),
            storage_api_url: storage_api_url.into(),
        }
    }

    /// Create local filesystem provider (development only).
    #[must_use]
    pub fn local_fs(root: impl Into<PathBuf>) -> Self {
        Self::LocalFs { root: root.into() }
    }

    /// Get the provider name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::S3 { .. } => "s3",
            Self::Gcs { .. } => "gcs",
            Self::StorageApi { .. } => "storage_api",
            Self::LocalFs { .. } => "local",
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend to talk to.
    pub provider: StorageProvider,
    /// Retry policy for outbound calls.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Public link expiry used when the caller passes a non-positive duration.
    #[serde(default = "default_link_expiry")]
    pub default_link_expiry_secs: u64,
}

fn default_link_expiry() -> u64 {
    1800 // 30 minutes
}

impl StorageConfig {
    /// Create a storage config with default retry and link settings.
    #[must_use]
    pub fn new(provider: StorageProvider) -> Self {
        Self {
            provider,
            retry: RetryConfig::default(),
            default_link_expiry_secs: default_link_expiry(),
        }
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds.
    pub initial_interval_ms: u64,
    /// Growth factor applied to the delay after each retry.
    pub multiplier: f64,
    /// Upper bound for a single delay in milliseconds.
    pub max_interval_ms: u64,
    /// Retry client errors (4xx, bad payloads) too.
    pub retry_permanent_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval_ms: 500,
            multiplier: 2.0,
            max_interval_ms: 10_000,
            retry_permanent_errors: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "depot=info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration, layering an explicit file over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load_from(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false));

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("DEPOT").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_provider_names() {
        assert_eq!(StorageProvider::s3("b", "us-east-1", "k", "s").name(), "s3");
        assert_eq!(StorageProvider::gcs("b").name(), "gcs");
        assert_eq!(
            StorageProvider::storage_api("id", "secret", "http://oidc", "http://api").name(),
            "storage_api"
        );
        assert_eq!(StorageProvider::local_fs("./storage").name(), "local");
    }

    #[test]
    fn test_storage_config_defaults() {
        let config = StorageConfig::new(StorageProvider::local_fs("./storage"));
        assert_eq!(config.default_link_expiry_secs, 1800);
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.retry.max_retries, 3);
        assert!(!config.retry.retry_permanent_errors);
    }

    #[test]
    fn test_load_from_environment() {
        temp_env::with_vars(
            [
                ("DEPOT__STORAGE__PROVIDER__TYPE", Some("local_fs")),
                ("DEPOT__STORAGE__PROVIDER__ROOT", Some("/tmp/depot")),
                ("DEPOT__STORAGE__DEFAULT_LINK_EXPIRY_SECS", Some("60")),
            ],
            || {
                let config = AppConfig::load().expect("config should load");
                assert_eq!(
                    config.storage.provider,
                    StorageProvider::local_fs("/tmp/depot")
                );
                assert_eq!(config.storage.default_link_expiry_secs, 60);
                assert_eq!(config.log.filter, "depot=info");
            },
        );
    }

    #[test]
    fn test_deserialize_storage_api_provider() {
        let json = serde_json::json!({
            "provider": {
                "type": "storage_api",
                "client_id": "depot",
                "client_secret": "secret",
                "oidc_provider_url": "https://sso.example.com",
                "storage_api_url": "https://storage.example.com"
            },
            "retry": { "max_retries": 5 }
        });

        let config: StorageConfig = serde_json::from_value(json).expect("valid config");
        assert_eq!(config.provider.name(), "storage_api");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_interval_ms, 500);
        assert_eq!(config.default_link_expiry_secs, 1800);
    }
}
