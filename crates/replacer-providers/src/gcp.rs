//! Google Cloud Secret Manager REST client.
//!
//! Talks to the Secret Manager v1 API with a bearer token taken either from
//! `GOOGLE_OAUTH_ACCESS_TOKEN` or from the GCE/GKE metadata server.

use crate::secret_manager::SecretClient;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use replacer_core::{CacheValue, LruCache, ReplacerError, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::env;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

const DEFAULT_API_URL: &str = "https://secretmanager.googleapis.com";
const DEFAULT_METADATA_URL: &str = "http://metadata.google.internal";
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const PROJECT_ID_PATH: &str = "/computeMetadata/v1/project/project-id";
const TOKEN_CACHE_KEY: &str = "default";

/// Upper bound on how long a metadata token is reused.
const TOKEN_CACHE_TTL: Duration = Duration::from_secs(240);

/// Tokens are refreshed this long before the server says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Connection settings for Secret Manager.
#[derive(Debug, Clone)]
pub struct GcpSettings {
    /// Secret Manager API root.
    /// Default: https://secretmanager.googleapis.com, Env: GCP_SECRET_MANAGER_URL
    pub api_base_url: String,

    /// Metadata server root.
    /// Default: http://metadata.google.internal, Env: GCE_METADATA_HOST (host only)
    pub metadata_base_url: String,

    /// Static access token; skips the metadata server when set.
    /// Env: GOOGLE_OAUTH_ACCESS_TOKEN
    pub access_token: Option<String>,

    /// Per-request timeout.
    /// Default: 30s, Env: REPLACER_GCP_TIMEOUT_SECS
    pub request_timeout: Duration,

    /// Secret value cache capacity per provider instance.
    /// Default: 1024, Env: REPLACER_GCP_CACHE_SIZE
    pub cache_size: usize,

    /// Secret value cache TTL.
    /// Default: 60s, Env: REPLACER_GCP_CACHE_TTL_SECS
    pub cache_ttl: Duration,
}

impl Default for GcpSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            metadata_base_url: DEFAULT_METADATA_URL.to_string(),
            access_token: None,
            request_timeout: Duration::from_secs(30),
            cache_size: replacer_core::cache::DEFAULT_CACHE_SIZE,
            cache_ttl: replacer_core::cache::DEFAULT_CACHE_TTL,
        }
    }
}

impl GcpSettings {
    /// Load settings from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(v) = env::var("GCP_SECRET_MANAGER_URL") {
            settings.api_base_url = v;
        }
        if let Ok(v) = env::var("GCE_METADATA_HOST") {
            settings.metadata_base_url = format!("http://{}", v);
        }
        if let Ok(v) = env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
            if !v.trim().is_empty() {
                settings.access_token = Some(v.trim().to_string());
            }
        }
        if let Ok(v) = env::var("REPLACER_GCP_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                settings.request_timeout = Duration::from_secs(n);
            }
        }
        if let Ok(v) = env::var("REPLACER_GCP_CACHE_SIZE") {
            if let Ok(n) = v.parse() {
                settings.cache_size = n;
            }
        }
        if let Ok(v) = env::var("REPLACER_GCP_CACHE_TTL_SECS") {
            if let Ok(n) = v.parse() {
                settings.cache_ttl = Duration::from_secs(n);
            }
        }

        settings
    }

    /// Builder: Set the Secret Manager API root.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Builder: Set the metadata server root.
    pub fn with_metadata_base_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_base_url = url.into();
        self
    }

    /// Builder: Use a fixed access token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn http_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| {
                ReplacerError::BackendError(format!("Failed to create HTTP client: {}", e))
            })
    }
}

/// Metadata server token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl TokenResponse {
    /// How long the token may be reused, capped at [`TOKEN_CACHE_TTL`].
    fn reuse_for(&self) -> Duration {
        self.expires_in
            .map(|secs| Duration::from_secs(secs).saturating_sub(TOKEN_EXPIRY_MARGIN))
            .map_or(TOKEN_CACHE_TTL, |d| d.min(TOKEN_CACHE_TTL))
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CacheValue for CachedToken {
    fn is_empty_value(&self) -> bool {
        self.token.is_empty()
    }
}

/// Secret Manager `:access` response.
#[derive(Debug, Deserialize)]
struct AccessResponse {
    payload: Payload,
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    data: String,
}

fn backend_error(e: reqwest::Error) -> ReplacerError {
    ReplacerError::BackendError(e.to_string())
}

/// Client for the GCE/GKE metadata server.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: Client,
    base_url: String,
}

impl MetadataClient {
    /// Create a client for the configured metadata server.
    pub fn new(settings: &GcpSettings) -> Result<Self> {
        Ok(Self {
            http: settings.http_client()?,
            base_url: settings.metadata_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(backend_error)?;

        if !resp.status().is_success() {
            return Err(ReplacerError::BackendError(format!(
                "metadata server returned {} for {}",
                resp.status(),
                path
            )));
        }
        Ok(resp)
    }

    /// Project id of the workload's project.
    pub async fn project_id(&self) -> Result<String> {
        let body = self.get(PROJECT_ID_PATH).await?.text().await.map_err(backend_error)?;
        Ok(body.trim().to_string())
    }

    /// Fetch an access token for the default service account.
    pub async fn access_token(&self) -> Result<String> {
        Ok(self.token_response().await?.access_token)
    }

    async fn token_response(&self) -> Result<TokenResponse> {
        self.get(TOKEN_PATH).await?.json().await.map_err(backend_error)
    }

    /// Poll the token endpoint once per second until it answers.
    ///
    /// Workload identity can take a few seconds to become available after a
    /// pod starts.
    pub async fn wait_until_ready(&self, max_wait: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            match self.access_token().await {
                Ok(_) => {
                    info!("Metadata server ready after {:?}", start.elapsed());
                    return Ok(());
                }
                Err(e) => debug!("Metadata server not ready: {}", e),
            }

            if start.elapsed() > max_wait {
                return Err(ReplacerError::Timeout(max_wait));
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

/// Secret Manager client over the v1 REST API.
pub struct GcpSecretClient {
    http: Client,
    api_base_url: String,
    static_token: Option<String>,
    metadata: MetadataClient,
    token_cache: LruCache<CachedToken>,
}

impl GcpSecretClient {
    /// Create a client from explicit settings.
    pub fn new(settings: &GcpSettings) -> Result<Self> {
        Ok(Self {
            http: settings.http_client()?,
            api_base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            static_token: settings.access_token.clone(),
            metadata: MetadataClient::new(settings)?,
            token_cache: LruCache::new(1, TOKEN_CACHE_TTL),
        })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(&GcpSettings::from_env())
    }

    async fn token(&self) -> Result<String> {
        if let Some(ref token) = self.static_token {
            return Ok(token.clone());
        }
        if let Some(cached) = self.token_cache.get(TOKEN_CACHE_KEY) {
            if cached.expires_at > Instant::now() {
                return Ok(cached.token);
            }
        }

        let response = self.metadata.token_response().await?;
        let reuse_for = response.reuse_for();
        debug!("Fetched metadata token, reusing for {:?}", reuse_for);
        if !reuse_for.is_zero() {
            self.token_cache.set(
                TOKEN_CACHE_KEY,
                CachedToken {
                    token: response.access_token.clone(),
                    expires_at: Instant::now() + reuse_for,
                },
            );
        }
        Ok(response.access_token)
    }
}

#[async_trait]
impl SecretClient for GcpSecretClient {
    #[instrument(skip(self))]
    async fn access_secret(&self, name: &str) -> Result<String> {
        let token = self.token().await?;
        let url = format!("{}/v1/{}:access", self.api_base_url, name);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(backend_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::NOT_FOUND => ReplacerError::KeyNotFound(name.to_string()),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    self.token_cache.clear();
                    ReplacerError::PermissionDenied(name.to_string())
                }
                _ => {
                    warn!("Secret Manager returned {} for {}", status, name);
                    ReplacerError::BackendError(format!("{}: {}", status, body.trim()))
                }
            });
        }

        let access: AccessResponse = resp.json().await.map_err(backend_error)?;
        let bytes = general_purpose::STANDARD
            .decode(access.payload.data.as_bytes())
            .map_err(|e| {
                ReplacerError::ProviderError(format!("invalid payload for {}: {}", name, e))
            })?;

        String::from_utf8(bytes)
            .map_err(|_| {
                ReplacerError::ProviderError(format!("payload of {} is not valid UTF-8", name))
            })
    }

    fn close(&self) {
        self.token_cache.clear();
    }
}
