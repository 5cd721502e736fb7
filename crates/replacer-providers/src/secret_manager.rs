//! Secret Manager provider.
//!
//! Resolves secret paths in short (`secret`, `project/secret`) or fully
//! qualified (`projects/p/secrets/s[/versions/v]`) form. Values are cached
//! per provider instance, keyed by the normalized path.

use async_trait::async_trait;
use regex::Regex;
use replacer_core::{Closer, ConfigOption, LruCache, Provider, ReplacerError, Result};
use std::sync::{Arc, OnceLock};
use tracing::{debug, instrument};

/// Provider name under which the Secret Manager provider is registered.
pub const NAME: &str = "gcp";

const FULL_PATH_PATTERN: &str =
    r"^projects/([A-Za-z0-9_-]+)/secrets/([A-Za-z0-9_-]+)(?:/versions/([0-9]+|latest))?$";
const SHORT_PATH_PATTERN: &str = r"^(?:([A-Za-z0-9_-]+)/)?([A-Za-z0-9_-]+)$";

static FULL_PATH_REGEX: OnceLock<Regex> = OnceLock::new();
static SHORT_PATH_REGEX: OnceLock<Regex> = OnceLock::new();

fn full_path_regex() -> &'static Regex {
    FULL_PATH_REGEX.get_or_init(|| Regex::new(FULL_PATH_PATTERN).expect("Invalid full path regex"))
}

fn short_path_regex() -> &'static Regex {
    SHORT_PATH_REGEX
        .get_or_init(|| Regex::new(SHORT_PATH_PATTERN).expect("Invalid short path regex"))
}

/// Backend access to secret payloads.
#[async_trait]
pub trait SecretClient: Send + Sync {
    /// Fetch the payload of a fully qualified secret version.
    async fn access_secret(&self, name: &str) -> Result<String>;

    /// Release the connection to the backend.
    fn close(&self) {}
}

/// Normalize a secret reference to `projects/P/secrets/S/versions/V`.
///
/// Missing versions default to `latest`; a bare secret name needs
/// `default_project`.
///
/// # Example
///
/// ```
/// use replacer_providers::secret_manager::normalize_secret_path;
///
/// assert_eq!(
///     normalize_secret_path("acme/db-password", "").unwrap(),
///     "projects/acme/secrets/db-password/versions/latest"
/// );
/// ```
pub fn normalize_secret_path(key: &str, default_project: &str) -> Result<String> {
    let key = key.trim_matches(|c: char| c == ' ' || c == '\t');

    if let Some(cap) = full_path_regex().captures(key) {
        if cap.get(3).is_none() {
            return Ok(format!("projects/{}/secrets/{}/versions/latest", &cap[1], &cap[2]));
        }
        return Ok(key.to_string());
    }

    if let Some(cap) = short_path_regex().captures(key) {
        let project = match cap.get(1) {
            Some(project) => project.as_str(),
            None if default_project.is_empty() => {
                return Err(ReplacerError::InvalidArgument(
                    "missing project_id in path or config".to_string(),
                ))
            }
            None => default_project,
        };
        return Ok(format!("projects/{}/secrets/{}/versions/latest", project, &cap[2]));
    }

    Err(ReplacerError::InvalidArgument(format!("invalid secret path: {}", key)))
}

/// Provider backed by a [`SecretClient`] with an owned value cache.
pub struct SecretManagerProvider {
    client: Arc<dyn SecretClient>,
    cache: LruCache<String>,

    /// Project used for secret paths that do not name one.
    pub project_id: String,
}

impl SecretManagerProvider {
    /// Create a provider with a default-sized cache.
    pub fn new(client: Arc<dyn SecretClient>) -> Self {
        Self::with_cache(client, LruCache::default())
    }

    /// Create a provider with an explicit cache.
    pub fn with_cache(client: Arc<dyn SecretClient>, cache: LruCache<String>) -> Self {
        Self {
            client,
            cache,
            project_id: String::new(),
        }
    }

    /// Set the default project.
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    /// Number of cached secret values.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl Provider for SecretManagerProvider {
    #[instrument(skip(self))]
    async fn value_for(&self, key: &str) -> Result<String> {
        let path = normalize_secret_path(key, &self.project_id)?;

        if let Some(value) = self.cache.get(&path) {
            debug!("Secret cache hit for {}", path);
            return Ok(value);
        }

        let value = self.client.access_secret(&path).await?;
        self.cache.set(path, value.clone());
        Ok(value)
    }

    fn options(&mut self) -> Vec<ConfigOption<'_>> {
        vec![ConfigOption::string("project_id", &mut self.project_id)]
    }

    fn closer(&self) -> Option<&dyn Closer> {
        Some(self)
    }
}

impl Closer for SecretManagerProvider {
    fn close(&self) {
        debug!("Closing secret manager provider ({} cached)", self.cache.len());
        self.cache.clear();
        self.client.close();
    }
}
