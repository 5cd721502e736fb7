//! Error types for Replacer Core.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for replacer operations.
pub type Result<T> = std::result::Result<T, ReplacerError>;

/// Main error type for the replacer engine and its providers.
#[derive(Debug, Error)]
pub enum ReplacerError {
    /// A required configuration key was absent from the map.
    #[error("config: missing required key {0}")]
    MissingConfigKey(String),

    /// A configuration value could not be converted to the option's type.
    #[error("config: invalid value {value:?} for key {key}: {reason}")]
    InvalidConfigValue {
        key: String,
        value: String,
        reason: String,
    },

    /// A directive used the default provider but none is configured.
    #[error("no provider given")]
    NoProvider,

    /// No factory is registered under the requested name.
    #[error("provider not found: {0}")]
    UnknownProvider(String),

    /// The provider factory failed.
    #[error("failed to initialize provider '{name}': {source}")]
    ProviderInit {
        name: String,
        #[source]
        source: Box<ReplacerError>,
    },

    /// The provider has no value for the key.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The backend refused access to the key.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The key is malformed for this provider.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Provider-specific failure.
    #[error("provider error: {0}")]
    ProviderError(String),

    /// Backend round-trip failed.
    #[error("backend error: {0}")]
    BackendError(String),

    /// A concurrent prefetch task panicked or was cancelled.
    #[error("prefetch task failed: {0}")]
    TaskFailed(String),

    /// Timeout occurred.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ReplacerError {
    /// Whether this error means the provider simply has no value for a key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReplacerError::KeyNotFound(_))
    }
}
