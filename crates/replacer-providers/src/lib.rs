//! # Replacer Providers
//!
//! Ready-to-use value providers for the replacer engine:
//!
//! - **env**: process environment variables
//! - **gcp**: Google Cloud Secret Manager
//!
//! ## Example
//!
//! ```rust,ignore
//! use replacer_core::{ProviderRegistry, Replacer};
//!
//! let registry = Arc::new(ProviderRegistry::new());
//! replacer_providers::register_all(&registry);
//!
//! let mut replacer = Replacer::new(registry, annotations)?;
//! let out = replacer.replace_all("password: <replace(gcp):acme/db-password>").await?;
//! ```

pub mod env;
pub mod gcp;
pub mod secret_manager;

pub use env::EnvProvider;
pub use gcp::{GcpSecretClient, GcpSettings, MetadataClient};
pub use secret_manager::{SecretClient, SecretManagerProvider};

use replacer_core::{LruCache, ProviderRegistry};
use std::sync::Arc;

/// Register every provider in this crate, reading backend settings from the
/// environment.
pub fn register_all(registry: &ProviderRegistry) {
    register_all_with(registry, GcpSettings::from_env());
}

/// Register every provider in this crate with explicit Secret Manager settings.
pub fn register_all_with(registry: &ProviderRegistry, gcp_settings: GcpSettings) {
    registry.register(env::NAME, || Ok(Box::new(EnvProvider::new())));

    registry.register(secret_manager::NAME, move || {
        let client = GcpSecretClient::new(&gcp_settings)?;
        let cache = LruCache::new(gcp_settings.cache_size, gcp_settings.cache_ttl);
        Ok(Box::new(SecretManagerProvider::with_cache(Arc::new(client), cache)))
    });
}
