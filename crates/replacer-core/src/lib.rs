//! # Replacer Core
//!
//! Text substitution engine for `<replace:...>` directives.
//!
//! This crate provides the directive grammar, the provider plugin contract
//! and registry, the orchestrating [`Replacer`], and the LRU cache providers
//! use to avoid redundant backend calls.
//!
//! ## Features
//!
//! - Directive parsing (`<replace:key>`, `<replace(provider):key>`)
//! - Pluggable, lazily instantiated providers with namespaced options
//! - All-or-nothing substitution with sequential or concurrent prefetch
//! - Thread-safe LRU cache with per-entry TTL
//!
//! ## Example
//!
//! ```rust,ignore
//! use replacer_core::{ProviderRegistry, Replacer, StaticProvider};
//!
//! let registry = Arc::new(ProviderRegistry::new());
//! registry.register("test", || Ok(Box::new(StaticProvider::new().with_value("key1", "value1"))));
//!
//! let mut replacer = Replacer::new(registry, annotations)?;
//! let result = replacer.replace_all("password: <replace(test):key1>").await?;
//! ```

pub mod cache;
pub mod config;
pub mod directive;
pub mod error;
pub mod provider;
pub mod registry;
pub mod replacer;

pub use cache::{CacheValue, LruCache};
pub use config::{load_from_map, ConfigOption, ReplacerConfig, ReplacerSettings, DEFAULT_NAMESPACE};
pub use directive::Directive;
pub use error::{ReplacerError, Result};
pub use provider::{Closer, Provider, StaticProvider};
pub use registry::{ProviderFactory, ProviderRegistry};
pub use replacer::Replacer;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        Closer, ConfigOption, LruCache, Provider, ProviderRegistry, Replacer, ReplacerError,
        ReplacerSettings, Result, StaticProvider,
    };
}
