//! Value provider trait.
//!
//! Defines the interface that replacement backends must implement.

use crate::config::ConfigOption;
use crate::{ReplacerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// Trait that value providers must implement.
///
/// A provider resolves the key of a `<replace(name):key>` directive to the
/// text that replaces it. Providers are created per [`Replacer`](crate::Replacer)
/// and may hold backend clients and caches for its lifetime.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Resolve `key` to its replacement value.
    ///
    /// Providers should return [`ReplacerError::KeyNotFound`] when the key
    /// simply has no value, so callers can tell it apart from backend failures.
    async fn value_for(&self, key: &str) -> Result<String>;

    /// Declared options, read from the provider's namespace after creation.
    fn options(&mut self) -> Vec<ConfigOption<'_>> {
        Vec::new()
    }

    /// Teardown capability, for providers that hold backend resources.
    fn closer(&self) -> Option<&dyn Closer> {
        None
    }
}

/// Cleanup for providers that own backend resources.
pub trait Closer {
    /// Release backend resources. Called at most once per provider instance.
    fn close(&self);
}

/// An in-memory provider backed by a fixed map.
#[derive(Debug, Default, Clone)]
pub struct StaticProvider {
    /// Replacement values (key -> value).
    pub values: HashMap<String, String>,
}

impl StaticProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticProvider {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[async_trait]
impl Provider for StaticProvider {
    async fn value_for(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| ReplacerError::KeyNotFound(key.to_string()))
    }
}
