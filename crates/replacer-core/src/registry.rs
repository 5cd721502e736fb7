//! Provider registry.
//!
//! Maps provider names to factories. A registry is built once at startup,
//! wrapped in an `Arc` and handed to every [`Replacer`](crate::Replacer).

use crate::{Provider, ReplacerError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Constructor for a provider instance.
pub type ProviderFactory = Arc<dyn Fn() -> Result<Box<dyn Provider>> + Send + Sync>;

/// Name -> factory mapping for providers.
///
/// # Example
///
/// ```
/// use replacer_core::{ProviderRegistry, StaticProvider};
///
/// let registry = ProviderRegistry::new();
/// registry.register("test", || Ok(Box::new(StaticProvider::new().with_value("k", "v"))));
/// assert!(registry.contains("test"));
/// ```
#[derive(Default)]
pub struct ProviderRegistry {
    factories: DashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `name` with a provider factory.
    ///
    /// # Panics
    ///
    /// Panics if a provider with the same name is already registered.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn Provider>> + Send + Sync + 'static,
    {
        let name = name.into();
        match self.factories.entry(name) {
            Entry::Occupied(entry) => panic!("provider already registered: {}", entry.key()),
            Entry::Vacant(entry) => {
                info!("Registered provider '{}'", entry.key());
                entry.insert(Arc::new(factory));
            }
        }
    }

    /// Create a new instance of the provider named `name`.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Provider>> {
        if name.is_empty() {
            return Err(ReplacerError::NoProvider);
        }

        // Clone the factory out so no shard lock is held while it runs.
        let factory = self
            .factories
            .get(name)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| ReplacerError::UnknownProvider(name.to_string()))?;

        debug!("Instantiating provider '{}'", name);
        factory().map_err(|e| ReplacerError::ProviderInit {
            name: name.to_string(),
            source: Box::new(e),
        })
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
