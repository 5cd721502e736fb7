//! Replacer - the orchestrator for directive substitution.
//!
//! A [`Replacer`] owns the providers it instantiates, resolves every
//! directive of a call up front and only then rewrites the text, so a
//! failure anywhere leaves no partial output.

use crate::config::{load_from_map, ReplacerConfig, ReplacerSettings};
use crate::directive::{contains_directive, parse_directives, Directive};
use crate::{Provider, ProviderRegistry, ReplacerError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// A directive bound to the provider that resolves it.
struct Replacement {
    directive: Directive,
    provider_name: String,
    provider: Arc<dyn Provider>,
}

/// Performs replacement on strings using registered providers.
///
/// One `Replacer` serves one caller; [`replace_all`](Self::replace_all)
/// takes `&mut self` because provider instantiation is memoized on it.
///
/// # Example
///
/// ```rust
/// use replacer_core::{ProviderRegistry, Replacer, StaticProvider};
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let registry = Arc::new(ProviderRegistry::new());
/// registry.register("test", || Ok(Box::new(StaticProvider::new().with_value("user", "admin"))));
///
/// let config = HashMap::from([("replacer.agb.dev/provider".to_string(), "test".to_string())]);
/// let mut replacer = Replacer::new(registry, config).unwrap();
///
/// let out = replacer.replace_all("login=<replace:user>").await.unwrap();
/// assert_eq!(out, "login=admin");
/// # });
/// ```
pub struct Replacer {
    registry: Arc<ProviderRegistry>,
    config: ReplacerConfig,
    raw_config: HashMap<String, String>,
    settings: ReplacerSettings,
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl Replacer {
    /// Create a replacer from a raw configuration map with default settings.
    pub fn new(registry: Arc<ProviderRegistry>, config: HashMap<String, String>) -> Result<Self> {
        Self::with_settings(registry, config, ReplacerSettings::default())
    }

    /// Create a replacer with explicit settings.
    ///
    /// If a default provider is configured it is instantiated immediately,
    /// so a misconfigured provider fails here rather than on first use.
    pub fn with_settings(
        registry: Arc<ProviderRegistry>,
        config: HashMap<String, String>,
        settings: ReplacerSettings,
    ) -> Result<Self> {
        let parsed = ReplacerConfig::from_map(&config, &settings.namespace)?;

        let mut replacer = Self {
            registry,
            config: parsed,
            raw_config: config,
            settings,
            providers: HashMap::new(),
        };

        if !replacer.config.provider.is_empty() {
            let name = replacer.config.provider.clone();
            replacer.provider(&name)?;
        }

        Ok(replacer)
    }

    /// The parsed engine options.
    pub fn config(&self) -> &ReplacerConfig {
        &self.config
    }

    /// Names of the providers instantiated so far.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    /// Replace every directive in `text` with its resolved value.
    ///
    /// Returns `text` unchanged when it contains no directives. Any provider
    /// or resolution failure fails the whole call.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn replace_all(&mut self, text: &str) -> Result<String> {
        let replacements = self.replacements(text)?;
        if replacements.is_empty() {
            return Ok(text.to_string());
        }

        let values = self.prefetch(&replacements).await?;

        let mut output = text.to_string();
        for (replacement, value) in replacements.iter().zip(values) {
            let Some(value) = value else {
                debug!(
                    "Leaving unknown key '{}' for provider '{}'",
                    replacement.directive.key, replacement.provider_name
                );
                continue;
            };

            let rendered = if self.config.escape_replacements {
                serde_json::to_string(&value)?
            } else {
                value
            };
            output = output.replace(&replacement.directive.full, &rendered);
        }

        Ok(output)
    }

    /// Collect distinct directives in first-appearance order and bind each
    /// to its provider.
    fn replacements(&mut self, text: &str) -> Result<Vec<Replacement>> {
        if !contains_directive(text) {
            return Ok(Vec::new());
        }
        let directives = parse_directives(text);

        let mut seen = HashSet::new();
        let mut replacements = Vec::new();
        for directive in directives {
            if !seen.insert(directive.full.clone()) {
                continue;
            }

            let provider_name = directive.provider_or(&self.config.provider).to_string();
            let provider = self.provider(&provider_name)?;
            replacements.push(Replacement {
                directive,
                provider_name,
                provider,
            });
        }

        debug!("Found {} distinct directives", replacements.len());
        Ok(replacements)
    }

    /// Return the memoized provider for `name`, creating and configuring it
    /// on first use.
    fn provider(&mut self, name: &str) -> Result<Arc<dyn Provider>> {
        if let Some(provider) = self.providers.get(name) {
            return Ok(Arc::clone(provider));
        }

        let mut provider = self.registry.instantiate(name)?;
        let prefix = self.settings.provider_prefix(name);
        if let Err(e) = load_from_map(&self.raw_config, &prefix, provider.options()) {
            // Never memoized, so Drop will not see it.
            if let Some(closer) = provider.closer() {
                closer.close();
            }
            return Err(e);
        }

        let provider: Arc<dyn Provider> = Arc::from(provider);
        self.providers.insert(name.to_string(), Arc::clone(&provider));
        info!("Provider '{}' ready", name);
        Ok(provider)
    }

    /// Resolve every replacement before any text is touched.
    ///
    /// `None` marks a key the provider does not know, when unknown keys are
    /// being ignored.
    async fn prefetch(&self, replacements: &[Replacement]) -> Result<Vec<Option<String>>> {
        let ignore_unknown = self.config.ignore_unknown_keys;

        if replacements.len() <= self.settings.concurrency_threshold {
            debug!("Prefetching {} values sequentially", replacements.len());
            let mut values = Vec::with_capacity(replacements.len());
            for r in replacements {
                values.push(resolve(r.provider.as_ref(), &r.directive.key, ignore_unknown).await?);
            }
            return Ok(values);
        }

        self.prefetch_concurrent(replacements, ignore_unknown).await
    }

    /// Resolve all replacements in parallel under the prefetch deadline.
    ///
    /// The first failure aborts the remaining tasks. Aborted or timed out
    /// tasks stop at their next await point; a provider that blocks without
    /// yielding keeps running in the background.
    async fn prefetch_concurrent(
        &self,
        replacements: &[Replacement],
        ignore_unknown: bool,
    ) -> Result<Vec<Option<String>>> {
        debug!("Prefetching {} values concurrently", replacements.len());

        let mut join_set = JoinSet::new();
        for (index, r) in replacements.iter().enumerate() {
            let provider = Arc::clone(&r.provider);
            let key = r.directive.key.clone();
            join_set.spawn(async move {
                let value = resolve(provider.as_ref(), &key, ignore_unknown).await;
                (index, value)
            });
        }

        let mut values = vec![None; replacements.len()];
        let drain = async {
            while let Some(joined) = join_set.join_next().await {
                let (index, value) = joined.map_err(|e| ReplacerError::TaskFailed(e.to_string()))?;
                match value {
                    Ok(value) => values[index] = value,
                    Err(e) => {
                        join_set.abort_all();
                        return Err(e);
                    }
                }
            }
            Ok::<(), ReplacerError>(())
        };

        let timeout = self.settings.prefetch_timeout;
        match tokio::time::timeout(timeout, drain).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Prefetch exceeded {:?}, abandoning outstanding lookups", timeout);
                return Err(ReplacerError::Timeout(timeout));
            }
        }

        Ok(values)
    }
}

async fn resolve(
    provider: &dyn Provider,
    key: &str,
    ignore_unknown: bool,
) -> Result<Option<String>> {
    match provider.value_for(key).await {
        Ok(value) => Ok(Some(value)),
        Err(e) if ignore_unknown && e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

impl Drop for Replacer {
    fn drop(&mut self) {
        for (name, provider) in self.providers.drain() {
            if let Some(closer) = provider.closer() {
                debug!("Closing provider '{}'", name);
                closer.close();
            }
        }
    }
}

impl std::fmt::Debug for Replacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replacer")
            .field("config", &self.config)
            .field("settings", &self.settings)
            .field("providers", &self.provider_names())
            .finish()
    }
}
