//! Environment variable provider.
//!
//! Resolves `<replace(env):NAME>` to the value of `NAME` in the process
//! environment, optionally under a configured prefix.

use async_trait::async_trait;
use replacer_core::{ConfigOption, Provider, ReplacerError, Result};
use tracing::debug;

/// Provider name under which [`EnvProvider`] is registered.
pub const NAME: &str = "env";

/// Reads values from environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvProvider {
    /// Prepended to every key before lookup.
    pub prefix: String,
}

impl EnvProvider {
    /// Create a provider without a prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the variable prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

#[async_trait]
impl Provider for EnvProvider {
    async fn value_for(&self, key: &str) -> Result<String> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ReplacerError::InvalidArgument("empty variable name".to_string()));
        }

        let name = format!("{}{}", self.prefix, key);
        debug!("Reading environment variable {}", name);
        std::env::var(&name).map_err(|e| match e {
            std::env::VarError::NotPresent => ReplacerError::KeyNotFound(name),
            std::env::VarError::NotUnicode(_) => {
                ReplacerError::ProviderError(format!("variable {} is not valid unicode", name))
            }
        })
    }

    fn options(&mut self) -> Vec<ConfigOption<'_>> {
        vec![ConfigOption::string("prefix", &mut self.prefix)]
    }
}
