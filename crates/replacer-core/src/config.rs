//! # Replacer Configuration
//!
//! Two layers of configuration:
//!
//! - A declarative option schema applied to flat string maps (resource
//!   annotations). Every consumer lists its options as [`ConfigOption`]s and
//!   [`load_from_map`] fills them in.
//! - Process-level tuning in [`ReplacerSettings`], loaded from environment
//!   variables with programmatic defaults.

use crate::{ReplacerError, Result};
use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Namespace under which all replacer annotations live.
pub const DEFAULT_NAMESPACE: &str = "replacer.agb.dev/";

/// Where a parsed option value is written.
#[derive(Debug)]
pub enum OptionTarget<'a> {
    Str(&'a mut String),
    Int(&'a mut i64),
    Bool(&'a mut bool),
}

/// A single declared option: map key, destination and whether it must be present.
#[derive(Debug)]
pub struct ConfigOption<'a> {
    key: &'static str,
    target: OptionTarget<'a>,
    required: bool,
}

impl<'a> ConfigOption<'a> {
    /// A string option.
    pub fn string(key: &'static str, target: &'a mut String) -> Self {
        Self::new(key, OptionTarget::Str(target))
    }

    /// A signed integer option.
    pub fn int(key: &'static str, target: &'a mut i64) -> Self {
        Self::new(key, OptionTarget::Int(target))
    }

    /// A boolean option.
    pub fn bool(key: &'static str, target: &'a mut bool) -> Self {
        Self::new(key, OptionTarget::Bool(target))
    }

    fn new(key: &'static str, target: OptionTarget<'a>) -> Self {
        Self {
            key,
            target,
            required: false,
        }
    }

    /// Mark the option as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// The unprefixed key.
    pub fn key(&self) -> &'static str {
        self.key
    }
}

/// Apply `map` to `options`, reading each option from `prefix + key`.
///
/// Keys not named by any option are ignored. A missing optional key leaves
/// its target untouched; a missing required key is an error.
pub fn load_from_map(
    map: &HashMap<String, String>,
    prefix: &str,
    options: Vec<ConfigOption<'_>>,
) -> Result<()> {
    for option in options {
        let full_key = format!("{}{}", prefix, option.key);
        match map.get(&full_key) {
            Some(value) => set_option(&full_key, value, option.target)?,
            None if option.required => return Err(ReplacerError::MissingConfigKey(full_key)),
            None => {}
        }
    }
    Ok(())
}

fn set_option(key: &str, value: &str, target: OptionTarget<'_>) -> Result<()> {
    let invalid = |reason: String| ReplacerError::InvalidConfigValue {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    };

    match target {
        OptionTarget::Str(s) => *s = value.to_string(),
        OptionTarget::Int(i) => *i = value.parse().map_err(|e| invalid(format!("{}", e)))?,
        OptionTarget::Bool(b) => {
            *b = parse_bool(value).ok_or_else(|| invalid("expected a boolean".to_string()))?
        }
    }
    Ok(())
}

/// Parse the boolean spellings accepted in annotations.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Options read from the engine namespace of a configuration map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplacerConfig {
    /// Name of the provider used by directives that do not name one.
    pub provider: String,

    /// Substitute values as quoted, escaped JSON strings.
    pub escape_replacements: bool,

    /// Leave directives whose key the provider does not know in place.
    pub ignore_unknown_keys: bool,
}

impl ReplacerConfig {
    /// The option schema for this struct.
    pub fn options(&mut self) -> Vec<ConfigOption<'_>> {
        vec![
            ConfigOption::string("provider", &mut self.provider),
            ConfigOption::bool("escape_replacements", &mut self.escape_replacements),
            ConfigOption::bool("ignore_unknown_keys", &mut self.ignore_unknown_keys),
        ]
    }

    /// Load from the engine namespace of `map`.
    pub fn from_map(map: &HashMap<String, String>, namespace: &str) -> Result<Self> {
        let mut config = Self::default();
        load_from_map(map, namespace, config.options())?;
        Ok(config)
    }
}

/// Process-wide tuning for [`Replacer`](crate::Replacer) instances.
///
/// # Example
/// ```rust
/// use replacer_core::ReplacerSettings;
/// use std::time::Duration;
///
/// let settings = ReplacerSettings::default()
///     .with_concurrency_threshold(4)
///     .with_prefetch_timeout(Duration::from_secs(2));
/// assert_eq!(settings.concurrency_threshold, 4);
/// ```
#[derive(Debug, Clone)]
pub struct ReplacerSettings {
    /// Prefetch concurrently once a call has more than this many distinct directives.
    /// Default: 10, Env: REPLACER_CONCURRENCY_THRESHOLD
    pub concurrency_threshold: usize,

    /// Upper bound on a concurrent prefetch batch.
    /// Default: 10s, Env: REPLACER_PREFETCH_TIMEOUT_SECS
    pub prefetch_timeout: Duration,

    /// Key prefix for engine and provider options.
    /// Default: "replacer.agb.dev/", Env: REPLACER_NAMESPACE
    pub namespace: String,
}

impl Default for ReplacerSettings {
    fn default() -> Self {
        Self {
            concurrency_threshold: 10,
            prefetch_timeout: Duration::from_secs(10),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl ReplacerSettings {
    /// Create settings from environment variables.
    /// Falls back to defaults for missing or unparsable variables.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(v) = env::var("REPLACER_CONCURRENCY_THRESHOLD") {
            if let Ok(n) = v.parse() {
                settings.concurrency_threshold = n;
            }
        }
        if let Ok(v) = env::var("REPLACER_PREFETCH_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                settings.prefetch_timeout = Duration::from_secs(n);
            }
        }
        if let Ok(v) = env::var("REPLACER_NAMESPACE") {
            if !v.is_empty() {
                settings.namespace = v;
            }
        }

        settings
    }

    /// Builder: Set the concurrency threshold.
    pub fn with_concurrency_threshold(mut self, threshold: usize) -> Self {
        self.concurrency_threshold = threshold;
        self
    }

    /// Builder: Set the concurrent prefetch deadline.
    pub fn with_prefetch_timeout(mut self, timeout: Duration) -> Self {
        self.prefetch_timeout = timeout;
        self
    }

    /// Builder: Set the option namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Key prefix for the options of provider `name`.
    pub fn provider_prefix(&self, name: &str) -> String {
        format!("{}{}.", self.namespace, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Sample {
        foo: String,
        bar: i64,
        baz: bool,
    }

    impl Sample {
        fn options(&mut self) -> Vec<ConfigOption<'_>> {
            vec![
                ConfigOption::string("foo", &mut self.foo),
                ConfigOption::int("bar", &mut self.bar),
                ConfigOption::bool("baz", &mut self.baz),
            ]
        }
    }

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn load(pairs: &[(&str, &str)], prefix: &str) -> Result<Sample> {
        let mut sample = Sample::default();
        load_from_map(&map(pairs), prefix, sample.options())?;
        Ok(sample)
    }

    #[test]
    fn test_string_fields() {
        assert_eq!(load(&[("foo", "foo")], "").unwrap().foo, "foo");
        assert_eq!(load(&[("foo", "123")], "").unwrap().foo, "123");
    }

    #[test]
    fn test_int_fields() {
        for (raw, expected) in [("0", 0), ("123", 123), ("-456", -456), ("+789", 789)] {
            assert_eq!(load(&[("bar", raw)], "").unwrap().bar, expected, "input {}", raw);
        }
        assert!(matches!(
            load(&[("bar", "12x")], ""),
            Err(ReplacerError::InvalidConfigValue { .. })
        ));
    }

    #[test]
    fn test_bool_fields() {
        let cases = [("true", true), ("false", false), ("1", true), ("0", false), ("T", true)];
        for (raw, expected) in cases {
            assert_eq!(load(&[("baz", raw)], "").unwrap().baz, expected, "input {}", raw);
        }
        assert!(load(&[("baz", "yes")], "").is_err());
    }

    #[test]
    fn test_prefixed_keys() {
        assert_eq!(load(&[("prefix-foo", "foo")], "prefix-").unwrap().foo, "foo");
        assert_eq!(load(&[("k8s.io/bar", "7")], "k8s.io/").unwrap().bar, 7);
        assert!(load(&[("my.prefix/baz", "true")], "my.prefix/").unwrap().baz);
        // unprefixed keys do not leak into a prefixed load
        assert_eq!(load(&[("foo", "foo")], "prefix-").unwrap().foo, "");
    }

    #[test]
    fn test_missing_optional_and_unknown_keys_are_ignored() {
        let sample = load(&[("other", "bar")], "").unwrap();
        assert_eq!(sample.foo, "");
        assert_eq!(sample.bar, 0);
        assert!(!sample.baz);
    }

    #[test]
    fn test_missing_required_key() {
        let mut foo = String::new();
        let err = load_from_map(
            &map(&[("bar", "bar")]),
            "ns/",
            vec![ConfigOption::string("foo", &mut foo).required()],
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "config: missing required key ns/foo");
    }

    #[test]
    fn test_replacer_config_from_map() {
        let config = ReplacerConfig::from_map(
            &map(&[
                ("replacer.agb.dev/provider", "test"),
                ("replacer.agb.dev/escape_replacements", "true"),
                ("replacer.agb.dev/test.option", "ignored"),
            ]),
            DEFAULT_NAMESPACE,
        )
        .unwrap();
        assert_eq!(config.provider, "test");
        assert!(config.escape_replacements);
        assert!(!config.ignore_unknown_keys);
    }

    #[test]
    fn test_default_settings() {
        let settings = ReplacerSettings::default();
        assert_eq!(settings.concurrency_threshold, 10);
        assert_eq!(settings.prefetch_timeout, Duration::from_secs(10));
        assert_eq!(settings.provider_prefix("gcp"), "replacer.agb.dev/gcp.");
    }
}
