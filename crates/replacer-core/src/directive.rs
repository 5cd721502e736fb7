//! Replacement directive parsing.
//!
//! Directives look like `<replace:key>` (default provider) or
//! `<replace(provider):key>` (named provider). Anything that does not match
//! the grammar is left alone.

use regex::Regex;
use std::sync::OnceLock;

/// Pattern for matching replacement directives.
/// Provider names are `[a-z_-]+`; keys run up to the next `>` or newline.
const DIRECTIVE_PATTERN: &str = r"<replace(?:\(([a-z_-]+)\))?:([^\n>]+)>";

static DIRECTIVE_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_directive_regex() -> &'static Regex {
    DIRECTIVE_REGEX
        .get_or_init(|| Regex::new(DIRECTIVE_PATTERN).expect("Invalid directive pattern regex"))
}

/// A directive found in input text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Directive {
    /// The exact matched text, e.g. `<replace(gcp):db-password>`.
    pub full: String,

    /// Explicit provider name, if the directive named one.
    pub provider: Option<String>,

    /// Key passed verbatim to the provider.
    pub key: String,
}

impl Directive {
    /// The provider to use, falling back to `default`.
    pub fn provider_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.provider.as_deref().unwrap_or(default)
    }
}

/// Find all directives in `text`, in order of appearance.
///
/// # Example
///
/// ```
/// use replacer_core::directive::parse_directives;
///
/// let found = parse_directives("user=<replace:db-user> pass=<replace(gcp):db-pass>");
/// assert_eq!(found.len(), 2);
/// assert_eq!(found[0].provider, None);
/// assert_eq!(found[1].provider.as_deref(), Some("gcp"));
/// ```
pub fn parse_directives(text: &str) -> Vec<Directive> {
    get_directive_regex()
        .captures_iter(text)
        .map(|cap| Directive {
            full: cap[0].to_string(),
            provider: cap.get(1).map(|m| m.as_str().to_string()),
            key: cap[2].to_string(),
        })
        .collect()
}

/// Whether `text` contains at least one directive.
pub fn contains_directive(text: &str) -> bool {
    get_directive_regex().is_match(text)
}
