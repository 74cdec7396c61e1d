//! Options describing one remote configuration resource.

use crate::core::{JsonParser, Parser};
use crate::error::{ConfigError, Result};
use std::sync::Arc;

/// Options for one remote resource.
///
/// Options are consumed by the provider builder and cannot be changed once the
/// provider exists.
///
/// # Examples
///
/// ```rust
/// use hotswap_remote::client::RemoteResourceOptions;
///
/// let options = RemoteResourceOptions::new("appsettings.json")
///     .unwrap()
///     .optional(true)
///     .reload_on_change(true);
///
/// assert!(options.is_optional());
/// assert!(RemoteResourceOptions::new("").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct RemoteResourceOptions {
    configuration_name: String,
    optional: bool,
    reload_on_change: bool,
    parser: Arc<dyn Parser>,
}

impl RemoteResourceOptions {
    /// Create options for the resource called `configuration_name`.
    ///
    /// Defaults: required, no reload on change, JSON parser.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Argument`] if the name is empty or blank.
    pub fn new(configuration_name: impl Into<String>) -> Result<Self> {
        let configuration_name = configuration_name.into();
        if configuration_name.trim().is_empty() {
            return Err(ConfigError::argument("configuration name must not be empty"));
        }

        Ok(Self {
            configuration_name,
            optional: false,
            reload_on_change: false,
            parser: Arc::new(JsonParser),
        })
    }

    /// Whether a failed initial load yields an empty layer instead of an error.
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Whether to reload on push notifications and on a polling interval.
    pub fn reload_on_change(mut self, reload_on_change: bool) -> Self {
        self.reload_on_change = reload_on_change;
        self
    }

    /// Set the parser used to turn fetched bytes into a layer.
    pub fn with_parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = parser;
        self
    }

    /// Name of the resource, also its pub/sub topic.
    pub fn configuration_name(&self) -> &str {
        &self.configuration_name
    }

    /// See [`optional`](Self::optional).
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// See [`reload_on_change`](Self::reload_on_change).
    pub fn reloads_on_change(&self) -> bool {
        self.reload_on_change
    }

    /// The configured parser.
    pub fn parser(&self) -> &Arc<dyn Parser> {
        &self.parser
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RemoteResourceOptions::new("app.json").unwrap();
        assert_eq!(options.configuration_name(), "app.json");
        assert!(!options.is_optional());
        assert!(!options.reloads_on_change());
    }

    #[test]
    fn test_blank_name_rejected() {
        for name in ["", "   "] {
            let result = RemoteResourceOptions::new(name);
            assert!(matches!(result, Err(ConfigError::Argument(_))));
        }
    }

    #[test]
    fn test_with_parser() {
        let options = RemoteResourceOptions::new("app.yaml")
            .unwrap()
            .with_parser(Arc::new(crate::core::FormatParser::yaml()));
        assert!(options.parser().parse(b"a: 1\n").is_ok());
    }
}
