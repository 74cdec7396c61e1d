//! Parsers turning resource bytes into key/value layers.

use crate::core::Layer;
use crate::error::{ConfigError, Result};
use config::{File, FileFormat};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Converts raw resource bytes into a key/value map.
///
/// The returned map has the same shape the `config` crate produces for a file:
/// top-level keys mapping to nested tables, arrays and scalars.
pub trait Parser: Send + Sync + fmt::Debug {
    /// Parse `bytes` into a key/value map.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the bytes are not valid for this format.
    fn parse(&self, bytes: &[u8]) -> Result<HashMap<String, config::Value>>;

    /// Parse `bytes` into a named [`Layer`].
    fn parse_layer(&self, name: &str, bytes: &[u8]) -> Result<Layer> {
        Ok(Layer::new(name, self.parse(bytes)?))
    }
}

/// JSON parser, the default for remote resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn parse(&self, bytes: &[u8]) -> Result<HashMap<String, config::Value>> {
        let json: JsonValue = serde_json::from_slice(bytes)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse JSON: {}", e)))?;
        json_to_config_map(json)
    }
}

/// Parser for any text format the `config` crate understands (YAML, TOML, JSON).
///
/// # Examples
///
/// ```rust
/// use hotswap_remote::core::{FormatParser, Parser};
///
/// let parser = FormatParser::yaml();
/// let map = parser.parse(b"server:\n  port: 8080\n").unwrap();
/// assert!(map.contains_key("server"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FormatParser {
    format: FileFormat,
}

impl FormatParser {
    /// YAML parser.
    pub fn yaml() -> Self {
        Self {
            format: FileFormat::Yaml,
        }
    }

    /// TOML parser.
    pub fn toml() -> Self {
        Self {
            format: FileFormat::Toml,
        }
    }

    /// Pick a parser from a resource name's extension, falling back to JSON.
    pub fn for_name(name: &str) -> Arc<dyn Parser> {
        match name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("yaml") | Some("yml") => Arc::new(Self::yaml()),
            Some("toml") => Arc::new(Self::toml()),
            _ => Arc::new(JsonParser),
        }
    }
}

impl Parser for FormatParser {
    fn parse(&self, bytes: &[u8]) -> Result<HashMap<String, config::Value>> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ConfigError::Parse(format!("Resource is not valid UTF-8: {}", e)))?;

        let parsed = config::Config::builder()
            .add_source(File::from_str(text, self.format))
            .build()
            .map_err(|e| ConfigError::Parse(format!("Failed to parse {:?}: {}", self.format, e)))?;

        parsed
            .try_deserialize::<HashMap<String, config::Value>>()
            .map_err(|e| ConfigError::Parse(format!("Failed to read {:?} table: {}", self.format, e)))
    }
}

/// Convert a JSON document to a config::Value map.
fn json_to_config_map(json: JsonValue) -> Result<HashMap<String, config::Value>> {
    match json {
        JsonValue::Object(map) => {
            let mut result = HashMap::new();
            for (key, value) in map {
                result.insert(key, json_value_to_config_value(value)?);
            }
            Ok(result)
        }
        _ => Err(ConfigError::Parse(
            "Expected JSON object at root level".to_string(),
        )),
    }
}

/// Convert a serde_json::Value to a config::Value.
fn json_value_to_config_value(value: JsonValue) -> Result<config::Value> {
    match value {
        JsonValue::Null => Ok(config::Value::new(None, config::ValueKind::Nil)),
        JsonValue::Bool(b) => Ok(config::Value::new(None, config::ValueKind::Boolean(b))),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(config::Value::new(None, config::ValueKind::I64(i)))
            } else if let Some(u) = n.as_u64() {
                Ok(config::Value::new(None, config::ValueKind::U64(u)))
            } else if let Some(f) = n.as_f64() {
                Ok(config::Value::new(None, config::ValueKind::Float(f)))
            } else {
                Err(ConfigError::Parse(format!("Unsupported number type: {}", n)))
            }
        }
        JsonValue::String(s) => Ok(config::Value::new(None, config::ValueKind::String(s))),
        JsonValue::Array(arr) => {
            let values: Result<Vec<config::Value>> =
                arr.into_iter().map(json_value_to_config_value).collect();
            Ok(config::Value::new(None, config::ValueKind::Array(values?)))
        }
        JsonValue::Object(map) => {
            let mut result = HashMap::new();
            for (key, val) in map {
                result.insert(key, json_value_to_config_value(val)?);
            }
            Ok(config::Value::new(None, config::ValueKind::Table(result)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_parser_nested() {
        let map = JsonParser
            .parse(br#"{"Config":{"Text":"v1","Count":3},"debug":true}"#)
            .unwrap();

        assert!(map.contains_key("Config"));
        assert!(map.contains_key("debug"));

        let table = map["Config"].clone().into_table().unwrap();
        assert_eq!(table["Text"].clone().into_string().unwrap(), "v1");
        assert_eq!(table["Count"].clone().into_int().unwrap(), 3);
    }

    #[test]
    fn test_json_parser_rejects_non_object_root() {
        assert!(JsonParser.parse(b"[1, 2, 3]").is_err());
    }

    #[test]
    fn test_json_parser_rejects_garbage() {
        let err = JsonParser.parse(b"{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_toml_parser() {
        let map = FormatParser::toml()
            .parse(b"[server]\nport = 8080\n")
            .unwrap();
        assert!(map.contains_key("server"));
    }

    #[test]
    fn test_for_name() {
        let parser = FormatParser::for_name("settings.yml");
        assert!(parser.parse(b"a: 1\n").is_ok());

        let parser = FormatParser::for_name("settings.json");
        assert!(parser.parse(br#"{"a":1}"#).is_ok());
    }
}
