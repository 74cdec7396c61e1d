//! Parsed key/value layers and the snapshots that pair them with a hash.

use std::collections::HashMap;
use std::sync::Arc;

/// A parsed key/value layer produced from one resource.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    name: String,
    values: Arc<HashMap<String, config::Value>>,
}

impl Layer {
    /// Create a layer from a parsed key/value map.
    pub fn new(name: impl Into<String>, values: HashMap<String, config::Value>) -> Self {
        Self {
            name: name.into(),
            values: Arc::new(values),
        }
    }

    /// An empty layer, used when an optional resource could not be loaded.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, HashMap::new())
    }

    /// Name of the resource this layer was built from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the layer holds no keys.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Top-level values of the layer.
    pub fn values(&self) -> &HashMap<String, config::Value> {
        &self.values
    }

    /// Look up a dot-separated key path (`Config.Text`) in this layer.
    pub fn get(&self, key: &str) -> Option<&config::Value> {
        lookup(&self.values, key)
    }
}

/// Deep-merge layers in order; later layers override earlier ones.
///
/// Tables are merged key by key, every other value kind replaces what was there.
pub fn merge_layers<'a, I>(layers: I) -> HashMap<String, config::Value>
where
    I: IntoIterator<Item = &'a Layer>,
{
    let mut merged = HashMap::new();
    for layer in layers {
        merge_into(&mut merged, layer.values());
    }
    merged
}

fn merge_into(target: &mut HashMap<String, config::Value>, incoming: &HashMap<String, config::Value>) {
    for (key, value) in incoming {
        match (target.get_mut(key), &value.kind) {
            (Some(existing), config::ValueKind::Table(incoming_table)) => {
                if let config::ValueKind::Table(existing_table) = &mut existing.kind {
                    merge_into(existing_table, incoming_table);
                } else {
                    *existing = value.clone();
                }
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Walk a dot-separated key path through nested tables.
pub(crate) fn lookup<'a>(
    root: &'a HashMap<String, config::Value>,
    key: &str,
) -> Option<&'a config::Value> {
    let mut segments = key.split('.');
    let mut current = root.get(segments.next()?)?;
    for segment in segments {
        match &current.kind {
            config::ValueKind::Table(table) => current = table.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

/// The active parsed view of a resource and the hash of the bytes it was built from.
///
/// Snapshots are replaced wholesale; they are never mutated in place.
#[derive(Debug, Clone)]
pub struct Snapshot {
    layer: Layer,
    hash: Option<String>,
    version: u64,
}

impl Snapshot {
    /// Create a snapshot.
    ///
    /// `hash` is `None` when the layer did not come from fetched bytes (an
    /// optional resource that failed to load).
    pub fn new(layer: Layer, hash: Option<String>, version: u64) -> Self {
        Self {
            layer,
            hash,
            version,
        }
    }

    /// The parsed layer.
    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    /// Hash of the source bytes.
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// Sequence number of the fetch that produced this snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JsonParser, Parser};

    #[test]
    fn test_empty_layer() {
        let layer = Layer::empty("missing.json");
        assert!(layer.is_empty());
        assert_eq!(layer.name(), "missing.json");
        assert!(layer.get("anything").is_none());
    }

    #[test]
    fn test_lookup_nested_path() {
        let layer = JsonParser
            .parse_layer("a.json", br#"{"Config":{"Inner":{"Port":8080}}}"#)
            .unwrap();

        let port = layer.get("Config.Inner.Port").unwrap().clone();
        assert_eq!(port.into_int().unwrap(), 8080);
        assert!(layer.get("Config.Missing").is_none());
        assert!(layer.get("Config.Inner.Port.Deeper").is_none());
    }

    #[test]
    fn test_layers_deep_merge() {
        let base = JsonParser
            .parse_layer("base.json", br#"{"Config":{"Text":"base","Keep":"yes"},"Other":1}"#)
            .unwrap();
        let overlay = JsonParser
            .parse_layer("overlay.json", br#"{"Config":{"Text":"overlay"}}"#)
            .unwrap();

        let merged = merge_layers([&base, &overlay]);

        let text = lookup(&merged, "Config.Text").unwrap().clone();
        assert_eq!(text.into_string().unwrap(), "overlay");
        let keep = lookup(&merged, "Config.Keep").unwrap().clone();
        assert_eq!(keep.into_string().unwrap(), "yes");
        assert!(lookup(&merged, "Other").is_some());
    }

    #[test]
    fn test_scalar_replaces_table() {
        let base = JsonParser
            .parse_layer("base.json", br#"{"Config":{"Text":"base"}}"#)
            .unwrap();
        let overlay = JsonParser
            .parse_layer("overlay.json", br#"{"Config":"flat"}"#)
            .unwrap();

        let merged = merge_layers([&base, &overlay]);
        let value = lookup(&merged, "Config").unwrap().clone();
        assert_eq!(value.into_string().unwrap(), "flat");
    }

    #[test]
    fn test_snapshot_accessors() {
        let snapshot = Snapshot::new(Layer::empty("a.json"), Some("abc".to_string()), 7);
        assert_eq!(snapshot.hash(), Some("abc"));
        assert_eq!(snapshot.version(), 7);
        assert!(snapshot.layer().is_empty());
    }
}
