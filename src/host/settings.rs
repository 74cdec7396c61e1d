//! Settings for a configuration host process.
//!
//! Settings are loaded with standard precedence: built-in defaults, then an
//! optional settings file, then environment variables.

use crate::error::{ConfigError, Result};
use config::{Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for host settings.
pub const ENV_PREFIX: &str = "REMOTE_CONFIG";

/// Separator for nested keys in environment variables.
pub const ENV_SEPARATOR: &str = "__";

/// Pub/sub backend selection.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum PubSubSettings {
    /// No publisher: clients rely on polling.
    #[default]
    None,
    /// In-process broker; only reaches clients in the same process.
    Memory,
    /// Redis channels.
    Redis {
        /// Server URL, e.g. `redis://127.0.0.1:6379`
        url: String,
    },
    /// NATS subjects.
    Nats {
        /// Server URL, e.g. `nats://127.0.0.1:4222`
        url: String,
    },
}

/// Settings for the configuration host.
#[derive(Debug, Clone, Deserialize)]
pub struct HostSettings {
    /// Directory holding the configuration resources.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Wildcard pattern resource file names must match.
    #[serde(default = "default_search_pattern")]
    pub search_pattern: String,

    /// Address the HTTP endpoint binds to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Whether to watch the root for changes.
    #[serde(default = "default_true")]
    pub watch: bool,

    /// Debounce window for file change bursts, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Pub/sub backend used to announce changes.
    #[serde(default)]
    pub pubsub: PubSubSettings,
}

fn default_root() -> PathBuf {
    PathBuf::from("config")
}

fn default_search_pattern() -> String {
    "*.json".to_string()
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            root: default_root(),
            search_pattern: default_search_pattern(),
            bind: default_bind(),
            watch: default_true(),
            debounce_ms: default_debounce_ms(),
            pubsub: PubSubSettings::default(),
        }
    }
}

impl HostSettings {
    /// Load settings from an optional file and `REMOTE_CONFIG_*` environment variables.
    ///
    /// The file format is detected from its extension (YAML, TOML or JSON).
    /// Environment variables override the file, e.g. `REMOTE_CONFIG_ROOT=/etc/app`
    /// or `REMOTE_CONFIG_PUBSUB__BACKEND=redis`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is given but cannot be read, or if the
    /// merged settings do not deserialize.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    pub(crate) fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::Configuration(format!(
                    "Settings file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(prefix)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| ConfigError::Configuration(format!("Failed to load settings: {}", e)))?;

        settings.try_deserialize::<Self>().map_err(|e| {
            ConfigError::Configuration(format!("Failed to deserialize settings: {}", e))
        })
    }

    /// Debounce window as a `Duration`.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
