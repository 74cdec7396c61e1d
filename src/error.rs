//! Error types for hotswap-remote.

/// Result type alias for hotswap-remote operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while distributing or consuming remote configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required resource could not be loaded while building configuration.
    ///
    /// This is fatal: the build is aborted.
    #[error("Failed to load required configuration: {0}")]
    Configuration(String),

    /// Fetching a resource failed after the initial load.
    ///
    /// The previous snapshot is retained and the fetch is retried on the next trigger.
    #[error("Transient fetch failure for '{name}': {reason}")]
    TransientFetch {
        /// Name of the resource being fetched
        name: String,
        /// What went wrong
        reason: String,
    },

    /// The pub/sub backend rejected or could not deliver a notification.
    #[error("Failed to publish to topic '{topic}': {reason}")]
    Publish {
        /// Topic the notification was addressed to
        topic: String,
        /// What went wrong
        reason: String,
    },

    /// The subscriber connection could not be established or was lost.
    #[error("Subscriber connection error: {0}")]
    SubscriberConnection(String),

    /// A required construction parameter was missing or empty.
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// The requested resource does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Failed to parse resource bytes into a key/value layer.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// An HTTP request could not be completed or returned a non-success status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// File watching is not supported or failed to initialize.
    #[error("File watching error: {0}")]
    Watch(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases.
    #[error("Configuration error: {0}")]
    Other(String),
}

impl ConfigError {
    /// Returns `true` for steady-state failures that are recovered by retrying
    /// on the next trigger rather than surfaced to callers.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientFetch { .. } | Self::Publish { .. } | Self::SubscriberConnection(_)
        )
    }

    pub(crate) fn argument(msg: impl Into<String>) -> Self {
        Self::Argument(msg.into())
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for ConfigError {
    fn from(err: reqwest::Error) -> Self {
        ConfigError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let err = ConfigError::TransientFetch {
            name: "app.json".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.is_transient());

        let err = ConfigError::Publish {
            topic: "app.json".to_string(),
            reason: "broker down".to_string(),
        };
        assert!(err.is_transient());

        assert!(!ConfigError::Configuration("missing".to_string()).is_transient());
        assert!(!ConfigError::argument("empty name").is_transient());
    }

    #[test]
    fn test_display() {
        let err = ConfigError::NotFound("missing.json".to_string());
        assert_eq!(err.to_string(), "Resource not found: missing.json");
    }
}
