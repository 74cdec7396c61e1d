//! Builder composing remote providers into a [`Configuration`].

use crate::client::{Configuration, RemoteConfigurationProvider};
use crate::error::{ConfigError, Result};
use crate::pubsub::Subscriber;
use std::sync::Arc;
use tracing::{info, warn};

/// Builder for constructing a [`Configuration`].
///
/// Providers are merged in the order they are added; later providers override
/// earlier ones key by key.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_remote::prelude::*;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<()> {
/// let broker = MemoryBroker::new();
///
/// let base = RemoteConfigurationProvider::builder()
///     .with_service_uri("http://localhost:5000")
///     .with_configuration_name("base.json")
///     .build()?;
/// let overrides = RemoteConfigurationProvider::builder()
///     .with_service_uri("http://localhost:5000")
///     .with_configuration_name("overrides.json")
///     .optional(true)
///     .reload_on_change(true)
///     .build()?;
///
/// let config = Configuration::builder()
///     .add_remote(base)
///     .add_remote(overrides)
///     .with_subscriber(Arc::new(MemorySubscriber::new(broker)))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ConfigurationBuilder {
    providers: Vec<RemoteConfigurationProvider>,
    subscriber: Option<Arc<dyn Subscriber>>,
}

impl ConfigurationBuilder {
    /// Create a new builder with no providers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a remote provider. Later providers take precedence.
    pub fn add_remote(mut self, provider: RemoteConfigurationProvider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Set the subscriber delivering push notifications.
    ///
    /// One subscriber connection is shared by every provider that reloads on
    /// change. Without one, those providers rely on polling alone.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    /// Load every provider and start change tracking.
    ///
    /// Waits until all initial loads have finished.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No provider was added ([`ConfigError::Argument`])
    /// - A required resource could not be loaded ([`ConfigError::Configuration`])
    ///
    /// A subscriber that fails to connect is logged and ignored.
    pub async fn build(self) -> Result<Configuration> {
        if self.providers.is_empty() {
            return Err(ConfigError::argument("at least one remote provider is required"));
        }

        for provider in &self.providers {
            provider.load().await?;
        }

        let wants_push = self
            .providers
            .iter()
            .any(|p| p.options().reloads_on_change());

        let subscriber = match self.subscriber {
            Some(subscriber) if wants_push => match subscriber.initialize().await {
                Ok(()) => Some(subscriber),
                Err(e) => {
                    warn!(
                        backend = %subscriber.name(),
                        error = %e,
                        "Subscriber unavailable, falling back to polling"
                    );
                    None
                }
            },
            _ => None,
        };

        let config = Configuration::new(self.providers, subscriber.clone());
        for provider in config.providers() {
            provider.start(subscriber.clone()).await;
        }

        info!(
            providers = config.providers().len(),
            push = subscriber.is_some(),
            "Configuration built"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_without_providers_fails() {
        let result = ConfigurationBuilder::new().build().await;
        assert!(matches!(result, Err(ConfigError::Argument(_))));
    }

    #[tokio::test]
    async fn test_required_unreachable_resource_fails_build() {
        let provider = RemoteConfigurationProvider::builder()
            .with_service_uri("http://127.0.0.1:9")
            .with_configuration_name("missing.json")
            .with_timeout(std::time::Duration::from_secs(2))
            .build()
            .unwrap();

        let result = ConfigurationBuilder::new().add_remote(provider).build().await;
        assert!(matches!(result, Err(ConfigError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_optional_unreachable_resource_yields_empty_view() {
        let provider = RemoteConfigurationProvider::builder()
            .with_service_uri("http://127.0.0.1:9")
            .with_configuration_name("missing.json")
            .with_timeout(std::time::Duration::from_secs(2))
            .optional(true)
            .build()
            .unwrap();

        let config = ConfigurationBuilder::new()
            .add_remote(provider)
            .build()
            .await
            .unwrap();
        assert!(config.values().is_empty());
        assert!(config.providers()[0].snapshot().hash().is_none());
    }
}
