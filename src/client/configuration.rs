//! The merged configuration view handed to consumers.

use crate::client::{ChangeListeners, ConfigurationBuilder, ListenerHandle, RemoteConfigurationProvider};
use crate::core::{Snapshot, lookup, merge_layers};
use crate::error::{ConfigError, Result};
use crate::pubsub::Subscriber;
use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

type ValueMap = HashMap<String, config::Value>;

struct ConfigurationInner {
    providers: Vec<RemoteConfigurationProvider>,
    merged: ArcSwap<ValueMap>,
    listeners: ChangeListeners,
    subscriber: Option<Arc<dyn Subscriber>>,
    /// Serializes recomposition so an older merge never overwrites a newer one.
    compose_lock: Mutex<()>,
    provider_handles: Mutex<Vec<ListenerHandle>>,
}

impl ConfigurationInner {
    fn compose(&self) {
        let _guard = self.compose_lock.lock().unwrap_or_else(|e| e.into_inner());
        let snapshots: Vec<Arc<Snapshot>> =
            self.providers.iter().map(|p| p.snapshot()).collect();
        let merged = merge_layers(snapshots.iter().map(|s| s.layer()));
        self.merged.store(Arc::new(merged));
    }

    fn on_provider_changed(&self) {
        self.compose();
        debug!("Configuration view recomposed");
        self.listeners.notify_all();
    }
}

impl Drop for ConfigurationInner {
    fn drop(&mut self) {
        for provider in &self.providers {
            provider.cancel();
        }
    }
}

/// Lock-free view over one or more remote resources, merged in registration order.
///
/// The handle is cheap to clone; clones share the same view. Whenever any
/// provider commits a changed snapshot the merged view is rebuilt and swapped
/// atomically, then change listeners run.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_remote::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let provider = RemoteConfigurationProvider::builder()
///     .with_service_uri("http://localhost:5000")
///     .with_configuration_name("test.settings.json")
///     .reload_on_change(true)
///     .build()?;
///
/// let config = Configuration::builder().add_remote(provider).build().await?;
///
/// let text: String = config.get("Config.Text")?;
/// println!("Config.Text = {}", text);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Configuration {
    inner: Arc<ConfigurationInner>,
}

impl Configuration {
    /// Create a new builder.
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    /// Compose the initial view and follow provider changes from now on.
    pub(crate) fn new(
        providers: Vec<RemoteConfigurationProvider>,
        subscriber: Option<Arc<dyn Subscriber>>,
    ) -> Self {
        let inner = Arc::new(ConfigurationInner {
            providers,
            merged: ArcSwap::from_pointee(HashMap::new()),
            listeners: ChangeListeners::new(),
            subscriber,
            compose_lock: Mutex::new(()),
            provider_handles: Mutex::new(Vec::new()),
        });

        // Weak references keep providers from holding the view alive.
        let handles: Vec<ListenerHandle> = inner
            .providers
            .iter()
            .map(|provider| {
                let weak: Weak<ConfigurationInner> = Arc::downgrade(&inner);
                provider.subscribe(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_provider_changed();
                    }
                })
            })
            .collect();
        *inner
            .provider_handles
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = handles;

        inner.compose();
        Self { inner }
    }

    /// The merged key/value tree. Lock-free.
    pub fn values(&self) -> Arc<HashMap<String, config::Value>> {
        self.inner.merged.load_full()
    }

    /// Deserialize the value at a dot-separated key path (`Config.Text`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the key is absent, or
    /// [`ConfigError::Parse`] if the value does not deserialize into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let merged = self.inner.merged.load();
        let value = lookup(&merged, key)
            .ok_or_else(|| ConfigError::NotFound(format!("configuration key '{}'", key)))?;
        Ok(value.clone().try_deserialize::<T>()?)
    }

    /// The value at `key` as a string, if present and representable as one.
    pub fn get_string(&self, key: &str) -> Option<String> {
        let merged = self.inner.merged.load();
        lookup(&merged, key).and_then(|value| value.clone().into_string().ok())
    }

    /// Deserialize the whole merged view into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the view does not match `T`.
    pub fn try_deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        let merged = self.inner.merged.load_full();
        let root = config::Value::new(None, config::ValueKind::Table((*merged).clone()));
        Ok(root.try_deserialize::<T>()?)
    }

    /// Register a callback invoked after the merged view changes.
    pub fn subscribe<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(callback)
    }

    /// Reload every provider through the same gated path push and poll use.
    ///
    /// Returns `Ok(true)` if any provider committed a changed snapshot.
    ///
    /// # Errors
    ///
    /// Every provider is tried; the first failure is returned. Providers that
    /// failed keep their previous snapshot.
    pub async fn reload(&self) -> Result<bool> {
        let results =
            futures::future::join_all(self.inner.providers.iter().map(|p| p.reload())).await;

        let mut changed = false;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(c) => changed |= c,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(changed),
        }
    }

    /// The providers behind this view, in registration order.
    pub fn providers(&self) -> &[RemoteConfigurationProvider] {
        &self.inner.providers
    }

    /// Stop every reload worker and release the subscriber connection.
    pub async fn shutdown(&self) {
        for provider in &self.inner.providers {
            provider.shutdown().await;
        }
        if let Some(subscriber) = &self.inner.subscriber {
            subscriber.shutdown().await;
        }
        debug!("Configuration shut down");
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("providers", &self.inner.providers.len())
            .field("keys", &self.inner.merged.load().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn provider(name: &str) -> RemoteConfigurationProvider {
        RemoteConfigurationProvider::builder()
            .with_service_uri("http://localhost:5000")
            .with_configuration_name(name)
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_view_before_load() {
        let config = Configuration::new(vec![provider("a.json")], None);
        assert!(config.values().is_empty());
        assert!(config.get_string("Config.Text").is_none());
        assert!(matches!(
            config.get::<String>("Config.Text"),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_debug_output() {
        let config = Configuration::new(vec![provider("a.json"), provider("b.json")], None);
        let debug = format!("{:?}", config);
        assert!(debug.contains("providers: 2"));
    }

    #[test]
    fn test_try_deserialize_empty_into_defaults() {
        #[derive(Debug, Deserialize, Default)]
        struct Settings {
            #[serde(default)]
            name: Option<String>,
        }

        let config = Configuration::new(vec![provider("a.json")], None);
        let settings: Settings = config.try_deserialize().unwrap();
        assert!(settings.name.is_none());
    }
}
