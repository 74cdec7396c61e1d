//! Remote configuration provider: fetch, cache and reload one resource over HTTP.

use crate::client::{ChangeListeners, ListenerHandle, RemoteResourceOptions};
use crate::core::{HashProvider, Layer, Parser, Snapshot, default_hash_provider};
use crate::error::{ConfigError, Result};
use crate::pubsub::{MessageHandler, Subscriber};
use arc_swap::ArcSwap;
use bytes::Bytes;
use reqwest::{Client, Url};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of a remote resource.
///
/// `Unloaded → Loading → Loaded → (Reloading → Loaded)*`, or `Loading → Failed`
/// when a required resource cannot be fetched initially.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProviderState {
    /// Nothing fetched yet.
    Unloaded = 0,
    /// Initial fetch in progress.
    Loading = 1,
    /// A snapshot is active.
    Loaded = 2,
    /// A reload is in progress; the previous snapshot stays active.
    Reloading = 3,
    /// The initial fetch of a required resource failed.
    Failed = 4,
}

impl ProviderState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loading,
            2 => Self::Loaded,
            3 => Self::Reloading,
            4 => Self::Failed,
            _ => Self::Unloaded,
        }
    }
}

struct ProviderInner {
    url: Url,
    client: Client,
    options: RemoteResourceOptions,
    hasher: Arc<dyn HashProvider>,
    poll_interval: Duration,
    snapshot: ArcSwap<Snapshot>,
    state: AtomicU8,
    /// Reloads currently running. The state returns to `Loaded` when the last one finishes.
    in_flight: std::sync::Mutex<usize>,
    /// Sequence number handed to each fetch.
    next_version: AtomicU64,
    /// Sequence number of the newest fetch that reached the commit step.
    committed: Mutex<u64>,
    listeners: ChangeListeners,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

/// Fetches one configuration resource from `{service_uri}/{name}` and keeps a
/// reloadable snapshot of it.
///
/// The active snapshot is held in an `ArcSwap`, so readers never block and never
/// see a partially replaced snapshot. Reloads triggered by push notifications,
/// by the polling backstop, or manually all go through [`reload`](Self::reload),
/// which discards results that were overtaken by a newer fetch and only signals
/// listeners when the content hash actually changed.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_remote::client::RemoteConfigurationProvider;
/// use std::time::Duration;
///
/// # async fn example() -> hotswap_remote::error::Result<()> {
/// let provider = RemoteConfigurationProvider::builder()
///     .with_service_uri("http://config.internal:5000")
///     .with_configuration_name("appsettings.json")
///     .reload_on_change(true)
///     .with_poll_interval(Duration::from_secs(30))
///     .build()?;
///
/// provider.load().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RemoteConfigurationProvider {
    inner: Arc<ProviderInner>,
}

impl RemoteConfigurationProvider {
    /// Create a new builder.
    pub fn builder() -> RemoteConfigurationProviderBuilder {
        RemoteConfigurationProviderBuilder::new()
    }

    /// The resource options.
    pub fn options(&self) -> &RemoteResourceOptions {
        &self.inner.options
    }

    /// The resource URL.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProviderState {
        ProviderState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ProviderState) {
        self.inner.state.store(state as u8, Ordering::SeqCst);
    }

    /// The active snapshot. Lock-free.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot.load_full()
    }

    /// Register a callback invoked whenever a changed snapshot is committed.
    pub fn subscribe<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(callback)
    }

    /// Perform the initial load.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Configuration`] if the resource is required and
    /// cannot be fetched or parsed. An optional resource that fails to load
    /// yields an empty layer instead.
    pub async fn load(&self) -> Result<()> {
        let name = self.inner.options.configuration_name();
        self.set_state(ProviderState::Loading);
        let version = self.inner.next_version.fetch_add(1, Ordering::SeqCst) + 1;

        let loaded = match self.fetch().await {
            Ok(content) => {
                let hash = self.inner.hasher.hash(&content);
                self.inner
                    .options
                    .parser()
                    .parse_layer(name, &content)
                    .map(|layer| (layer, hash))
            }
            Err(e) => Err(e),
        };

        let mut committed = self.inner.committed.lock().await;
        match loaded {
            Ok((layer, hash)) => {
                self.inner
                    .snapshot
                    .store(Arc::new(Snapshot::new(layer, Some(hash), version)));
                *committed = version;
                self.set_state(ProviderState::Loaded);
                info!(resource = %name, url = %self.inner.url, "Loaded remote configuration");
                Ok(())
            }
            Err(e) if self.inner.options.is_optional() => {
                self.inner
                    .snapshot
                    .store(Arc::new(Snapshot::new(Layer::empty(name), None, version)));
                *committed = version;
                self.set_state(ProviderState::Loaded);
                warn!(resource = %name, error = %e, "Optional remote configuration unavailable, using empty layer");
                Ok(())
            }
            Err(e) => {
                self.set_state(ProviderState::Failed);
                Err(ConfigError::Configuration(format!(
                    "Required resource '{}' could not be loaded from {}: {}",
                    name, self.inner.url, e
                )))
            }
        }
    }

    /// Re-fetch the resource and replace the snapshot if its content changed.
    ///
    /// Returns `Ok(true)` if a new snapshot was committed and listeners were
    /// notified, `Ok(false)` if the content was unchanged or the result was
    /// overtaken by a newer fetch.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TransientFetch`] if the fetch or parse failed.
    /// The previous snapshot stays active in that case.
    pub async fn reload(&self) -> Result<bool> {
        let name = self.inner.options.configuration_name();
        match self.state() {
            ProviderState::Loaded | ProviderState::Reloading => {}
            state => {
                return Err(ConfigError::Other(format!(
                    "Cannot reload '{}' in state {:?}",
                    name, state
                )));
            }
        }

        let in_flight = ReloadGuard::enter(&self.inner);
        let version = self.inner.next_version.fetch_add(1, Ordering::SeqCst) + 1;
        let fetched = self.fetch().await;

        let mut committed = self.inner.committed.lock().await;
        let outcome = self.commit(&mut committed, version, fetched);
        drop(committed);
        drop(in_flight);

        match outcome {
            Ok(true) => {
                info!(resource = %name, version, "Remote configuration changed");
                self.inner.listeners.notify_all();
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                warn!(resource = %name, error = %e, "Reload failed, keeping previous configuration");
                Err(ConfigError::TransientFetch {
                    name: name.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Commit a fetch result while holding the commit lock.
    fn commit(&self, committed: &mut u64, version: u64, fetched: Result<Bytes>) -> Result<bool> {
        let name = self.inner.options.configuration_name();
        if version < *committed {
            debug!(resource = %name, version, newest = *committed, "Discarding superseded reload");
            return Ok(false);
        }

        let content = fetched?;
        let hash = self.inner.hasher.hash(&content);
        if self.inner.snapshot.load().hash() == Some(hash.as_str()) {
            *committed = version;
            debug!(resource = %name, "Remote configuration unchanged");
            return Ok(false);
        }

        let layer = self.inner.options.parser().parse_layer(name, &content)?;
        self.inner
            .snapshot
            .store(Arc::new(Snapshot::new(layer, Some(hash), version)));
        *committed = version;
        Ok(true)
    }

    async fn fetch(&self) -> Result<Bytes> {
        let response = self.inner.client.get(self.inner.url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::Http(format!(
                "GET {} returned {}",
                self.inner.url, status
            )));
        }

        Ok(response.bytes().await?)
    }

    /// Start reacting to changes if `reload_on_change` is set.
    ///
    /// Registers a push subscription on `subscriber` (if given) and starts a
    /// background worker that reloads on every push notification and on every
    /// poll tick. Triggers arriving while a reload is running are coalesced into
    /// one follow-up reload. Calling this more than once is a no-op.
    pub async fn start(&self, subscriber: Option<Arc<dyn Subscriber>>) {
        if !self.inner.options.reloads_on_change() {
            return;
        }

        let mut worker = self.inner.worker.lock().await;
        if worker.is_some() {
            return;
        }

        let name = self.inner.options.configuration_name().to_string();
        let (trigger_tx, trigger_rx) = mpsc::channel::<()>(1);

        if let Some(subscriber) = subscriber {
            let handler: MessageHandler = Arc::new(move |topic: &str, _payload: Bytes| {
                debug!(topic = %topic, "Change notification received");
                // A full channel already has a reload queued.
                let _ = trigger_tx.try_send(());
            });
            if let Err(e) = subscriber.subscribe(&name, handler).await {
                warn!(resource = %name, error = %e, "Push subscription failed, relying on polling");
            }
        }

        *worker = Some(tokio::spawn(self.clone().run(trigger_rx)));
    }

    async fn run(self, mut triggers: mpsc::Receiver<()>) {
        let period = self.inner.poll_interval;
        let mut poll = tokio::time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut push_open = true;

        loop {
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                _ = poll.tick() => {}
                trigger = triggers.recv(), if push_open => {
                    if trigger.is_none() {
                        // No push handler left; keep polling.
                        push_open = false;
                        continue;
                    }
                }
            }
            // Errors are already logged by reload().
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                _ = self.reload() => {}
            }
        }
        debug!(resource = %self.inner.options.configuration_name(), "Reload worker stopped");
    }

    /// Stop the background worker.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let worker = self.inner.worker.lock().await.take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }

    pub(crate) fn cancel(&self) {
        self.inner.shutdown.cancel();
    }
}

/// Builder for constructing a [`RemoteConfigurationProvider`].
pub struct RemoteConfigurationProviderBuilder {
    service_uri: Option<String>,
    configuration_name: Option<String>,
    optional: bool,
    reload_on_change: bool,
    parser: Option<Arc<dyn Parser>>,
    hasher: Arc<dyn HashProvider>,
    poll_interval: Duration,
    timeout: Duration,
}

impl RemoteConfigurationProviderBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            service_uri: None,
            configuration_name: None,
            optional: false,
            reload_on_change: false,
            parser: None,
            hasher: default_hash_provider(),
            poll_interval: Duration::from_secs(60),
            timeout: Duration::from_secs(10),
        }
    }

    /// Set the base URI of the configuration service.
    pub fn with_service_uri(mut self, uri: impl Into<String>) -> Self {
        self.service_uri = Some(uri.into());
        self
    }

    /// Set the resource name to fetch.
    pub fn with_configuration_name(mut self, name: impl Into<String>) -> Self {
        self.configuration_name = Some(name.into());
        self
    }

    /// Take name, optionality, reload and parser settings from `options`.
    pub fn with_options(mut self, options: RemoteResourceOptions) -> Self {
        self.configuration_name = Some(options.configuration_name().to_string());
        self.optional = options.is_optional();
        self.reload_on_change = options.reloads_on_change();
        self.parser = Some(Arc::clone(options.parser()));
        self
    }

    /// Treat a failed initial load as an empty layer instead of an error.
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Reload on push notifications and on the polling interval.
    pub fn reload_on_change(mut self, reload_on_change: bool) -> Self {
        self.reload_on_change = reload_on_change;
        self
    }

    /// Set the parser. Default is JSON.
    pub fn with_parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Set the hash provider used for change detection.
    pub fn with_hash_provider(mut self, hasher: Arc<dyn HashProvider>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Set the polling interval used as the push backstop.
    ///
    /// Default is 60 seconds.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the request timeout.
    ///
    /// Default is 10 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the provider. No request is made until [`RemoteConfigurationProvider::load`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Argument`] if:
    /// - No service URI is provided, or it is not an absolute URL
    /// - No configuration name is provided, or it is blank
    /// - The polling interval is zero
    pub fn build(self) -> Result<RemoteConfigurationProvider> {
        let service_uri = self
            .service_uri
            .filter(|uri| !uri.trim().is_empty())
            .ok_or_else(|| ConfigError::argument("service URI is required"))?;

        let mut options = RemoteResourceOptions::new(self.configuration_name.unwrap_or_default())?
            .optional(self.optional)
            .reload_on_change(self.reload_on_change);
        if let Some(parser) = self.parser {
            options = options.with_parser(parser);
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::argument("poll interval must be greater than zero"));
        }

        let url = resource_url(&service_uri, options.configuration_name())?;

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ConfigError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(RemoteConfigurationProvider {
            inner: Arc::new(ProviderInner {
                url,
                client,
                options,
                hasher: self.hasher,
                poll_interval: self.poll_interval,
                snapshot: ArcSwap::from_pointee(Snapshot::new(Layer::default(), None, 0)),
                state: AtomicU8::new(ProviderState::Unloaded as u8),
                in_flight: std::sync::Mutex::new(0),
                next_version: AtomicU64::new(0),
                committed: Mutex::new(0),
                listeners: ChangeListeners::new(),
                worker: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        })
    }
}

impl Default for RemoteConfigurationProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks one reload as running for as long as it lives.
///
/// Dropping the guard also covers reloads abandoned mid-fetch by shutdown.
struct ReloadGuard<'a> {
    inner: &'a ProviderInner,
}

impl<'a> ReloadGuard<'a> {
    fn enter(inner: &'a ProviderInner) -> Self {
        let mut running = inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        *running += 1;
        inner
            .state
            .store(ProviderState::Reloading as u8, Ordering::SeqCst);
        drop(running);
        Self { inner }
    }
}

impl Drop for ReloadGuard<'_> {
    fn drop(&mut self) {
        let mut running = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        *running = running.saturating_sub(1);
        if *running == 0 {
            self.inner
                .state
                .store(ProviderState::Loaded as u8, Ordering::SeqCst);
        }
    }
}

/// Join the service URI and resource name into `{service_uri}/{name}`.
fn resource_url(service_uri: &str, name: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        service_uri.trim_end_matches('/'),
        name.trim_start_matches('/')
    );
    let url = Url::parse(&joined)
        .map_err(|e| ConfigError::argument(format!("invalid service URI '{}': {}", service_uri, e)))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::argument(format!(
            "service URI '{}' must be an absolute http(s) URL",
            service_uri
        )));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_url_joins_segments() {
        let url = resource_url("http://localhost:5000/", "/test.settings.json").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/test.settings.json");

        let url = resource_url("https://config.example.com/api", "nested/app.json").unwrap();
        assert_eq!(url.as_str(), "https://config.example.com/api/nested/app.json");
    }

    #[test]
    fn test_resource_url_rejects_non_http() {
        assert!(resource_url("localhost:5000", "a.json").is_err());
        assert!(resource_url("not a url", "a.json").is_err());
        assert!(resource_url("ftp://example.com", "a.json").is_err());
    }

    #[test]
    fn test_builder_requires_service_uri() {
        let result = RemoteConfigurationProvider::builder()
            .with_configuration_name("a.json")
            .build();
        assert!(matches!(result, Err(ConfigError::Argument(_))));
    }

    #[test]
    fn test_builder_requires_configuration_name() {
        let result = RemoteConfigurationProvider::builder()
            .with_service_uri("http://localhost:5000")
            .build();
        assert!(matches!(result, Err(ConfigError::Argument(_))));

        let result = RemoteConfigurationProvider::builder()
            .with_service_uri("http://localhost:5000")
            .with_configuration_name("  ")
            .build();
        assert!(matches!(result, Err(ConfigError::Argument(_))));
    }

    #[test]
    fn test_builder_rejects_zero_poll_interval() {
        let result = RemoteConfigurationProvider::builder()
            .with_service_uri("http://localhost:5000")
            .with_configuration_name("a.json")
            .with_poll_interval(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(ConfigError::Argument(_))));
    }

    #[test]
    fn test_builder_defaults() {
        let provider = RemoteConfigurationProvider::builder()
            .with_service_uri("http://localhost:5000")
            .with_configuration_name("a.json")
            .build()
            .unwrap();

        assert_eq!(provider.state(), ProviderState::Unloaded);
        assert!(!provider.options().is_optional());
        assert!(!provider.options().reloads_on_change());
        assert!(provider.snapshot().hash().is_none());
        assert_eq!(provider.url().as_str(), "http://localhost:5000/a.json");
    }

    #[test]
    fn test_builder_with_options() {
        let options = RemoteResourceOptions::new("b.yaml")
            .unwrap()
            .optional(true)
            .reload_on_change(true);
        let provider = RemoteConfigurationProvider::builder()
            .with_service_uri("http://localhost:5000")
            .with_options(options)
            .build()
            .unwrap();

        assert_eq!(provider.options().configuration_name(), "b.yaml");
        assert!(provider.options().is_optional());
        assert!(provider.options().reloads_on_change());
    }

    #[tokio::test]
    async fn test_reload_before_load_is_rejected() {
        let provider = RemoteConfigurationProvider::builder()
            .with_service_uri("http://localhost:5000")
            .with_configuration_name("a.json")
            .build()
            .unwrap();

        assert!(provider.reload().await.is_err());
    }

    #[tokio::test]
    async fn test_state_stays_reloading_while_another_reload_runs() {
        let provider = RemoteConfigurationProvider::builder()
            .with_service_uri("http://127.0.0.1:9")
            .with_configuration_name("a.json")
            .optional(true)
            .build()
            .unwrap();
        provider.load().await.unwrap();
        assert_eq!(provider.state(), ProviderState::Loaded);

        // A slow reload still waiting on its fetch.
        let slow = ReloadGuard::enter(&provider.inner);
        assert_eq!(provider.state(), ProviderState::Reloading);

        // A faster overlapping reload finishes first.
        assert!(provider.reload().await.is_err());
        assert_eq!(provider.state(), ProviderState::Reloading);

        drop(slow);
        assert_eq!(provider.state(), ProviderState::Loaded);
    }

    #[tokio::test]
    async fn test_abandoned_reload_returns_to_loaded() {
        let provider = RemoteConfigurationProvider::builder()
            .with_service_uri("http://127.0.0.1:9")
            .with_configuration_name("a.json")
            .optional(true)
            .build()
            .unwrap();
        provider.load().await.unwrap();

        let mut reload = Box::pin(provider.reload());
        // Poll once so the reload is in flight, then abandon it.
        let _ = futures::poll!(reload.as_mut());
        drop(reload);

        assert_eq!(provider.state(), ProviderState::Loaded);
    }

    #[test]
    fn test_commit_discards_superseded_fetch() {
        let provider = RemoteConfigurationProvider::builder()
            .with_service_uri("http://localhost:5000")
            .with_configuration_name("a.json")
            .build()
            .unwrap();

        let mut committed = 0;
        let newer = Ok(Bytes::from_static(br#"{"Text":"newer"}"#));
        assert!(provider.commit(&mut committed, 2, newer).unwrap());
        assert_eq!(committed, 2);

        let older = Ok(Bytes::from_static(br#"{"Text":"older"}"#));
        assert!(!provider.commit(&mut committed, 1, older).unwrap());
        assert_eq!(committed, 2);

        let text = provider.snapshot().layer().get("Text").unwrap().clone();
        assert_eq!(text.into_string().unwrap(), "newer");
        assert_eq!(provider.snapshot().version(), 2);
    }

    #[test]
    fn test_commit_ignores_identical_content() {
        let provider = RemoteConfigurationProvider::builder()
            .with_service_uri("http://localhost:5000")
            .with_configuration_name("a.json")
            .build()
            .unwrap();

        let mut committed = 0;
        let content = Bytes::from_static(br#"{"Text":"same"}"#);
        assert!(provider.commit(&mut committed, 1, Ok(content.clone())).unwrap());
        assert!(!provider.commit(&mut committed, 2, Ok(content)).unwrap());
        assert_eq!(provider.snapshot().version(), 1);
        assert_eq!(committed, 2);
    }

    #[test]
    fn test_commit_keeps_snapshot_on_parse_error() {
        let provider = RemoteConfigurationProvider::builder()
            .with_service_uri("http://localhost:5000")
            .with_configuration_name("a.json")
            .build()
            .unwrap();

        let mut committed = 0;
        let good = Ok(Bytes::from_static(br#"{"Text":"good"}"#));
        provider.commit(&mut committed, 1, good).unwrap();

        let bad = Ok(Bytes::from_static(b"{broken"));
        assert!(provider.commit(&mut committed, 2, bad).is_err());
        assert_eq!(provider.snapshot().version(), 1);
    }
}
