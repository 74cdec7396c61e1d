//! In-process pub/sub backend built on tokio broadcast channels.
//!
//! Useful for single-process deployments and tests: the host and the clients
//! share one [`MemoryBroker`].

use super::{ConnectionEvent, MessageHandler, Publisher, Subscriber, log_connection_event};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Default broadcast capacity per topic.
const DEFAULT_TOPIC_CAPACITY: usize = 256;

struct BrokerInner {
    topics: DashMap<String, broadcast::Sender<Bytes>>,
    capacity: usize,
    available: AtomicBool,
}

/// A shared in-process message broker.
///
/// Cloning the broker yields another handle to the same topics.
///
/// # Examples
///
/// ```rust
/// use hotswap_remote::pubsub::{MemoryBroker, MemoryPublisher, MemorySubscriber};
///
/// let broker = MemoryBroker::new();
/// let publisher = MemoryPublisher::new(broker.clone());
/// let subscriber = MemorySubscriber::new(broker);
/// ```
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Create a broker with the default per-topic capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Create a broker with a specific per-topic capacity.
    ///
    /// Slow subscribers that fall more than `capacity` messages behind miss
    /// the oldest ones.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                topics: DashMap::new(),
                capacity: capacity.max(1),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Mark the broker reachable or unreachable.
    ///
    /// While unreachable every publish fails with [`ConfigError::Publish`].
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Whether the broker currently accepts publishes.
    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Number of topics that have been published to or subscribed on.
    pub fn topic_count(&self) -> usize {
        self.inner.topics.len()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Bytes> {
        self.inner
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .clone()
    }

    fn publish(&self, topic: &str, payload: Bytes) -> Result<usize> {
        if !self.is_available() {
            return Err(ConfigError::Publish {
                topic: topic.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }

        // No receivers is not an error: nobody is interested in this topic yet.
        let receivers = self.sender(topic).send(payload).unwrap_or(0);
        trace!(topic = %topic, receivers, "Published to memory broker");
        Ok(receivers)
    }

    fn receiver(&self, topic: &str) -> broadcast::Receiver<Bytes> {
        self.sender(topic).subscribe()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Publisher writing to a [`MemoryBroker`].
#[derive(Clone)]
pub struct MemoryPublisher {
    broker: MemoryBroker,
}

impl MemoryPublisher {
    /// Create a publisher for `broker`.
    pub fn new(broker: MemoryBroker) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.broker.publish(topic, payload).map(|_| ())
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}

/// Subscriber reading from a [`MemoryBroker`].
///
/// Each subscribed topic is served by one background task that invokes the
/// handler once per message.
pub struct MemorySubscriber {
    broker: MemoryBroker,
    initialized: AtomicBool,
    tasks: DashMap<String, JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl MemorySubscriber {
    /// Create a subscriber for `broker`.
    pub fn new(broker: MemoryBroker) -> Self {
        Self {
            broker,
            initialized: AtomicBool::new(false),
            tasks: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Number of topics with an active handler.
    pub fn subscription_count(&self) -> usize {
        self.tasks.len()
    }
}

#[async_trait]
impl Subscriber for MemorySubscriber {
    async fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        log_connection_event(&self.name(), &ConnectionEvent::Connected);
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(ConfigError::SubscriberConnection(
                "memory subscriber used before initialize()".to_string(),
            ));
        }
        if self.shutdown.is_cancelled() {
            return Err(ConfigError::SubscriberConnection(
                "memory subscriber has been shut down".to_string(),
            ));
        }

        let mut rx = self.broker.receiver(topic);
        let token = self.shutdown.clone();
        let topic_name = topic.to_string();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(payload) => handler(&topic_name, payload),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(topic = %topic_name, missed, "Subscriber lagged, notifications dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!(topic = %topic_name, "Memory subscription ended");
        });

        if let Some(previous) = self.tasks.insert(topic.to_string(), task) {
            previous.abort();
        }
        debug!(topic = %topic, "Subscribed on memory broker");
        Ok(())
    }

    async fn shutdown(&self) {
        self.shutdown.cancel();
        let topics: Vec<String> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        for topic in topics {
            if let Some((_, task)) = self.tasks.remove(&topic) {
                task.abort();
            }
        }
        if self.initialized.swap(false, Ordering::SeqCst) {
            log_connection_event(&self.name(), &ConnectionEvent::Closed);
        }
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}

impl Drop for MemorySubscriber {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn recording_handler() -> (MessageHandler, Arc<Mutex<Vec<(String, Bytes)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: MessageHandler = Arc::new(move |topic: &str, payload: Bytes| {
            sink.lock().unwrap().push((topic.to_string(), payload));
        });
        (handler, seen)
    }

    async fn wait_for(seen: &Arc<Mutex<Vec<(String, Bytes)>>>, count: usize) {
        for _ in 0..100 {
            if seen.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let broker = MemoryBroker::new();
        let publisher = MemoryPublisher::new(broker.clone());
        let subscriber = MemorySubscriber::new(broker);
        subscriber.initialize().await.unwrap();

        let (handler, seen) = recording_handler();
        subscriber.subscribe("app.json", handler).await.unwrap();

        publisher
            .publish("app.json", Bytes::from_static(b"hash-1"))
            .await
            .unwrap();
        wait_for(&seen, 1).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "app.json");
        assert_eq!(seen[0].1, Bytes::from_static(b"hash-1"));
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let broker = MemoryBroker::new();
        let publisher = MemoryPublisher::new(broker.clone());
        let subscriber = MemorySubscriber::new(broker);
        subscriber.initialize().await.unwrap();

        let (handler, seen) = recording_handler();
        subscriber.subscribe("a.json", handler).await.unwrap();

        publisher.publish("b.json", Bytes::new()).await.unwrap();
        publisher.publish("a.json", Bytes::new()).await.unwrap();
        wait_for(&seen, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "a.json");
    }

    #[tokio::test]
    async fn test_subscribe_requires_initialize() {
        let subscriber = MemorySubscriber::new(MemoryBroker::new());
        let (handler, _) = recording_handler();
        let result = subscriber.subscribe("a.json", handler).await;
        assert!(matches!(result, Err(ConfigError::SubscriberConnection(_))));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let subscriber = MemorySubscriber::new(MemoryBroker::new());
        subscriber.initialize().await.unwrap();
        subscriber.initialize().await.unwrap();
    }

    #[tokio::test]
    async fn test_unavailable_broker_fails_publish() {
        let broker = MemoryBroker::new();
        let publisher = MemoryPublisher::new(broker.clone());

        broker.set_available(false);
        let result = publisher.publish("a.json", Bytes::new()).await;
        assert!(matches!(result, Err(ConfigError::Publish { .. })));

        broker.set_available(true);
        assert!(publisher.publish("a.json", Bytes::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_stops_delivery() {
        let broker = MemoryBroker::new();
        let publisher = MemoryPublisher::new(broker.clone());
        let subscriber = MemorySubscriber::new(broker);
        subscriber.initialize().await.unwrap();

        let (handler, seen) = recording_handler();
        subscriber.subscribe("a.json", handler).await.unwrap();
        assert_eq!(subscriber.subscription_count(), 1);

        subscriber.shutdown().await;
        assert_eq!(subscriber.subscription_count(), 0);

        publisher.publish("a.json", Bytes::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(seen.lock().unwrap().is_empty());
    }
}
