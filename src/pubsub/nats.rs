//! Subject-based pub/sub backend on NATS.
//!
//! The NATS client reconnects on its own; lifecycle events are forwarded to the
//! logging hooks through its event callback.

use super::{ConnectionEvent, MessageHandler, Publisher, Subscriber, log_connection_event};
use crate::error::{ConfigError, Result};
use async_nats::{Client, ConnectOptions, Event};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Translate a client event, remembering whether a disconnect happened so the
/// following `Connected` is reported as a reconnect.
fn translate(event: Event, disconnected: &AtomicBool) -> ConnectionEvent {
    match event {
        Event::Connected => {
            if disconnected.swap(false, Ordering::SeqCst) {
                ConnectionEvent::Reconnected
            } else {
                ConnectionEvent::Connected
            }
        }
        Event::Disconnected => {
            disconnected.store(true, Ordering::SeqCst);
            ConnectionEvent::Disconnected
        }
        Event::Closed => ConnectionEvent::Closed,
        other => ConnectionEvent::Error(format!("{:?}", other)),
    }
}

async fn connect(url: &str) -> std::result::Result<Client, async_nats::ConnectError> {
    let disconnected = Arc::new(AtomicBool::new(false));
    ConnectOptions::new()
        .event_callback(move |event| {
            let disconnected = Arc::clone(&disconnected);
            async move {
                log_connection_event("nats", &translate(event, &disconnected));
            }
        })
        .connect(url)
        .await
}

/// Publisher sending notifications to NATS subjects.
#[derive(Clone)]
pub struct NatsPublisher {
    client: Client,
}

impl NatsPublisher {
    /// Connect to the NATS server at `url` (e.g. `nats://127.0.0.1:4222`).
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = connect(url)
            .await
            .map_err(|e| ConfigError::Other(format!("Failed to connect publisher to NATS: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Publisher for NatsPublisher {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        let to_error = |reason: String| ConfigError::Publish {
            topic: topic.to_string(),
            reason,
        };

        self.client
            .publish(topic.to_string(), payload)
            .await
            .map_err(|e| to_error(e.to_string()))?;
        self.client
            .flush()
            .await
            .map_err(|e| to_error(e.to_string()))?;

        trace!(topic = %topic, "Published to NATS");
        Ok(())
    }

    fn name(&self) -> String {
        "nats".to_string()
    }
}

/// Subscriber listening on NATS subjects.
pub struct NatsSubscriber {
    url: String,
    client: RwLock<Option<Client>>,
    tasks: DashMap<String, JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl NatsSubscriber {
    /// Create a subscriber for the NATS server at `url`.
    ///
    /// No connection is made until [`Subscriber::initialize`] is called.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: RwLock::new(None),
            tasks: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Subscriber for NatsSubscriber {
    async fn initialize(&self) -> Result<()> {
        let mut client = self.client.write().await;
        if client.is_some() {
            return Ok(());
        }

        let connected = connect(&self.url).await.map_err(|e| {
            let reason = e.to_string();
            log_connection_event(&self.name(), &ConnectionEvent::Error(reason.clone()));
            ConfigError::SubscriberConnection(reason)
        })?;
        *client = Some(connected);
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<()> {
        let client = self.client.read().await.clone().ok_or_else(|| {
            ConfigError::SubscriberConnection("nats subscriber used before initialize()".to_string())
        })?;

        let mut subscription = client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| ConfigError::SubscriberConnection(e.to_string()))?;

        let token = self.shutdown.clone();
        let topic_name = topic.to_string();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    message = subscription.next() => match message {
                        Some(message) => handler(&topic_name, message.payload),
                        None => break,
                    },
                }
            }
            debug!(topic = %topic_name, "NATS subscription ended");
        });

        if let Some(previous) = self.tasks.insert(topic.to_string(), task) {
            previous.abort();
        }
        debug!(topic = %topic, "Subscribed on NATS");
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
        // Dropping the last client handle closes the connection.
        if self.client.write().await.take().is_some() {
            log_connection_event(&self.name(), &ConnectionEvent::Closed);
        }
    }

    fn name(&self) -> String {
        "nats".to_string()
    }
}

impl Drop for NatsSubscriber {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_reconnect_sequence() {
        let disconnected = AtomicBool::new(false);
        assert_eq!(translate(Event::Connected, &disconnected), ConnectionEvent::Connected);
        assert_eq!(
            translate(Event::Disconnected, &disconnected),
            ConnectionEvent::Disconnected
        );
        assert_eq!(translate(Event::Connected, &disconnected), ConnectionEvent::Reconnected);
        assert_eq!(translate(Event::Connected, &disconnected), ConnectionEvent::Connected);
        assert_eq!(translate(Event::Closed, &disconnected), ConnectionEvent::Closed);
    }

    #[tokio::test]
    async fn test_subscribe_requires_initialize() {
        let subscriber = NatsSubscriber::new("nats://127.0.0.1:4222");
        let handler: MessageHandler = Arc::new(|_: &str, _: Bytes| {});
        let result = subscriber.subscribe("a.json", handler).await;
        assert!(matches!(result, Err(ConfigError::SubscriberConnection(_))));
    }
}
