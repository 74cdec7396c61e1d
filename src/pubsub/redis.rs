//! Channel-based pub/sub backend on Redis.
//!
//! Publishing goes through a `ConnectionManager`, which reconnects on its own.
//! Redis pub/sub connections do not, so [`RedisSubscriber`] runs a reconnect
//! loop with exponential backoff and re-issues every registered subscription
//! once the connection is back.

use super::{ConnectionEvent, MessageHandler, Publisher, Subscriber, log_connection_event};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, PubSub};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

fn open_client(url: &str) -> Result<redis::Client> {
    redis::Client::open(url)
        .map_err(|e| ConfigError::argument(format!("Invalid Redis URL '{}': {}", url, e)))
}

/// Publisher sending notifications with Redis `PUBLISH`.
#[derive(Clone)]
pub struct RedisPublisher {
    connection: ConnectionManager,
}

impl RedisPublisher {
    /// Connect to the Redis server at `url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = open_client(url)?;
        let connection = ConnectionManager::new(client).await.map_err(|e| {
            ConfigError::Other(format!("Failed to connect publisher to Redis: {}", e))
        })?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        let mut connection = self.connection.clone();
        let receivers: i64 = connection
            .publish(topic, payload.as_ref())
            .await
            .map_err(|e| ConfigError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        trace!(topic = %topic, receivers, "Published to Redis");
        Ok(())
    }

    fn name(&self) -> String {
        "redis".to_string()
    }
}

/// Subscriber listening on Redis channels.
pub struct RedisSubscriber {
    client: redis::Client,
    handlers: Arc<DashMap<String, MessageHandler>>,
    commands: Mutex<Option<mpsc::UnboundedSender<String>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl RedisSubscriber {
    /// Create a subscriber for the Redis server at `url`.
    ///
    /// No connection is made until [`Subscriber::initialize`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Argument`] if the URL is invalid.
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            client: open_client(url)?,
            handlers: Arc::new(DashMap::new()),
            commands: Mutex::new(None),
            task: Mutex::new(None),
            shutdown: CancellationToken::new(),
        })
    }
}

#[async_trait]
impl Subscriber for RedisSubscriber {
    async fn initialize(&self) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        let pubsub = self.client.get_async_pubsub().await.map_err(|e| {
            let reason = e.to_string();
            log_connection_event(&self.name(), &ConnectionEvent::Error(reason.clone()));
            ConfigError::SubscriberConnection(reason)
        })?;
        log_connection_event(&self.name(), &ConnectionEvent::Connected);

        let (tx, rx) = mpsc::unbounded_channel();
        *self.commands.lock().await = Some(tx);

        let listener = Listener {
            client: self.client.clone(),
            handlers: Arc::clone(&self.handlers),
            shutdown: self.shutdown.clone(),
        };
        *task = Some(tokio::spawn(listener.run(pubsub, rx)));
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<()> {
        let commands = self.commands.lock().await;
        let sender = commands.as_ref().ok_or_else(|| {
            ConfigError::SubscriberConnection(
                "redis subscriber used before initialize()".to_string(),
            )
        })?;

        self.handlers.insert(topic.to_string(), handler);
        sender.send(topic.to_string()).map_err(|_| {
            ConfigError::SubscriberConnection("redis listener is no longer running".to_string())
        })
    }

    async fn shutdown(&self) {
        self.shutdown.cancel();
        self.commands.lock().await.take();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    fn name(&self) -> String {
        "redis".to_string()
    }
}

impl Drop for RedisSubscriber {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

enum Step {
    Stop,
    Subscribe(String),
    Deliver(redis::Msg),
    Lost,
}

/// Background task owning the pub/sub connection.
struct Listener {
    client: redis::Client,
    handlers: Arc<DashMap<String, MessageHandler>>,
    shutdown: CancellationToken,
}

impl Listener {
    async fn run(self, mut pubsub: PubSub, mut commands: mpsc::UnboundedReceiver<String>) {
        loop {
            let step = {
                let mut messages = pubsub.on_message();
                tokio::select! {
                    _ = self.shutdown.cancelled() => Step::Stop,
                    command = commands.recv() => match command {
                        Some(topic) => Step::Subscribe(topic),
                        None => Step::Stop,
                    },
                    message = messages.next() => match message {
                        Some(message) => Step::Deliver(message),
                        None => Step::Lost,
                    },
                }
            };

            match step {
                Step::Stop => break,
                Step::Subscribe(topic) => {
                    if let Err(e) = pubsub.subscribe(&topic).await {
                        log_connection_event("redis", &ConnectionEvent::Error(e.to_string()));
                        match self.reconnect().await {
                            Some(fresh) => pubsub = fresh,
                            None => break,
                        }
                    } else {
                        debug!(topic = %topic, "Subscribed on Redis");
                    }
                }
                Step::Deliver(message) => self.deliver(&message),
                Step::Lost => {
                    log_connection_event("redis", &ConnectionEvent::Disconnected);
                    match self.reconnect().await {
                        Some(fresh) => pubsub = fresh,
                        None => break,
                    }
                }
            }
        }
        log_connection_event("redis", &ConnectionEvent::Closed);
    }

    fn deliver(&self, message: &redis::Msg) {
        let topic = message.get_channel_name().to_string();
        let payload: Vec<u8> = message.get_payload().unwrap_or_default();
        let handler = self.handlers.get(&topic).map(|entry| Arc::clone(entry.value()));
        if let Some(handler) = handler {
            handler(&topic, Bytes::from(payload));
        }
    }

    /// Reconnect with exponential backoff and restore every subscription.
    ///
    /// Returns `None` if shutdown was requested while waiting.
    async fn reconnect(&self) -> Option<PubSub> {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = tokio::time::sleep(backoff) => {}
            }

            match self.resubscribe().await {
                Ok(pubsub) => {
                    log_connection_event("redis", &ConnectionEvent::Reconnected);
                    return Some(pubsub);
                }
                Err(e) => {
                    log_connection_event("redis", &ConnectionEvent::Error(e.to_string()));
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn resubscribe(&self) -> redis::RedisResult<PubSub> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        let topics: Vec<String> = self.handlers.iter().map(|entry| entry.key().clone()).collect();
        for topic in topics {
            pubsub.subscribe(&topic).await?;
        }
        Ok(pubsub)
    }
}
