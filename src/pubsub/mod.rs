//! Publish/subscribe abstractions and backends.
//!
//! The host pushes change notifications through a [`Publisher`]; remote clients
//! receive them through a [`Subscriber`]. Topics are resource names and payloads
//! are opaque triggers: a subscriber never trusts the payload as content, it
//! re-fetches the resource over HTTP instead.
//!
//! Delivery is at-least-once at best. Reconnecting never replays messages that
//! were missed while disconnected, so clients keep a polling backstop.

pub mod memory;

#[cfg(feature = "nats")]
pub mod nats;

#[cfg(feature = "redis")]
pub mod redis;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{error, info, warn};

pub use memory::{MemoryBroker, MemoryPublisher, MemorySubscriber};

/// Callback invoked once per inbound message with the topic and raw payload.
///
/// Handlers must be idempotent since delivery may repeat.
pub type MessageHandler = Arc<dyn Fn(&str, Bytes) + Send + Sync>;

/// Sends notifications to a pub/sub backend.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Publish`](crate::error::ConfigError::Publish) if the
    /// backend is unreachable.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;

    /// Human-readable backend name for logging.
    fn name(&self) -> String;
}

/// Receives notifications from a pub/sub backend over one long-lived connection.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Open the connection and wire connection-lifecycle logging.
    ///
    /// Calling this more than once is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SubscriberConnection`](crate::error::ConfigError::SubscriberConnection)
    /// if the connection cannot be established.
    async fn initialize(&self) -> Result<()>;

    /// Register `handler` for `topic`. Registering a topic twice replaces the handler.
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<()>;

    /// Release the connection and stop delivering messages.
    async fn shutdown(&self);

    /// Human-readable backend name for logging.
    fn name(&self) -> String;
}

/// Connection-lifecycle events reported by subscriber backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The initial connection was established.
    Connected,
    /// The connection was lost; the backend will try to reconnect.
    Disconnected,
    /// The connection was re-established after a loss.
    Reconnected,
    /// The connection was closed for good.
    Closed,
    /// The backend reported an error.
    Error(String),
}

/// Log a connection-lifecycle event.
///
/// Hooks only observe: they never touch subscription state.
pub fn log_connection_event(backend: &str, event: &ConnectionEvent) {
    match event {
        ConnectionEvent::Connected => info!(backend = %backend, "Subscriber connected"),
        ConnectionEvent::Reconnected => info!(backend = %backend, "Subscriber reconnected"),
        ConnectionEvent::Disconnected => {
            warn!(backend = %backend, "Subscriber disconnected, waiting for reconnect")
        }
        ConnectionEvent::Closed => info!(backend = %backend, "Subscriber connection closed"),
        ConnectionEvent::Error(reason) => {
            error!(backend = %backend, error = %reason, "Subscriber connection error")
        }
    }
}
