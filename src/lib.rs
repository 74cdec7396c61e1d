//! # hotswap-remote
//!
//! Remote configuration distribution with push-triggered, poll-backed hot reloads.
//!
//! ## Overview
//!
//! `hotswap-remote` has two halves:
//! - A **host** that enumerates configuration resources from a [`StorageProvider`],
//!   serves their bytes over HTTP, and announces changes through a [`Publisher`].
//! - A **client** whose [`RemoteConfigurationProvider`]s fetch resources over HTTP,
//!   keep a lock-free snapshot, and reload when a [`Subscriber`] delivers a
//!   notification or a polling timer fires. Consumers only see a change signal
//!   when the content hash actually changed.
//!
//! [`StorageProvider`]: host::StorageProvider
//! [`Publisher`]: pubsub::Publisher
//! [`Subscriber`]: pubsub::Subscriber
//! [`RemoteConfigurationProvider`]: client::RemoteConfigurationProvider
//!
//! ## Quick Start
//!
//! Host:
//!
//! ```rust,no_run
//! use hotswap_remote::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let broker = MemoryBroker::new();
//! let storage = Arc::new(FileStorageProvider::new("config").with_search_pattern("*.json")?);
//! let service = ConfigurationService::new(storage, Some(Arc::new(MemoryPublisher::new(broker))));
//!
//! // Announce every resource once, then announce changes as they happen.
//! service.initialize().await?;
//! service.on_change(&["test.settings.json"]).await;
//! # Ok(())
//! # }
//! ```
//!
//! Client:
//!
//! ```rust,no_run
//! use hotswap_remote::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<()> {
//! let provider = RemoteConfigurationProvider::builder()
//!     .with_service_uri("http://localhost:5000")
//!     .with_configuration_name("test.settings.json")
//!     .reload_on_change(true)
//!     .with_poll_interval(Duration::from_secs(30))
//!     .build()?;
//!
//! let config = Configuration::builder().add_remote(provider).build().await?;
//! let _handle = config.subscribe(|| println!("configuration changed"));
//!
//! println!("{:?}", config.get_string("Config.Text"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `file-watch` (default): debounced filesystem watcher feeding the host service
//! - `server` (default): axum endpoint serving resources
//! - `redis`, `nats`: pub/sub backends besides the in-process broker
//! - `cli`: the `remote-config-host` and `remote-config-watch` binaries

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod client;
pub mod core;
pub mod error;
pub mod host;
pub mod pubsub;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::client::{
        Configuration, ConfigurationBuilder, ListenerHandle, ProviderState,
        RemoteConfigurationProvider, RemoteResourceOptions,
    };
    pub use crate::core::{HashProvider, Parser, Sha256HashProvider};
    pub use crate::error::{ConfigError, Result};
    pub use crate::host::{ConfigurationService, FileStorageProvider, StorageProvider};
    pub use crate::pubsub::{
        MemoryBroker, MemoryPublisher, MemorySubscriber, Publisher, Subscriber,
    };
}
