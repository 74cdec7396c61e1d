//! Host side: enumerate resources, serve them, and announce their changes.

mod service;
mod settings;
mod storage;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "file-watch")]
mod watcher;

pub use service::{ConfigurationService, PublishSummary};
pub use settings::{HostSettings, PubSubSettings};
pub use storage::{FileStorageProvider, StorageProvider};

#[cfg(feature = "file-watch")]
pub use watcher::ResourceWatcher;
