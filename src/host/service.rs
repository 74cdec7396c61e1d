//! Host-side orchestration of resource enumeration, hashing and publication.

use crate::core::{ConfigurationResource, HashProvider, default_hash_provider};
use crate::error::Result;
use crate::host::StorageProvider;
use crate::pubsub::Publisher;
use bytes::Bytes;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of publishing a change set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    /// Notifications accepted by the backend.
    pub published: usize,
    /// Notifications the backend rejected.
    pub failed: usize,
}

impl PublishSummary {
    /// Total publish attempts.
    pub fn attempted(&self) -> usize {
        self.published + self.failed
    }
}

/// Announces configuration resources and their changes to remote clients.
///
/// One notification is published per resource name, with the resource name as
/// the topic and the content hash as the payload. Without a publisher every
/// operation succeeds without touching storage or the network.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_remote::host::{ConfigurationService, FileStorageProvider};
/// use hotswap_remote::pubsub::{MemoryBroker, MemoryPublisher};
/// use std::sync::Arc;
///
/// # async fn example() -> hotswap_remote::error::Result<()> {
/// let storage = Arc::new(FileStorageProvider::new("config").with_search_pattern("*.json")?);
/// let publisher = Arc::new(MemoryPublisher::new(MemoryBroker::new()));
/// let service = ConfigurationService::new(storage, Some(publisher));
///
/// service.initialize().await?;
/// service.on_change(&["app.json"]).await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConfigurationService {
    storage: Arc<dyn StorageProvider>,
    publisher: Option<Arc<dyn Publisher>>,
    hasher: Arc<dyn HashProvider>,
}

impl ConfigurationService {
    /// Create a service over `storage`, publishing through `publisher` if given.
    pub fn new(storage: Arc<dyn StorageProvider>, publisher: Option<Arc<dyn Publisher>>) -> Self {
        Self {
            storage,
            publisher,
            hasher: default_hash_provider(),
        }
    }

    /// Replace the hash provider used to build notification payloads.
    pub fn with_hash_provider(mut self, hasher: Arc<dyn HashProvider>) -> Self {
        self.hasher = hasher;
        self
    }

    /// The storage provider resources are read from.
    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.storage
    }

    /// Whether a publisher is configured.
    pub fn has_publisher(&self) -> bool {
        self.publisher.is_some()
    }

    /// Announce every current resource.
    ///
    /// There is no previous state to compare against at startup, so every
    /// listed resource is published once, unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage provider cannot enumerate its resources.
    /// Individual publish failures are logged and counted, not returned.
    pub async fn initialize(&self) -> Result<PublishSummary> {
        let paths = self.storage.list_paths().await?;
        info!(
            storage = %self.storage.name(),
            resources = paths.len(),
            "Announcing configuration resources"
        );
        Ok(self.publish_changes(&paths).await)
    }

    /// Publish one notification per changed resource name.
    ///
    /// Entry point for change sources such as the file watcher. Names are not
    /// de-duplicated and unchanged content is republished.
    pub async fn on_change<S: AsRef<str>>(&self, paths: &[S]) -> PublishSummary {
        self.publish_changes(paths).await
    }

    /// Publish one notification per resource name.
    ///
    /// Entry point for manual refreshes and batch triggers. A failure for one
    /// resource does not stop the others from being published.
    pub async fn publish_changes<S: AsRef<str>>(&self, paths: &[S]) -> PublishSummary {
        let Some(publisher) = &self.publisher else {
            debug!(count = paths.len(), "No publisher configured, skipping notifications");
            return PublishSummary::default();
        };

        let outcomes = join_all(
            paths
                .iter()
                .map(|path| self.publish_one(publisher.as_ref(), path.as_ref())),
        )
        .await;

        let published = outcomes.iter().filter(|ok| **ok).count();
        PublishSummary {
            published,
            failed: outcomes.len() - published,
        }
    }

    async fn publish_one(&self, publisher: &dyn Publisher, name: &str) -> bool {
        // The payload is only a trigger; clients re-fetch before trusting anything.
        let payload = match self.storage.get_configuration(name).await {
            Ok(content) => {
                let resource = ConfigurationResource::new(name, content, self.hasher.as_ref());
                Bytes::from(resource.hash().to_owned())
            }
            Err(e) => {
                warn!(resource = %name, error = %e, "Could not read changed resource, publishing empty trigger");
                Bytes::new()
            }
        };

        match publisher.publish(name, payload).await {
            Ok(()) => {
                debug!(resource = %name, backend = %publisher.name(), "Published change notification");
                true
            }
            Err(e) => {
                error!(resource = %name, backend = %publisher.name(), error = %e, "Failed to publish change notification");
                false
            }
        }
    }

    /// Feed change batches from a change source into [`on_change`](Self::on_change)
    /// until the channel closes or `shutdown` is cancelled.
    pub async fn watch(&self, mut changes: mpsc::Receiver<Vec<String>>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                batch = changes.recv() => match batch {
                    Some(paths) => {
                        let summary = self.on_change(&paths).await;
                        info!(
                            changed = paths.len(),
                            published = summary.published,
                            failed = summary.failed,
                            "Processed configuration changes"
                        );
                    }
                    None => break,
                },
            }
        }
        debug!("Change watch loop stopped");
    }
}
