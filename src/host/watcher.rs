//! File watching as a change source for the configuration service.

use crate::error::{ConfigError, Result};
use crate::host::FileStorageProvider;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, trace};

/// Watches a storage root and emits batches of changed resource names.
///
/// Uses the `notify` crate to watch the root directory recursively. Events are
/// debounced: the first change opens a window of `debounce` length, and every
/// change inside that window is emitted in the same batch. Only files matching
/// the provider's search pattern are reported, as root-relative names.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_remote::host::{FileStorageProvider, ResourceWatcher};
/// use std::time::Duration;
///
/// # async fn example() -> hotswap_remote::error::Result<()> {
/// let storage = FileStorageProvider::new("/etc/myapp").with_search_pattern("*.json").unwrap();
/// let (watcher, mut rx) = ResourceWatcher::new(&storage, Duration::from_millis(500))?;
///
/// while let Some(changed) = rx.recv().await {
///     println!("Changed resources: {:?}", changed);
/// }
/// # drop(watcher);
/// # Ok(())
/// # }
/// ```
pub struct ResourceWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
    debounce_duration: Duration,
}

impl ResourceWatcher {
    /// Start watching the root of `storage`.
    ///
    /// # Returns
    ///
    /// Returns a tuple of (ResourceWatcher, receiver channel). The receiver gets
    /// one `Vec` of resource names per debounced batch. Dropping the watcher
    /// stops the watch and closes the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the root does not exist or cannot be watched.
    pub fn new(
        storage: &FileStorageProvider,
        debounce_duration: Duration,
    ) -> Result<(Self, mpsc::Receiver<Vec<String>>)> {
        let root = storage
            .root()
            .canonicalize()
            .map_err(|e| ConfigError::Watch(format!("Failed to resolve root: {}", e)))?;
        let resolver = FileStorageProvider::new(&root).with_search_pattern(storage.search_pattern())?;

        let (tx, rx) = mpsc::channel(100);

        // Channel for raw events from notify
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    notify::EventKind::Modify(_)
                        | notify::EventKind::Create(_)
                        | notify::EventKind::Remove(_)
                ) {
                    let _ = event_tx.send(event);
                }
            }
        })
        .map_err(|e| ConfigError::Watch(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| ConfigError::Watch(format!("Failed to watch '{}': {}", root.display(), e)))?;

        // Debounce raw events into batches of resource names
        tokio::spawn(async move {
            while let Some(first) = event_rx.recv().await {
                let mut batch = BTreeSet::new();
                collect_names(&resolver, &first, &mut batch);

                let deadline = Instant::now() + debounce_duration;
                while let Ok(Some(event)) = timeout_at(deadline, event_rx.recv()).await {
                    collect_names(&resolver, &event, &mut batch);
                }

                if batch.is_empty() {
                    continue;
                }
                debug!(count = batch.len(), "Detected resource changes");
                if tx.send(batch.into_iter().collect()).await.is_err() {
                    // Receiver dropped, exit
                    break;
                }
            }
        });

        Ok((
            Self {
                _watcher: watcher,
                root,
                debounce_duration,
            },
            rx,
        ))
    }

    /// The canonical root directory being watched.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Get the debounce duration for this watcher.
    pub fn debounce_duration(&self) -> Duration {
        self.debounce_duration
    }
}

fn collect_names(resolver: &FileStorageProvider, event: &Event, batch: &mut BTreeSet<String>) {
    for path in &event.paths {
        match resolver.resource_name(path) {
            Some(name) if resolver.matches(&name) => {
                trace!(resource = %name, kind = ?event.kind, "Resource event");
                batch.insert(name);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_watcher_creation() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorageProvider::new(temp_dir.path());
        let result = ResourceWatcher::new(&storage, Duration::from_millis(100));
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_watch_nonexistent_root() {
        let storage = FileStorageProvider::new("/nonexistent/config");
        let result = ResourceWatcher::new(&storage, Duration::from_millis(100));
        assert!(matches!(result, Err(ConfigError::Watch(_))));
    }

    #[tokio::test]
    async fn test_file_change_emits_resource_name() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("app.json");
        fs::write(&config_path, r#"{"port":8080}"#).unwrap();

        let storage = FileStorageProvider::new(temp_dir.path()).with_search_pattern("*.json").unwrap();
        let (_watcher, mut rx) = ResourceWatcher::new(&storage, Duration::from_millis(100)).unwrap();

        // Modify the file
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            fs::write(&config_path, r#"{"port":9090}"#).unwrap();
        });

        let batch = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch, vec!["app.json".to_string()]);
    }

    #[tokio::test]
    async fn test_non_matching_files_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorageProvider::new(temp_dir.path()).with_search_pattern("*.json").unwrap();
        let (_watcher, mut rx) = ResourceWatcher::new(&storage, Duration::from_millis(50)).unwrap();

        fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let result = timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_debounce_duration() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorageProvider::new(temp_dir.path());
        let duration = Duration::from_millis(500);
        let (watcher, _rx) = ResourceWatcher::new(&storage, duration).unwrap();
        assert_eq!(watcher.debounce_duration(), duration);
    }
}
