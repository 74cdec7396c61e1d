//! Storage providers enumerating and reading configuration resources.

use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use glob::Pattern;
use std::path::{Component, Path, PathBuf};

/// Enumerates and reads configuration resources.
///
/// Implement this trait to serve resources from somewhere other than the local
/// filesystem (a database, an object store, an embedded bundle).
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// List the names of all current resources.
    ///
    /// Names are stable across calls for an unchanged store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    async fn list_paths(&self) -> Result<Vec<String>>;

    /// Read the whole content of the resource called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if no such resource exists.
    async fn get_configuration(&self, name: &str) -> Result<Bytes>;

    /// Get a human-readable name for this provider (for logging/debugging).
    fn name(&self) -> String;
}

/// Filesystem-backed storage provider.
///
/// Serves every file under `root` (recursively) whose file name matches the
/// search pattern. Resource names are root-relative paths using `/` as the
/// separator on every platform.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_remote::host::FileStorageProvider;
///
/// let storage = FileStorageProvider::new("/etc/myapp/config")
///     .with_search_pattern("*.json")
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FileStorageProvider {
    root: PathBuf,
    /// `None` serves every file.
    pattern: Option<Pattern>,
}

impl FileStorageProvider {
    /// Create a provider serving every file under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pattern: None,
        }
    }

    /// Restrict served files to names matching the glob `pattern`
    /// (`*`, `?`, `[ab]`, `[!a]`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Argument`] if the pattern is malformed.
    pub fn with_search_pattern(mut self, pattern: impl AsRef<str>) -> Result<Self> {
        let pattern = pattern.as_ref();
        let compiled = Pattern::new(pattern).map_err(|e| {
            ConfigError::argument(format!("invalid search pattern '{}': {}", pattern, e))
        })?;
        self.pattern = Some(compiled);
        Ok(self)
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pattern file names are matched against.
    pub fn search_pattern(&self) -> &str {
        self.pattern.as_ref().map_or("*", Pattern::as_str)
    }

    /// Whether a root-relative resource name would be served by this provider.
    pub fn matches(&self, name: &str) -> bool {
        let file_name = name.rsplit('/').next().unwrap_or(name);
        self.pattern
            .as_ref()
            .is_none_or(|pattern| pattern.matches(file_name))
    }

    /// Convert an absolute path under the root into a resource name.
    ///
    /// Returns `None` for paths outside the root.
    pub fn resource_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?.to_string()),
                _ => return None,
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    /// Resolve a resource name to a path, refusing anything that escapes the root.
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || !self.matches(name) {
            return None;
        }
        let mut path = self.root.clone();
        for segment in name.split('/') {
            match Path::new(segment).components().next() {
                Some(Component::Normal(_)) if !segment.contains('\\') => path.push(segment),
                _ => return None,
            }
        }
        Some(path)
    }
}

#[async_trait]
impl StorageProvider for FileStorageProvider {
    async fn list_paths(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
                ConfigError::Other(format!(
                    "Failed to enumerate '{}': {}",
                    dir.display(),
                    e
                ))
            })?;

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    if let Some(name) = self.resource_name(&path) {
                        if self.matches(&name) {
                            names.push(name);
                        }
                    }
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn get_configuration(&self, name: &str) -> Result<Bytes> {
        let path = self
            .resolve(name)
            .ok_or_else(|| ConfigError::NotFound(name.to_string()))?;

        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ConfigError::NotFound(name.to_string()))
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    fn name(&self) -> String {
        format!("file:{}", self.root.display())
    }
}
