//! Content hashing for change detection.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Computes a stable content hash for a resource.
///
/// Implementations must be pure functions of the input bytes: hashing the same
/// content twice yields the same result, and different content yields a
/// different result (up to collisions of the underlying digest).
pub trait HashProvider: Send + Sync {
    /// Hash the given bytes into a printable string.
    fn hash(&self, bytes: &[u8]) -> String;
}

/// SHA-256 hash provider producing lowercase hex digests.
///
/// # Examples
///
/// ```rust
/// use hotswap_remote::core::{HashProvider, Sha256HashProvider};
///
/// let hasher = Sha256HashProvider;
/// assert_eq!(hasher.hash(b"abc"), hasher.hash(b"abc"));
/// assert_ne!(hasher.hash(b"abc"), hasher.hash(b"abd"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256HashProvider;

impl HashProvider for Sha256HashProvider {
    fn hash(&self, bytes: &[u8]) -> String {
        let digest = Sha256::digest(bytes);
        hex::encode(digest)
    }
}

/// A named configuration unit with its content and derived hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationResource {
    name: String,
    content: Bytes,
    hash: String,
}

impl ConfigurationResource {
    /// Create a resource, deriving its hash from `content`.
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>, hasher: &dyn HashProvider) -> Self {
        let content = content.into();
        let hash = hasher.hash(&content);
        Self {
            name: name.into(),
            content,
            hash,
        }
    }

    /// Resource name (also used as the pub/sub topic).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw resource bytes.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Content hash.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Shared default hash provider.
pub fn default_hash_provider() -> Arc<dyn HashProvider> {
    Arc::new(Sha256HashProvider)
}
