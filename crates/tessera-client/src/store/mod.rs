//! Blob storage for serialized keychains
//!
//! Trait-based abstraction persisting one `(blob, digest)` pair per local
//! identity. The trait is synchronous; every call is a single short
//! transaction.

#[cfg(test)]
mod flaky;
mod memory;
mod redb;

#[cfg(test)]
pub(crate) use flaky::FlakyBlobStore;
pub use memory::MemoryBlobStore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::redb::RedbBlobStore;

/// Serialized keychain plus its integrity digest.
///
/// The two halves are always written together; a blob paired with a stale
/// digest fails to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlob {
    /// Keychain JSON
    pub blob: String,
    /// `base64(SHA-256(blob))`
    pub digest: String,
}

/// Storage failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Backend I/O or transaction failure
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Stored bytes could not be decoded
    #[error("storage serialization error: {0}")]
    Serialization(String),
}

/// Persistence for one keychain per user.
///
/// Must be Clone (shared between the vault and tooling), Send + Sync, and
/// synchronous. Implementations share state via Arc, so clones see the same
/// underlying storage.
pub trait BlobStore: Clone + Send + Sync + 'static {
    /// Stored pair for `user`. `None` if the user never saved.
    fn load(&self, user: &str) -> Result<Option<StoredBlob>, StorageError>;

    /// Replace the stored pair for `user` atomically.
    fn store(&self, user: &str, blob: &StoredBlob) -> Result<(), StorageError>;

    /// Delete the stored pair. Returns whether one existed.
    fn remove(&self, user: &str) -> Result<bool, StorageError>;
}
