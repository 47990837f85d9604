use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use super::{BlobStore, StorageError, StoredBlob};

/// In-memory blob store for tests and the demo.
///
/// Contents are lost when the last clone is dropped.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<HashMap<String, StoredBlob>>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with a stored keychain.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.len())
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, StoredBlob>>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Io("blob store lock poisoned".to_string()))
    }
}

impl BlobStore for MemoryBlobStore {
    fn load(&self, user: &str) -> Result<Option<StoredBlob>, StorageError> {
        Ok(self.lock()?.get(user).cloned())
    }

    fn store(&self, user: &str, blob: &StoredBlob) -> Result<(), StorageError> {
        self.lock()?.insert(user.to_string(), blob.clone());
        Ok(())
    }

    fn remove(&self, user: &str) -> Result<bool, StorageError> {
        Ok(self.lock()?.remove(user).is_some())
    }
}
