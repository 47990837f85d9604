//! Blob store whose writes can be made to fail

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use super::{BlobStore, MemoryBlobStore, StorageError, StoredBlob};

/// [`MemoryBlobStore`] with a shared switch that rejects every `store`.
#[derive(Clone, Default)]
pub(crate) struct FlakyBlobStore {
    inner: MemoryBlobStore,
    failing: Arc<AtomicBool>,
}

impl FlakyBlobStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl BlobStore for FlakyBlobStore {
    fn load(&self, user: &str) -> Result<Option<StoredBlob>, StorageError> {
        self.inner.load(user)
    }

    fn store(&self, user: &str, blob: &StoredBlob) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Io("write rejected".to_string()));
        }
        self.inner.store(user, blob)
    }

    fn remove(&self, user: &str) -> Result<bool, StorageError> {
        self.inner.remove(user)
    }
}
