//! Redb-backed durable blob store.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. Blob
//! and digest are one value, so a save can never leave them out of step.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};

use super::{BlobStore, StorageError, StoredBlob};

/// Table: keychains
/// Key: user name
/// Value: JSON-encoded `StoredBlob`
const KEYCHAINS: TableDefinition<&str, &[u8]> = TableDefinition::new("keychains");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbBlobStore {
    db: Arc<Database>,
}

impl RedbBlobStore {
    /// Open or create a database at `path`, creating the table if needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(KEYCHAINS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Users with a stored keychain, sorted.
    pub fn users(&self) -> Result<Vec<String>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(KEYCHAINS).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut users = Vec::new();
        for entry in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (key, _) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
            users.push(key.value().to_string());
        }
        Ok(users)
    }
}

impl BlobStore for RedbBlobStore {
    fn load(&self, user: &str) -> Result<Option<StoredBlob>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(KEYCHAINS).map_err(|e| StorageError::Io(e.to_string()))?;

        match table.get(user).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => {
                let blob: StoredBlob = serde_json::from_slice(value.value())
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(blob))
            },
            None => Ok(None),
        }
    }

    fn store(&self, user: &str, blob: &StoredBlob) -> Result<(), StorageError> {
        let bytes =
            serde_json::to_vec(blob).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(KEYCHAINS).map_err(|e| StorageError::Io(e.to_string()))?;
            table.insert(user, bytes.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn remove(&self, user: &str) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        let existed = {
            let mut table =
                txn.open_table(KEYCHAINS).map_err(|e| StorageError::Io(e.to_string()))?;
            table.remove(user).map_err(|e| StorageError::Io(e.to_string()))?.is_some()
        };
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(existed)
    }
}
