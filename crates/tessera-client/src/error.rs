//! Client error types

use tessera_core::{KeychainError, MessengerError};
use thiserror::Error;

use crate::store::StorageError;

/// Errors from client operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Keychain rejected the operation (password, tampering, bounds)
    #[error("keychain: {0}")]
    Keychain(#[from] KeychainError),

    /// Messenger rejected the operation
    #[error("messenger: {0}")]
    Messenger(#[from] MessengerError),

    /// Blob store failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Directory lookup or publish failure
    #[error("directory error: {0}")]
    Directory(String),

    /// Relay delivery failure
    #[error("relay error: {0}")]
    Relay(String),

    /// A vault entry exists but does not parse
    #[error("vault entry '{name}' is corrupt: {reason}")]
    Corrupt {
        /// Keychain entry name
        name: String,
        /// Parse failure
        reason: String,
    },

    /// Caller supplied an unusable argument
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ClientError {
    /// Returns true if the vault itself must be rejected.
    ///
    /// Wrong password and tampered blobs abort a login; everything else is
    /// scoped to one operation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Keychain(err) if err.is_store_level())
    }
}
