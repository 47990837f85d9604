//! Tessera client
//!
//! Wires the [`tessera_core`] messenger to persistence and transport:
//!
//! - [`Vault`]: password-protected keychain holding messenger state,
//!   history and peer names, written through a [`BlobStore`]
//! - [`Directory`]: certificate publication and backup locker
//! - [`Relay`]: store-and-forward mailbox for envelopes
//! - [`ChatClient`]: registration, send, receive and polling on top of all
//!   three
//!
//! In-memory implementations of every seam are provided for tests and the
//! demo; [`RedbBlobStore`] persists vaults on disk.

#![forbid(unsafe_code)]

mod client;
mod directory;
mod error;
mod relay;
pub mod store;
mod vault;

pub use client::{CLIENT_MAX_VALUE_LEN, ChatClient, ClientConfig, Incoming};
pub use directory::{Directory, MemoryDirectory, PublishedCertificate};
pub use error::ClientError;
pub use relay::{Delivery, MemoryRelay, Relay};
pub use store::{BlobStore, MemoryBlobStore, RedbBlobStore, StorageError, StoredBlob};
pub use vault::{Direction, HistoryEntry, Vault};
