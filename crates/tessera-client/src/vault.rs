//! Password-protected vault for one local user
//!
//! A [`Keychain`] persisted through a [`BlobStore`]. Every mutation is
//! staged on the keychain and written back as one blob; if any step fails
//! the in-memory keychain reverts, so memory and storage never diverge.
//!
//! # Entries
//!
//! Keychain values have a fixed padding bound, so logical values are split
//! into chunks no longer than that bound:
//!
//! | Name                 | Content                                      |
//! |----------------------|----------------------------------------------|
//! | `messenger_state`    | Chunk count of the messenger snapshot JSON   |
//! | `known_peers`        | Chunk count of the sorted peer list          |
//! | `known_peers_map`    | Chunk count of the display name map          |
//! | `peer_<name>`        | Number of history pages for `<name>`         |
//! | `history_<k>_<name>` | Chunk count of page `k`, a [`HistoryEntry`] list |
//! | `chunk_<j>_<value>`  | Piece `j` of the value named `<value>`       |
//!
//! A history page holds at most [`HISTORY_PAGE_LEN`] entries, so appending
//! rewrites only the last page.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tessera_core::{Environment, Keychain, KeychainConfig, KeychainError, keychain::digest};

use crate::{
    error::ClientError,
    store::{BlobStore, StoredBlob},
};

/// Entries per stored history page
pub const HISTORY_PAGE_LEN: usize = 128;

const MESSENGER_STATE: &str = "messenger_state";
const KNOWN_PEERS: &str = "known_peers";
const KNOWN_PEERS_MAP: &str = "known_peers_map";
const HISTORY_PREFIX: &str = "peer_";
const PAGE_PREFIX: &str = "history_";
const CHUNK_PREFIX: &str = "chunk_";

/// Which way a message travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the peer
    Incoming,
    /// Sent to the peer
    Outgoing,
}

/// One stored message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Plaintext
    pub text: String,
    /// Sent or received
    pub direction: Direction,
    /// Seconds since the Unix epoch when recorded
    pub timestamp: u64,
    /// Peer identity
    pub peer: String,
}

/// Keychain-backed storage for one user.
pub struct Vault<E: Environment, S: BlobStore> {
    env: E,
    store: S,
    user: String,
    keychain: Keychain<E>,
}

impl<E: Environment, S: BlobStore> Vault<E, S> {
    /// Log in to an existing vault, or create one if `user` has none.
    ///
    /// # Errors
    ///
    /// - `Keychain(Authentication)`: wrong password
    /// - `Keychain(Integrity)`: stored blob does not match its digest
    /// - `Storage`: backend failure
    pub fn open(
        env: E,
        store: S,
        user: &str,
        password: &str,
        config: KeychainConfig,
    ) -> Result<Self, ClientError> {
        if user.is_empty() {
            return Err(ClientError::InvalidInput("user must be non-empty".to_string()));
        }

        let keychain = match store.load(user)? {
            Some(stored) => {
                let keychain = Keychain::load_with_config(
                    env.clone(),
                    password,
                    &stored.blob,
                    Some(&stored.digest),
                    config,
                )?;
                tracing::info!(user, entries = keychain.len(), "vault unlocked");
                keychain
            },
            None => {
                let keychain = Keychain::init_with_config(env.clone(), password, config)?;
                tracing::info!(user, "vault created");
                keychain
            },
        };

        let vault = Self { env, store, user: user.to_string(), keychain };
        vault.save()?;
        Ok(vault)
    }

    /// Owner of this vault.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Stored messenger snapshot, if any.
    pub fn messenger_state(&self) -> Result<Option<String>, ClientError> {
        self.read_text(MESSENGER_STATE)
    }

    /// Replace the stored messenger snapshot.
    pub fn save_messenger_state(&mut self, state: &str) -> Result<(), ClientError> {
        self.commit(|vault| vault.write_text(MESSENGER_STATE, state))
    }

    /// Record a message and add the peer to the known list.
    pub fn append_message(
        &mut self,
        peer: &str,
        text: &str,
        direction: Direction,
    ) -> Result<HistoryEntry, ClientError> {
        self.commit(|vault| vault.push_history(peer, text, direction))
    }

    /// Replace the messenger snapshot and record a message in one write.
    ///
    /// Either both land in storage or neither does.
    pub fn record_message(
        &mut self,
        state: &str,
        peer: &str,
        text: &str,
        direction: Direction,
    ) -> Result<HistoryEntry, ClientError> {
        self.commit(|vault| {
            let entry = vault.push_history(peer, text, direction)?;
            vault.write_text(MESSENGER_STATE, state)?;
            Ok(entry)
        })
    }

    /// Messages exchanged with `peer`, oldest first.
    pub fn history(&self, peer: &str) -> Result<Vec<HistoryEntry>, ClientError> {
        let mut history = Vec::new();
        for index in 0..self.page_count(peer)? {
            let name = page_key(index, peer);
            let page: Vec<HistoryEntry> =
                self.read_json(&name)?.ok_or_else(|| corrupt(&name, "history page missing"))?;
            history.extend(page);
        }
        Ok(history)
    }

    /// Peers with stored history, sorted.
    pub fn known_peers(&self) -> Result<Vec<String>, ClientError> {
        Ok(self.read_json(KNOWN_PEERS)?.unwrap_or_default())
    }

    /// Remember the display name a peer published.
    pub fn save_peer_name(&mut self, peer: &str, display_name: &str) -> Result<(), ClientError> {
        let mut names = self.peer_names()?;
        if names.get(peer).map(String::as_str) == Some(display_name) {
            return Ok(());
        }
        names.insert(peer.to_string(), display_name.to_string());
        self.commit(|vault| vault.write_json(KNOWN_PEERS_MAP, &names))
    }

    /// Display names by peer identity.
    pub fn peer_names(&self) -> Result<BTreeMap<String, String>, ClientError> {
        Ok(self.read_json(KNOWN_PEERS_MAP)?.unwrap_or_default())
    }

    /// Current encrypted pair, as persisted.
    pub fn export_backup(&self) -> Result<StoredBlob, ClientError> {
        let (blob, digest) = self.keychain.dump()?;
        Ok(StoredBlob { blob, digest })
    }

    /// Seed `store` with a backup pair so a later [`Vault::open`] logs in
    /// to it.
    ///
    /// The digest is checked here; the password is checked on open.
    pub fn import_backup(store: &S, user: &str, backup: &StoredBlob) -> Result<(), ClientError> {
        if digest(&backup.blob) != backup.digest {
            return Err(KeychainError::Integrity.into());
        }
        store.store(user, backup)?;
        tracing::info!(user, "backup imported");
        Ok(())
    }

    /// Apply `stage` to the keychain and persist it, or revert on failure.
    fn commit<T>(
        &mut self,
        stage: impl FnOnce(&mut Self) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let checkpoint = self.keychain.clone();
        let result = stage(self).and_then(|value| self.save().map(|()| value));
        if let Err(err) = &result {
            tracing::warn!(user = %self.user, error = %err, "vault write reverted");
            self.keychain = checkpoint;
        }
        result
    }

    fn save(&self) -> Result<(), ClientError> {
        let backup = self.export_backup()?;
        self.store.store(&self.user, &backup)?;
        Ok(())
    }

    fn push_history(
        &mut self,
        peer: &str,
        text: &str,
        direction: Direction,
    ) -> Result<HistoryEntry, ClientError> {
        if peer.is_empty() {
            return Err(ClientError::InvalidInput("peer must be non-empty".to_string()));
        }

        let entry = HistoryEntry {
            text: text.to_string(),
            direction,
            timestamp: self.env.wall_clock_secs(),
            peer: peer.to_string(),
        };

        let pages = self.page_count(peer)?;
        let mut index = pages.saturating_sub(1);
        let mut page: Vec<HistoryEntry> = match pages {
            0 => Vec::new(),
            _ => {
                let name = page_key(index, peer);
                self.read_json(&name)?.ok_or_else(|| corrupt(&name, "history page missing"))?
            },
        };
        if page.len() >= HISTORY_PAGE_LEN {
            index += 1;
            page.clear();
        }
        page.push(entry.clone());
        self.write_json(&page_key(index, peer), &page)?;
        if index >= pages {
            self.keychain.set(&history_key(peer), &(index + 1).to_string())?;
        }

        let mut peers = self.known_peers()?;
        if let Err(pos) = peers.binary_search_by(|p| p.as_str().cmp(peer)) {
            peers.insert(pos, peer.to_string());
            self.write_json(KNOWN_PEERS, &peers)?;
        }

        Ok(entry)
    }

    fn page_count(&self, peer: &str) -> Result<usize, ClientError> {
        self.read_count(&history_key(peer))
    }

    fn read_count(&self, name: &str) -> Result<usize, ClientError> {
        Ok(self.read_optional_count(name)?.unwrap_or(0))
    }

    fn read_optional_count(&self, name: &str) -> Result<Option<usize>, ClientError> {
        match self.keychain.get(name)? {
            Some(count) => {
                count.parse().map(Some).map_err(|_| corrupt(name, "count is not a number"))
            },
            None => Ok(None),
        }
    }

    fn read_text(&self, name: &str) -> Result<Option<String>, ClientError> {
        let Some(count) = self.read_optional_count(name)? else {
            return Ok(None);
        };

        let mut text = String::new();
        for index in 0..count {
            let piece = self
                .keychain
                .get(&chunk_key(index, name))?
                .ok_or_else(|| corrupt(name, &format!("chunk {index} missing")))?;
            text.push_str(&piece);
        }
        Ok(Some(text))
    }

    fn write_text(&mut self, name: &str, text: &str) -> Result<(), ClientError> {
        let previous = self.read_count(name)?;
        let pieces = split_chunks(text, self.keychain.config().max_value_len);

        for (index, piece) in pieces.iter().enumerate() {
            self.keychain.set(&chunk_key(index, name), piece)?;
        }
        for index in pieces.len()..previous {
            self.keychain.remove(&chunk_key(index, name))?;
        }
        self.keychain.set(name, &pieces.len().to_string())?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ClientError> {
        match self.read_text(name)? {
            Some(text) => {
                serde_json::from_str(&text).map(Some).map_err(|e| corrupt(name, &e.to_string()))
            },
            None => Ok(None),
        }
    }

    fn write_json<T: Serialize>(&mut self, name: &str, value: &T) -> Result<(), ClientError> {
        let text = serde_json::to_string(value)
            .map_err(|e| ClientError::InvalidInput(format!("cannot encode '{name}': {e}")))?;
        self.write_text(name, &text)
    }
}

impl<E: Environment, S: BlobStore> std::fmt::Debug for Vault<E, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("user", &self.user)
            .field("entries", &self.keychain.len())
            .finish_non_exhaustive()
    }
}

fn history_key(peer: &str) -> String {
    format!("{HISTORY_PREFIX}{peer}")
}

fn page_key(index: usize, peer: &str) -> String {
    format!("{PAGE_PREFIX}{index}_{peer}")
}

fn chunk_key(index: usize, name: &str) -> String {
    format!("{CHUNK_PREFIX}{index}_{name}")
}

fn corrupt(name: &str, reason: &str) -> ClientError {
    ClientError::Corrupt { name: name.to_string(), reason: reason.to_string() }
}

/// Split `text` into pieces of at most `max` bytes on char boundaries.
///
/// Always yields at least one piece.
fn split_chunks(text: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while rest.len() > max {
        let mut end = max;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            // Bound below one char; the keychain reports the length
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (head, tail) = rest.split_at(end);
        pieces.push(head);
        rest = tail;
    }
    pieces.push(rest);
    pieces
}
