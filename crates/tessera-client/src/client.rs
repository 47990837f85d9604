//! Chat client: messenger plus vault, directory and relay
//!
//! # Architecture
//!
//! ```text
//!            ┌───────────┐   certificates   ┌───────────┐
//!            │ Directory │◄────────────────►│           │
//!            └───────────┘   backups        │           │
//!                                           │ChatClient │
//!            ┌───────────┐   envelopes      │           │
//!            │   Relay   │◄────────────────►│           │
//!            └───────────┘                  └─────┬─────┘
//!                                                 │
//!                                 ┌───────────────┴───────────┐
//!                                 ▼                           ▼
//!                          ┌────────────┐             ┌─────────────┐
//!                          │ Messenger  │  snapshot   │    Vault    │
//!                          │ (sessions) │────────────►│ (keychain)  │
//!                          └────────────┘             └─────────────┘
//! ```
//!
//! Messenger state is written to the vault after every call that can
//! change it, before any envelope leaves the client. A message and the
//! state that produced it are committed in one vault write; if that write
//! fails the messenger is rolled back, so a storage failure never consumes
//! a message.

use tessera_core::{Certificate, Envelope, Environment, KeychainConfig, Messenger, MessengerConfig};

use crate::{
    directory::{Directory, PublishedCertificate},
    error::ClientError,
    relay::Relay,
    store::BlobStore,
    vault::{Direction, HistoryEntry, Vault},
};

/// Padding bound for client vault entries.
///
/// Longer values are split across entries by the vault, so this only sets
/// the chunk size.
pub const CLIENT_MAX_VALUE_LEN: usize = 16 * 1024;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Messenger trust and escrow settings
    pub messenger: MessengerConfig,
    /// Vault keychain settings
    pub keychain: KeychainConfig,
    /// Name published next to the certificate
    pub display_name: Option<String>,
}

impl ClientConfig {
    /// Config with a vault padding bound of [`CLIENT_MAX_VALUE_LEN`].
    pub fn new(messenger: MessengerConfig) -> Self {
        Self {
            messenger,
            keychain: KeychainConfig {
                max_value_len: CLIENT_MAX_VALUE_LEN,
                ..KeychainConfig::default()
            },
            display_name: None,
        }
    }
}

/// Result of processing one relay delivery
#[derive(Debug)]
pub struct Incoming {
    /// Claimed sender
    pub sender: String,
    /// Plaintext, or why the message was rejected
    pub outcome: Result<String, ClientError>,
}

/// Logged-in chat user.
pub struct ChatClient<E, S, D, R>
where
    E: Environment,
    S: BlobStore,
    D: Directory,
    R: Relay,
{
    config: ClientConfig,
    vault: Vault<E, S>,
    messenger: Messenger<E>,
    directory: D,
    relay: R,
}

impl<E, S, D, R> ChatClient<E, S, D, R>
where
    E: Environment,
    S: BlobStore,
    D: Directory,
    R: Relay,
{
    /// Log in as `user`, registering on first use.
    ///
    /// A persisted messenger is restored when its identity is `user`;
    /// otherwise a new certificate is generated. The certificate is then
    /// published and every other directory certificate accepted.
    ///
    /// # Errors
    ///
    /// - `Keychain`: wrong password or tampered vault
    /// - `Messenger`: persisted state does not parse
    /// - `Directory`: publish failed
    pub fn register(
        env: E,
        store: S,
        directory: D,
        relay: R,
        user: &str,
        password: &str,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let vault = Vault::open(env.clone(), store, user, password, config.keychain)?;

        let restored = match vault.messenger_state()? {
            Some(state) => {
                let messenger =
                    Messenger::import_state(env.clone(), config.messenger.clone(), &state)?;
                if messenger.identity().map(|identity| identity.name()) == Some(user) {
                    Some(messenger)
                } else {
                    tracing::warn!(user, "stored messenger belongs to another identity, replacing");
                    None
                }
            },
            None => None,
        };

        let mut client = match restored {
            Some(messenger) => {
                tracing::info!(user, "restored messenger");
                Self { config, vault, messenger, directory, relay }
            },
            None => {
                let mut messenger = Messenger::new(env, config.messenger.clone());
                messenger.generate_certificate(user)?;
                let mut client = Self { config, vault, messenger, directory, relay };
                client.persist()?;
                client
            },
        };

        let certificate = client.own_certificate()?;
        client.directory.publish(&certificate, client.config.display_name.as_deref())?;
        client.refresh_peers()?;
        Ok(client)
    }

    /// Local identity name.
    pub fn user(&self) -> &str {
        self.vault.user()
    }

    /// Encrypt `text` for `peer`, record it and deliver it.
    ///
    /// The peer's certificate is fetched from the directory if unknown.
    /// Nothing reaches the relay unless the message and the advanced
    /// session were stored. A relay failure after that leaves the message
    /// in history; the peer sees a gap in the chain.
    pub fn send(&mut self, peer: &str, text: &str) -> Result<HistoryEntry, ClientError> {
        self.ensure_certificate(peer)?;

        let checkpoint = self.messenger.clone();
        let (payload, entry) = match self.stage_send(peer, text) {
            Ok(staged) => staged,
            Err(err) => return Err(self.roll_back(checkpoint, err)),
        };

        self.relay.deliver(self.vault.user(), peer, payload)?;
        tracing::debug!(peer, "message sent");
        Ok(entry)
    }

    /// Decrypt one relay payload from `sender` and record it.
    ///
    /// State is persisted even when decryption fails, since a self-heal
    /// attempt discards the old session. If the vault write fails the
    /// messenger is rolled back and the storage error returned, so the
    /// same payload can be delivered again.
    pub fn receive(&mut self, sender: &str, payload: &str) -> Result<String, ClientError> {
        let envelope = Envelope::from_json(payload)?;
        self.ensure_certificate(sender)?;

        let checkpoint = self.messenger.clone();
        let result = self.messenger.receive_message(sender, &envelope);
        let stored = match &result {
            Ok(text) => self.commit(sender, text, Direction::Incoming).map(drop),
            Err(_) => self.persist(),
        };
        if let Err(err) = stored {
            return Err(self.roll_back(checkpoint, err));
        }

        Ok(result?)
    }

    /// Drain the relay mailbox, decrypting each delivery in order.
    ///
    /// A rejected message is reported in its [`Incoming`] and does not stop
    /// the batch. A delivery that failed on storage is queued again for the
    /// next poll. Only a relay failure aborts.
    pub fn poll(&mut self) -> Result<Vec<Incoming>, ClientError> {
        let deliveries = self.relay.drain(self.vault.user())?;

        let mut incoming = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            let outcome = self.receive(&delivery.sender, &delivery.payload);
            if let Err(err) = &outcome {
                tracing::warn!(sender = %delivery.sender, error = %err, "rejected delivery");
            }
            if matches!(outcome, Err(ClientError::Storage(_))) {
                self.relay.deliver(&delivery.sender, self.vault.user(), delivery.payload)?;
            }
            incoming.push(Incoming { sender: delivery.sender, outcome });
        }
        Ok(incoming)
    }

    /// Messages exchanged with `peer`, oldest first.
    pub fn history(&self, peer: &str) -> Result<Vec<HistoryEntry>, ClientError> {
        self.vault.history(peer)
    }

    /// Peers with stored history, sorted.
    pub fn conversations(&self) -> Result<Vec<String>, ClientError> {
        self.vault.known_peers()
    }

    /// Accept every directory certificate other than our own.
    ///
    /// Per-certificate failures are logged and skipped. Returns how many
    /// certificates are now held for directory entries.
    pub fn refresh_peers(&mut self) -> Result<usize, ClientError> {
        let entries = self.directory.list()?;
        let user = self.vault.user().to_string();

        let mut accepted = 0;
        for entry in entries.into_iter().filter(|e| e.certificate.identity != user) {
            let identity = entry.certificate.identity.clone();
            match self.accept(entry) {
                Ok(()) => accepted += 1,
                Err(err) => tracing::warn!(peer = %identity, error = %err, "skipping certificate"),
            }
        }

        self.persist()?;
        Ok(accepted)
    }

    /// Push the encrypted vault pair to the directory.
    pub fn backup(&self) -> Result<(), ClientError> {
        let backup = self.vault.export_backup()?;
        self.directory.store_backup(self.vault.user(), &backup)?;
        tracing::info!(user = %self.vault.user(), "backup stored");
        Ok(())
    }

    /// Seed `store` with `user`'s directory backup before logging in.
    ///
    /// Returns false if the directory holds no backup for `user`.
    pub fn restore_backup(directory: &D, store: &S, user: &str) -> Result<bool, ClientError> {
        match directory.fetch_backup(user)? {
            Some(backup) => {
                Vault::<E, S>::import_backup(store, user, &backup)?;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Underlying messenger.
    pub fn messenger(&self) -> &Messenger<E> {
        &self.messenger
    }

    /// Display names learned from the directory.
    pub fn peer_names(&self) -> Result<std::collections::BTreeMap<String, String>, ClientError> {
        self.vault.peer_names()
    }

    fn own_certificate(&self) -> Result<Certificate, ClientError> {
        self.messenger
            .identity()
            .map(|identity| identity.certificate())
            .ok_or_else(|| ClientError::InvalidInput("messenger has no identity".to_string()))
    }

    fn ensure_certificate(&mut self, peer: &str) -> Result<(), ClientError> {
        if self.messenger.certificate(peer).is_some() {
            return Ok(());
        }

        let entry = self.directory.fetch(peer)?.ok_or_else(|| {
            ClientError::Directory(format!("no certificate published for '{peer}'"))
        })?;
        self.accept(entry)?;
        self.persist()
    }

    fn accept(&mut self, entry: PublishedCertificate) -> Result<(), ClientError> {
        let identity = entry.certificate.identity.clone();
        if self.messenger.certificate(&identity) != Some(&entry.certificate) {
            self.messenger.receive_certificate(entry.certificate, entry.signature.as_ref())?;
        }
        if let Some(name) = entry.display_name {
            self.vault.save_peer_name(&identity, &name)?;
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<(), ClientError> {
        let state = self.messenger.export_state()?;
        self.vault.save_messenger_state(&state)
    }

    fn stage_send(
        &mut self,
        peer: &str,
        text: &str,
    ) -> Result<(String, HistoryEntry), ClientError> {
        let envelope = self.messenger.send_message(peer, text)?;
        let payload = envelope.to_json()?;
        let entry = self.commit(peer, text, Direction::Outgoing)?;
        Ok((payload, entry))
    }

    /// Store the current messenger state together with one history entry.
    fn commit(
        &mut self,
        peer: &str,
        text: &str,
        direction: Direction,
    ) -> Result<HistoryEntry, ClientError> {
        let state = self.messenger.export_state()?;
        self.vault.record_message(&state, peer, text, direction)
    }

    fn roll_back(&mut self, checkpoint: Messenger<E>, err: ClientError) -> ClientError {
        tracing::warn!(user = %self.vault.user(), error = %err, "rolling back messenger");
        self.messenger = checkpoint;
        err
    }
}

impl<E, S, D, R> std::fmt::Debug for ChatClient<E, S, D, R>
where
    E: Environment,
    S: BlobStore,
    D: Directory,
    R: Relay,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("vault", &self.vault)
            .field("messenger", &self.messenger)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tessera_core::SeededEnv;
    use tessera_crypto::{AuthoritySigner, KeyPair};

    use super::*;
    use crate::{
        directory::MemoryDirectory,
        relay::MemoryRelay,
        store::{FlakyBlobStore, MemoryBlobStore, StorageError},
    };

    type TestClient<S> = ChatClient<SeededEnv, S, MemoryDirectory, MemoryRelay>;

    fn config() -> ClientConfig {
        let authority = AuthoritySigner::from_secret_bytes(&[1u8; 32]).authority_key();
        ClientConfig::new(MessengerConfig::new(
            authority,
            *KeyPair::from_secret_bytes([2u8; 32]).public(),
        ))
    }

    fn register<S: BlobStore>(
        user: &str,
        seed: u64,
        store: &S,
        directory: &MemoryDirectory,
        relay: &MemoryRelay,
    ) -> TestClient<S> {
        ChatClient::register(
            SeededEnv::new(seed),
            store.clone(),
            directory.clone(),
            relay.clone(),
            user,
            "pw",
            config(),
        )
        .unwrap()
    }

    #[test]
    fn register_publishes_certificate() {
        let directory = MemoryDirectory::new();
        let client = register("alice", 1, &MemoryBlobStore::new(), &directory, &MemoryRelay::new());

        let entry = directory.fetch("alice").unwrap().unwrap();
        assert_eq!(entry.certificate, client.own_certificate().unwrap());
    }

    #[test]
    fn send_fetches_unknown_certificate() {
        let directory = MemoryDirectory::new();
        let relay = MemoryRelay::new();
        let mut alice = register("alice", 1, &MemoryBlobStore::new(), &directory, &relay);
        let _bob = register("bob", 2, &MemoryBlobStore::new(), &directory, &relay);

        assert!(alice.messenger().certificate("bob").is_none());
        alice.send("bob", "hello").unwrap();
        assert!(alice.messenger().certificate("bob").is_some());
        assert_eq!(relay.pending("bob").unwrap(), 1);
    }

    #[test]
    fn send_to_unpublished_peer_is_directory_error() {
        let directory = MemoryDirectory::new();
        let mut alice =
            register("alice", 1, &MemoryBlobStore::new(), &directory, &MemoryRelay::new());

        assert!(matches!(alice.send("nobody", "hi"), Err(ClientError::Directory(_))));
        assert!(alice.history("nobody").unwrap().is_empty());
    }

    #[test]
    fn malformed_payload_is_rejected_without_history() {
        let directory = MemoryDirectory::new();
        let relay = MemoryRelay::new();
        let mut alice = register("alice", 1, &MemoryBlobStore::new(), &directory, &relay);
        let _bob = register("bob", 2, &MemoryBlobStore::new(), &directory, &relay);

        assert!(matches!(alice.receive("bob", "{not json"), Err(ClientError::Messenger(_))));
        assert!(alice.history("bob").unwrap().is_empty());
    }

    #[test]
    fn storage_failure_on_receive_keeps_message_deliverable() {
        let directory = MemoryDirectory::new();
        let relay = MemoryRelay::new();
        let mut alice = register("alice", 1, &MemoryBlobStore::new(), &directory, &relay);
        let store = FlakyBlobStore::new();
        let mut bob = register("bob", 2, &store, &directory, &relay);
        alice.send("bob", "hello").unwrap();

        store.fail_writes(true);
        let incoming = bob.poll().unwrap();
        assert!(matches!(incoming[0].outcome, Err(ClientError::Storage(StorageError::Io(_)))));
        assert_eq!(relay.pending("bob").unwrap(), 1);
        assert!(bob.history("alice").unwrap().is_empty());

        store.fail_writes(false);
        let incoming = bob.poll().unwrap();
        assert_eq!(incoming[0].outcome, Ok("hello".to_string()));
        assert_eq!(bob.history("alice").unwrap().len(), 1);
    }

    #[test]
    fn storage_failure_on_send_delivers_nothing() {
        let directory = MemoryDirectory::new();
        let relay = MemoryRelay::new();
        let store = FlakyBlobStore::new();
        let mut alice = register("alice", 1, &store, &directory, &relay);
        let mut bob = register("bob", 2, &MemoryBlobStore::new(), &directory, &relay);
        alice.refresh_peers().unwrap();

        store.fail_writes(true);
        assert!(matches!(alice.send("bob", "lost"), Err(ClientError::Storage(_))));
        assert_eq!(relay.pending("bob").unwrap(), 0);
        assert!(alice.history("bob").unwrap().is_empty());

        store.fail_writes(false);
        alice.send("bob", "hello").unwrap();
        let incoming = bob.poll().unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].outcome, Ok("hello".to_string()));
    }
}
