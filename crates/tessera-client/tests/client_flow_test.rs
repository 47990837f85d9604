//! End-to-end chat flows over the in-memory directory and relay
//!
//! Each test registers real clients (PBKDF2, ratchet, escrow) and drives
//! them only through the public client surface.

use tempfile::tempdir;
use tessera_client::{
    BlobStore, ChatClient, ClientConfig, ClientError, Direction, MemoryBlobStore, MemoryDirectory,
    MemoryRelay, RedbBlobStore, Relay,
};
use tessera_core::{MessengerConfig, MessengerError, SeededEnv, SessionState, TrustPolicy};
use tessera_crypto::{AuthoritySigner, KeyPair};

const PASSWORD: &str = "open sesame";

fn authority() -> AuthoritySigner {
    AuthoritySigner::from_secret_bytes(&[1u8; 32])
}

fn config() -> ClientConfig {
    ClientConfig::new(MessengerConfig::new(
        authority().authority_key(),
        *KeyPair::from_secret_bytes([2u8; 32]).public(),
    ))
}

fn strict_config() -> ClientConfig {
    let mut config = config();
    config.messenger.trust_policy = TrustPolicy::RequireSignature;
    config
}

fn register<S: BlobStore>(
    user: &str,
    seed: u64,
    store: S,
    directory: &MemoryDirectory,
    relay: &MemoryRelay,
    config: ClientConfig,
) -> Result<ChatClient<SeededEnv, S, MemoryDirectory, MemoryRelay>, ClientError> {
    ChatClient::register(
        SeededEnv::new(seed),
        store,
        directory.clone(),
        relay.clone(),
        user,
        PASSWORD,
        config,
    )
}

fn texts<S: BlobStore>(
    client: &ChatClient<SeededEnv, S, MemoryDirectory, MemoryRelay>,
    peer: &str,
) -> Vec<(String, Direction)> {
    client
        .history(peer)
        .unwrap()
        .into_iter()
        .map(|entry| (entry.text, entry.direction))
        .collect()
}

#[test]
fn conversation_over_relay_records_history() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let mut alice =
        register("alice", 1, MemoryBlobStore::new(), &directory, &relay, config()).unwrap();
    let mut bob = register("bob", 2, MemoryBlobStore::new(), &directory, &relay, config()).unwrap();

    alice.send("bob", "hi bob").unwrap();
    alice.send("bob", "are you there?").unwrap();

    let incoming = bob.poll().unwrap();
    assert_eq!(incoming.len(), 2);
    assert!(incoming.iter().all(|msg| msg.sender == "alice"));
    assert_eq!(incoming[1].outcome.as_deref(), Ok("are you there?"));

    bob.send("alice", "yes").unwrap();
    let incoming = alice.poll().unwrap();
    assert_eq!(incoming[0].outcome.as_deref(), Ok("yes"));

    assert_eq!(
        texts(&alice, "bob"),
        vec![
            ("hi bob".to_string(), Direction::Outgoing),
            ("are you there?".to_string(), Direction::Outgoing),
            ("yes".to_string(), Direction::Incoming),
        ]
    );
    assert_eq!(bob.conversations().unwrap(), vec!["alice".to_string()]);
    assert_eq!(alice.messenger().session_state("bob"), SessionState::Bidirectional);
}

#[test]
fn poll_reports_replays_without_aborting_batch() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let mut alice =
        register("alice", 3, MemoryBlobStore::new(), &directory, &relay, config()).unwrap();
    let mut bob = register("bob", 4, MemoryBlobStore::new(), &directory, &relay, config()).unwrap();

    alice.send("bob", "once").unwrap();
    alice.send("bob", "twice").unwrap();
    let queued = relay.drain("bob").unwrap();
    relay.deliver("alice", "bob", queued[0].payload.clone()).unwrap();
    relay.deliver("alice", "bob", queued[0].payload.clone()).unwrap();
    relay.deliver("alice", "bob", queued[1].payload.clone()).unwrap();

    let incoming = bob.poll().unwrap();
    assert_eq!(incoming.len(), 3);
    assert_eq!(incoming[0].outcome.as_deref(), Ok("once"));
    assert!(matches!(
        incoming[1].outcome,
        Err(ClientError::Messenger(MessengerError::Replay { .. }))
    ));
    assert_eq!(incoming[2].outcome.as_deref(), Ok("twice"));
    assert_eq!(bob.history("alice").unwrap().len(), 2);
}

#[test]
fn session_survives_restart_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("alice.redb");
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();

    let mut bob = register("bob", 5, MemoryBlobStore::new(), &directory, &relay, config()).unwrap();
    {
        let store = RedbBlobStore::open(&path).unwrap();
        let mut alice = register("alice", 6, store, &directory, &relay, config()).unwrap();
        alice.send("bob", "before restart").unwrap();
    }
    assert_eq!(bob.poll().unwrap()[0].outcome.as_deref(), Ok("before restart"));
    bob.send("alice", "welcome back").unwrap();

    let store = RedbBlobStore::open(&path).unwrap();
    let mut alice = register("alice", 7, store, &directory, &relay, config()).unwrap();
    assert_eq!(alice.messenger().session_state("bob"), SessionState::SendOnly);

    assert_eq!(alice.poll().unwrap()[0].outcome.as_deref(), Ok("welcome back"));
    alice.send("bob", "after restart").unwrap();
    assert_eq!(bob.poll().unwrap()[0].outcome.as_deref(), Ok("after restart"));
    assert_eq!(alice.history("bob").unwrap().len(), 3);
}

#[test]
fn wrong_password_on_login_is_fatal() {
    let store = MemoryBlobStore::new();
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    register("alice", 8, store.clone(), &directory, &relay, config()).unwrap();

    let err = ChatClient::register(
        SeededEnv::new(9),
        store,
        directory,
        relay,
        "alice",
        "not it",
        config(),
    )
    .unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn backup_restores_identity_and_sessions_on_new_device() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let mut alice =
        register("alice", 10, MemoryBlobStore::new(), &directory, &relay, config()).unwrap();
    let mut bob = register("bob", 11, MemoryBlobStore::new(), &directory, &relay, config()).unwrap();

    alice.send("bob", "ping").unwrap();
    bob.poll().unwrap();
    alice.backup().unwrap();
    let original_key = *alice.messenger().identity().unwrap().public_key();
    drop(alice);

    bob.send("alice", "pong").unwrap();

    let device = MemoryBlobStore::new();
    assert!(
        ChatClient::<SeededEnv, _, _, MemoryRelay>::restore_backup(&directory, &device, "alice")
            .unwrap()
    );
    assert!(
        !ChatClient::<SeededEnv, _, _, MemoryRelay>::restore_backup(&directory, &device, "carol")
            .unwrap()
    );

    let mut alice = register("alice", 12, device, &directory, &relay, config()).unwrap();
    assert_eq!(alice.messenger().identity().unwrap().public_key(), &original_key);
    assert_eq!(alice.poll().unwrap()[0].outcome.as_deref(), Ok("pong"));
    assert_eq!(texts(&alice, "bob").len(), 2);
}

#[test]
fn signing_directory_satisfies_strict_policy() {
    let directory = MemoryDirectory::with_authority(authority());
    let relay = MemoryRelay::new();
    let mut alice =
        register("alice", 13, MemoryBlobStore::new(), &directory, &relay, strict_config()).unwrap();
    let mut bob =
        register("bob", 14, MemoryBlobStore::new(), &directory, &relay, strict_config()).unwrap();

    alice.send("bob", "signed hello").unwrap();
    assert_eq!(bob.poll().unwrap()[0].outcome.as_deref(), Ok("signed hello"));
}

#[test]
fn unsigned_directory_fails_strict_policy() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let mut alice =
        register("alice", 15, MemoryBlobStore::new(), &directory, &relay, strict_config()).unwrap();
    let _bob =
        register("bob", 16, MemoryBlobStore::new(), &directory, &relay, strict_config()).unwrap();

    assert_eq!(alice.refresh_peers().unwrap(), 0);
    assert!(matches!(
        alice.send("bob", "hello"),
        Err(ClientError::Messenger(MessengerError::Certificate { .. }))
    ));
    assert!(relay.drain("bob").unwrap().is_empty());
}

#[test]
fn refresh_learns_display_names() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let mut named = config();
    named.display_name = Some("Bob B.".to_string());

    let mut alice =
        register("alice", 17, MemoryBlobStore::new(), &directory, &relay, config()).unwrap();
    let _bob = register("bob", 18, MemoryBlobStore::new(), &directory, &relay, named).unwrap();

    assert_eq!(alice.refresh_peers().unwrap(), 1);
    assert!(alice.messenger().certificate("bob").is_some());
    assert_eq!(alice.peer_names().unwrap().get("bob").map(String::as_str), Some("Bob B."));
}

#[test]
fn peer_reregistration_rotates_key_and_restarts_session() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let mut alice =
        register("alice", 19, MemoryBlobStore::new(), &directory, &relay, config()).unwrap();
    let mut bob = register("bob", 20, MemoryBlobStore::new(), &directory, &relay, config()).unwrap();

    alice.send("bob", "first").unwrap();
    bob.poll().unwrap();
    let old_key = alice.messenger().certificate("bob").unwrap().static_public_key;

    let mut new_bob =
        register("bob", 21, MemoryBlobStore::new(), &directory, &relay, config()).unwrap();
    alice.refresh_peers().unwrap();
    assert_ne!(alice.messenger().certificate("bob").unwrap().static_public_key, old_key);
    assert_eq!(alice.messenger().session_state("bob"), SessionState::Uninitialized);

    alice.send("bob", "new device?").unwrap();
    assert_eq!(new_bob.poll().unwrap()[0].outcome.as_deref(), Ok("new device?"));
}
