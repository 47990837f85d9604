//! Per-peer ratchet session
//!
//! One [`RatchetSession`] exists per contact. It combines a symmetric chain
//! ratchet per direction with a DH ratchet that mixes fresh X25519 output
//! into the root key whenever the peer presents a new ratchet key.
//!
//! # Establishment
//!
//! ```text
//! first send:    eph ← random; ss = DH(eph, peer static)
//!                (root, send chain) = HKDF(ss, ss, "ratchet-init")
//! first receive: ss = DH(own static, header eph)
//!                (root, receive chain) = HKDF(ss, ss, "ratchet-init")
//! ```
//!
//! # DH Ratchet
//!
//! Triggered when a header carries a ratchet key other than the current
//! receive ratchet key:
//!
//! 1. Archive the rest of the old receive chain up to `prevChainLength`
//! 2. `(root, receive chain) = HKDF(root, DH(own static, new eph), "ratchet-step")`
//! 3. Fresh local eph; `(root, send chain) = HKDF(root, DH(eph, peer static), "ratchet-step")`
//!
//! # Invariants
//!
//! - A message id (ratchet key, counter) is decrypted at most once
//! - Skipped keys are keyed by the ratchet key that produced them, so they
//!   survive later DH steps
//! - At most [`MAX_SKIP`] keys are derived ahead on one chain per message

use std::collections::{HashMap, HashSet};

use tessera_crypto::{ChainRatchet, KeyPair, MessageKey, PublicKey, decrypt, encrypt, hkdf_pair};
use zeroize::Zeroize;

use super::{
    error::MessengerError,
    escrow,
    header::{Envelope, MessageHeader, MessageId},
};
use crate::env::Environment;

/// Maximum number of message keys skipped on one chain for a single message.
///
/// Bounds the work an attacker can force with a large message number.
pub const MAX_SKIP: u32 = 1000;

/// HKDF info for session bootstrap
const INIT_LABEL: &[u8] = b"ratchet-init";

/// HKDF info for DH ratchet steps
const STEP_LABEL: &[u8] = b"ratchet-step";

/// Which chains a session has populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session with this peer
    Uninitialized,
    /// Sent first, nothing received yet
    SendOnly,
    /// Received first, nothing sent yet
    ReceiveOnly,
    /// Both chains established
    Bidirectional,
}

/// Local sending chain and the ratchet key pair that seeded it.
#[derive(Clone)]
pub(crate) struct SendChain {
    pub(crate) ratchet_key: KeyPair,
    pub(crate) chain: ChainRatchet,
}

/// Receiving chain and the peer ratchet key that seeded it.
#[derive(Clone)]
pub(crate) struct ReceiveChain {
    pub(crate) ratchet_key: PublicKey,
    pub(crate) chain: ChainRatchet,
}

/// Ratchet state shared with one peer.
#[derive(Clone)]
pub struct RatchetSession {
    pub(crate) root_key: [u8; 32],
    pub(crate) send: Option<SendChain>,
    pub(crate) receive: Option<ReceiveChain>,
    /// Length of the send chain replaced by the last DH step
    pub(crate) prev_send_counter: u32,
    pub(crate) skipped: HashMap<MessageId, MessageKey>,
    pub(crate) seen: HashSet<MessageId>,
}

impl RatchetSession {
    /// Open a session as the initiator.
    pub fn initiate<E: Environment>(
        env: &E,
        peer_static: &PublicKey,
    ) -> Result<Self, MessengerError> {
        let ratchet_key = KeyPair::from_secret_bytes(env.random_array());
        let shared = ratchet_key.diffie_hellman(peer_static)?;
        let (root_key, chain_key) = hkdf_pair(shared.as_bytes(), shared.as_bytes(), INIT_LABEL);

        tracing::debug!(ratchet_key = %ratchet_key.public().fingerprint(), "initiated session");

        Ok(Self {
            root_key,
            send: Some(SendChain { ratchet_key, chain: ChainRatchet::new(chain_key) }),
            receive: None,
            prev_send_counter: 0,
            skipped: HashMap::new(),
            seen: HashSet::new(),
        })
    }

    /// Open a session from the first message received from a peer.
    pub fn accept(
        own_static: &KeyPair,
        sender_ratchet_key: &PublicKey,
    ) -> Result<Self, MessengerError> {
        let shared = own_static.diffie_hellman(sender_ratchet_key)?;
        let (root_key, chain_key) = hkdf_pair(shared.as_bytes(), shared.as_bytes(), INIT_LABEL);

        tracing::debug!(ratchet_key = %sender_ratchet_key.fingerprint(), "accepted session");

        Ok(Self {
            root_key,
            send: None,
            receive: Some(ReceiveChain {
                ratchet_key: *sender_ratchet_key,
                chain: ChainRatchet::new(chain_key),
            }),
            prev_send_counter: 0,
            skipped: HashMap::new(),
            seen: HashSet::new(),
        })
    }

    /// Which chains are populated.
    pub fn state(&self) -> SessionState {
        match (&self.send, &self.receive) {
            (Some(_), Some(_)) => SessionState::Bidirectional,
            (Some(_), None) => SessionState::SendOnly,
            (None, Some(_)) => SessionState::ReceiveOnly,
            (None, None) => SessionState::Uninitialized,
        }
    }

    /// Number of cached out-of-order message keys.
    pub fn skipped_key_count(&self) -> usize {
        self.skipped.len()
    }

    /// Number of message ids recorded for replay detection.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Encrypt `plaintext` for the peer, creating a send chain if needed.
    pub fn encrypt<E: Environment>(
        &mut self,
        env: &E,
        peer_static: &PublicKey,
        escrow_public_key: &PublicKey,
        plaintext: &[u8],
    ) -> Result<Envelope, MessengerError> {
        let mut send = match self.send.take() {
            Some(send) => send,
            None => self.step_send_chain(env, peer_static)?,
        };

        let message_key = send.chain.advance()?;
        let per_message_iv = env.random_array();
        let escrow_iv = env.random_array();
        let escrow_ciphertext =
            escrow::seal(&send.ratchet_key, escrow_public_key, &escrow_iv, &message_key)?;

        let header = MessageHeader {
            sender_ephemeral_public_key: *send.ratchet_key.public(),
            message_number: message_key.counter(),
            prev_chain_length: self.prev_send_counter,
            per_message_iv,
            escrow_ephemeral_public_key: *send.ratchet_key.public(),
            escrow_iv,
            escrow_ciphertext,
        };
        let ciphertext =
            encrypt(message_key.key(), &per_message_iv, plaintext, &header.associated_data()?);

        self.send = Some(send);
        Ok(Envelope { header, ciphertext })
    }

    /// Decrypt a message from the peer.
    ///
    /// Mutates the session even on failure; callers keep a copy and commit
    /// only on success.
    ///
    /// # Errors
    ///
    /// - `Replay`: message id already decrypted
    /// - `Session`: counter already passed without a cached key, or too many
    ///   keys would be skipped
    /// - `Decryption`: AEAD verification failed
    pub fn decrypt<E: Environment>(
        &mut self,
        env: &E,
        own_static: &KeyPair,
        peer_static: &PublicKey,
        envelope: &Envelope,
    ) -> Result<Vec<u8>, MessengerError> {
        let header = &envelope.header;
        let id = header.message_id();

        if self.seen.contains(&id) {
            return Err(MessengerError::Replay {
                ratchet_key: id.ratchet_key.fingerprint(),
                message_number: id.message_number,
            });
        }

        let message_key = match self.skipped.remove(&id) {
            Some(key) => {
                tracing::debug!(
                    ratchet_key = %id.ratchet_key.fingerprint(),
                    message_number = id.message_number,
                    "using cached skipped key"
                );
                key
            },
            None => {
                let current = self.receive.as_ref().map(|receive| receive.ratchet_key);
                if current != Some(id.ratchet_key) {
                    self.archive_receive_chain(header.prev_chain_length)?;
                    self.dh_ratchet(env, own_static, peer_static, &id.ratchet_key)?;
                }
                self.receive_key(id)?
            },
        };

        let plaintext = decrypt(
            message_key.key(),
            &header.per_message_iv,
            &envelope.ciphertext,
            &header.associated_data()?,
        )?;

        self.seen.insert(id);
        Ok(plaintext)
    }

    /// Derive a new send chain from the root key with a fresh ratchet key.
    fn step_send_chain<E: Environment>(
        &mut self,
        env: &E,
        peer_static: &PublicKey,
    ) -> Result<SendChain, MessengerError> {
        let ratchet_key = KeyPair::from_secret_bytes(env.random_array());
        let shared = ratchet_key.diffie_hellman(peer_static)?;
        let (root_key, chain_key) = hkdf_pair(&self.root_key, shared.as_bytes(), STEP_LABEL);
        self.replace_root(root_key);

        tracing::debug!(ratchet_key = %ratchet_key.public().fingerprint(), "new send chain");

        Ok(SendChain { ratchet_key, chain: ChainRatchet::new(chain_key) })
    }

    /// Cache the keys left on the current receive chain up to
    /// `prev_chain_length` before it is replaced.
    fn archive_receive_chain(&mut self, prev_chain_length: u32) -> Result<(), MessengerError> {
        let Some(receive) = self.receive.as_mut() else {
            return Ok(());
        };

        let counter = receive.chain.counter();
        if prev_chain_length <= counter {
            return Ok(());
        }
        if prev_chain_length - counter > MAX_SKIP {
            return Err(MessengerError::session(format!(
                "previous chain would skip {} keys (max {MAX_SKIP})",
                prev_chain_length - counter
            )));
        }

        while receive.chain.counter() < prev_chain_length {
            let key = receive.chain.advance()?;
            let id = MessageId { ratchet_key: receive.ratchet_key, message_number: key.counter() };
            self.skipped.insert(id, key);
        }

        tracing::debug!(
            ratchet_key = %receive.ratchet_key.fingerprint(),
            archived = prev_chain_length - counter,
            "archived previous receive chain"
        );
        Ok(())
    }

    fn dh_ratchet<E: Environment>(
        &mut self,
        env: &E,
        own_static: &KeyPair,
        peer_static: &PublicKey,
        new_ratchet_key: &PublicKey,
    ) -> Result<(), MessengerError> {
        self.prev_send_counter = self.send.as_ref().map_or(0, |send| send.chain.counter());

        let shared = own_static.diffie_hellman(new_ratchet_key)?;
        let (root_key, chain_key) = hkdf_pair(&self.root_key, shared.as_bytes(), STEP_LABEL);
        self.replace_root(root_key);
        self.receive =
            Some(ReceiveChain { ratchet_key: *new_ratchet_key, chain: ChainRatchet::new(chain_key) });

        let send = self.step_send_chain(env, peer_static)?;
        self.send = Some(send);

        tracing::debug!(
            ratchet_key = %new_ratchet_key.fingerprint(),
            prev_send_counter = self.prev_send_counter,
            "dh ratchet step"
        );
        Ok(())
    }

    /// Advance the receive chain to `id`, caching every key skipped on the
    /// way.
    fn receive_key(&mut self, id: MessageId) -> Result<MessageKey, MessengerError> {
        let Some(receive) = self.receive.as_mut() else {
            return Err(MessengerError::session("no receive chain"));
        };

        let counter = receive.chain.counter();
        if id.message_number < counter {
            return Err(MessengerError::session(format!(
                "message {} already passed on this chain (at {counter}) and no key is cached",
                id.message_number
            )));
        }
        if id.message_number - counter > MAX_SKIP {
            return Err(MessengerError::session(format!(
                "message {} would skip {} keys (max {MAX_SKIP})",
                id.message_number,
                id.message_number - counter
            )));
        }

        while receive.chain.counter() < id.message_number {
            let key = receive.chain.advance()?;
            let skipped = MessageId { ratchet_key: receive.ratchet_key, message_number: key.counter() };
            self.skipped.insert(skipped, key);
        }
        if id.message_number > counter {
            tracing::debug!(
                ratchet_key = %receive.ratchet_key.fingerprint(),
                skipped = id.message_number - counter,
                "cached skipped keys"
            );
        }

        Ok(receive.chain.advance()?)
    }

    fn replace_root(&mut self, root_key: [u8; 32]) {
        self.root_key.zeroize();
        self.root_key = root_key;
    }
}

impl std::fmt::Debug for RatchetSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatchetSession")
            .field("state", &self.state())
            .field("send_counter", &self.send.as_ref().map(|send| send.chain.counter()))
            .field("receive_counter", &self.receive.as_ref().map(|r| r.chain.counter()))
            .field("prev_send_counter", &self.prev_send_counter)
            .field("skipped", &self.skipped.len())
            .field("seen", &self.seen.len())
            .finish_non_exhaustive()
    }
}

impl Drop for RatchetSession {
    fn drop(&mut self) {
        self.root_key.zeroize();
    }
}
