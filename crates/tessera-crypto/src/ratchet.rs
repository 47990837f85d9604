//! Symmetric chain ratchet for forward-secure message key derivation
//!
//! # Security Properties
//!
//! - Forward Secrecy: old chain keys are overwritten when advancing
//! - Key Uniqueness: each counter value produces a unique message key
//! - Determinism: same chain key always produces same key sequence

use zeroize::Zeroize;

use crate::{error::CryptoError, kdf::hmac_sha256};

/// Label for deriving the next chain key
const CHAIN_UPDATE_LABEL: &[u8] = b"chain-update";

/// A message key derived from a chain.
///
/// Used for exactly one AES-256-GCM operation (plus its escrow copy).
#[derive(Clone, PartialEq, Eq)]
pub struct MessageKey {
    /// The 32-byte AES-256-GCM key
    key: [u8; 32],
    /// The chain counter this key was derived at
    counter: u32,
}

impl MessageKey {
    /// Rebuild a message key from stored parts (skipped-key tables, escrow).
    pub fn from_parts(key: [u8; 32], counter: u32) -> Self {
        Self { key, counter }
    }

    /// 32-byte AES-256-GCM key.
    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    /// Chain counter this key was derived at.
    pub fn counter(&self) -> u32 {
        self.counter
    }
}

impl std::fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageKey").field("counter", &self.counter).finish_non_exhaustive()
    }
}

impl Drop for MessageKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Forward-secure symmetric chain.
///
/// Each [`advance()`](Self::advance) call:
/// 1. Derives `message_key = HMAC(chain_key, decimal(counter))`
/// 2. Derives `chain_key' = HMAC(chain_key, "chain-update")`
/// 3. Overwrites the old chain key and increments the counter
///
/// Knowing the chain key at counter N reveals nothing about message keys
/// below N.
#[derive(Clone)]
pub struct ChainRatchet {
    /// Current chain key (32 bytes)
    chain_key: [u8; 32],
    /// Number of message keys derived so far
    counter: u32,
}

impl ChainRatchet {
    /// Start a chain at counter 0.
    pub fn new(chain_key: [u8; 32]) -> Self {
        Self { chain_key, counter: 0 }
    }

    /// Restore a chain from a snapshot.
    pub fn from_parts(chain_key: [u8; 32], counter: u32) -> Self {
        Self { chain_key, counter }
    }

    /// Current counter (next message key to be derived).
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Current chain key, for snapshotting only.
    pub fn chain_key(&self) -> &[u8; 32] {
        &self.chain_key
    }

    /// Derive the message key for the current counter and step the chain.
    pub fn advance(&mut self) -> Result<MessageKey, CryptoError> {
        if self.counter == u32::MAX {
            return Err(CryptoError::CounterOverflow { current: self.counter });
        }

        let message_key = derive_message_key(&self.chain_key, self.counter);
        let next_chain_key = hmac_sha256(&self.chain_key, CHAIN_UPDATE_LABEL);

        self.chain_key.zeroize();
        self.chain_key = next_chain_key;

        let current = self.counter;
        self.counter += 1;

        Ok(MessageKey { key: message_key, counter: current })
    }
}

impl std::fmt::Debug for ChainRatchet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRatchet").field("counter", &self.counter).finish_non_exhaustive()
    }
}

impl Drop for ChainRatchet {
    fn drop(&mut self) {
        self.chain_key.zeroize();
    }
}

fn derive_message_key(chain_key: &[u8; 32], counter: u32) -> [u8; 32] {
    hmac_sha256(chain_key, counter.to_string().as_bytes())
}
