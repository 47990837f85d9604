//! Tessera Cryptographic Primitives
//!
//! Building blocks for the Tessera ratchet protocol and the password-derived
//! keychain. Pure functions with deterministic outputs. Callers provide every
//! random byte (IVs, key seeds) so protocol logic stays reproducible under a
//! seeded environment.
//!
//! # Key Lifecycle
//!
//! ```text
//! X25519(ephemeral, peer static)
//!        │
//!        ▼
//! HKDF pair → (Root Key, Chain Key)
//!        │
//!        ▼
//! Chain Ratchet → Message Keys
//!        │
//!        ▼
//! AES-256-GCM → Ciphertext (header bound as associated data)
//! ```
//!
//! Every DH ratchet step mixes a fresh X25519 output into the root key, so a
//! compromised chain heals once both parties exchange new ephemeral keys.
//!
//! # Security
//!
//! Forward Secrecy:
//! - Chain advancement: `chain' = HMAC(chain, "chain-update")` is one-way
//! - Old chain keys are zeroized after deriving the next one
//! - Message keys are zeroized when dropped
//!
//! Authenticity:
//! - AES-256-GCM rejects any modification of ciphertext or associated data
//! - Certificates are verified against an Ed25519 authority key

#![forbid(unsafe_code)]

pub mod aead;
pub mod encoding;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod ratchet;
pub mod signing;

pub use aead::{IV_SIZE, KEY_SIZE, TAG_SIZE, decrypt, encrypt};
pub use error::CryptoError;
pub use kdf::{hkdf_pair, hmac_sha256, pbkdf2_sha256, sha256};
pub use keys::{KeyPair, PublicKey, SharedSecret};
pub use ratchet::{ChainRatchet, MessageKey};
pub use signing::{AuthorityKey, AuthoritySigner, Signature};
