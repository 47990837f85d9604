//! Tessera core: ratchet messaging and the password-derived keychain
//!
//! Two independent engines share one [`Environment`] abstraction for
//! randomness and time:
//!
//! - [`protocol`]: per-peer Double Ratchet sessions with out-of-order
//!   tolerance, replay rejection, self-healing and an escrow channel
//! - [`keychain`]: encrypted key-value store with blind-indexed names and a
//!   tamper-evident digest
//!
//! Neither performs I/O. The client layer persists messenger snapshots
//! through the keychain and moves envelopes through a relay.

#![forbid(unsafe_code)]

pub mod env;
pub mod keychain;
pub mod protocol;

pub use env::{Environment, SeededEnv, SystemEnv};
pub use keychain::{Keychain, KeychainConfig, KeychainError};
pub use protocol::{
    Certificate, Envelope, EscrowAuthority, Identity, MessageHeader, Messenger, MessengerConfig,
    MessengerError, SessionState, TrustPolicy,
};
