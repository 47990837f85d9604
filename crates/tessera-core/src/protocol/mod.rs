//! Two-party ratchet messaging with an escrow side channel
//!
//! # Message Flow
//!
//! ```text
//! Messenger::send_message(peer, text)
//!        │
//!        ▼
//! RatchetSession::encrypt ── chain ratchet → message key
//!        │                └─ escrow::seal(message key) → header
//!        ▼
//! Envelope { header, ciphertext }  ──relay──►  Messenger::receive_message
//!                                                     │
//!                                                     ▼
//!                                   replay check → skipped cache → DH ratchet
//!                                                     │
//!                                                     ▼
//!                                           AES-256-GCM(header as AAD)
//! ```

mod certificate;
mod error;
mod escrow;
mod header;
mod messenger;
mod session;
mod snapshot;

pub use certificate::{Certificate, Identity, TrustPolicy};
pub use error::MessengerError;
pub use escrow::EscrowAuthority;
pub use header::{Envelope, MessageHeader, MessageId};
pub use messenger::{Messenger, MessengerConfig};
pub use session::{MAX_SKIP, RatchetSession, SessionState};
