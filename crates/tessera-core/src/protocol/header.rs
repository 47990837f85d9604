//! Wire format: message header, envelope and message identity
//!
//! The header travels in the clear and is bound to the ciphertext as AEAD
//! associated data. Its JSON encoding (camelCase, base64 binary fields, fixed
//! field order) is the exact associated-data byte string, so any mutation of
//! any field breaks decryption.

use serde::{Deserialize, Serialize};
use tessera_crypto::{IV_SIZE, PublicKey, encoding::base64_bytes};

use super::error::MessengerError;

/// Cleartext header of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeader {
    /// Sender's current ratchet public key
    pub sender_ephemeral_public_key: PublicKey,
    /// Counter on the sender's current chain
    pub message_number: u32,
    /// Length of the sender's previous chain
    pub prev_chain_length: u32,
    /// IV for the message ciphertext
    #[serde(rename = "perMessageIV", with = "base64_bytes")]
    pub per_message_iv: [u8; IV_SIZE],
    /// Key the escrow copy is agreed against; equals the sender ratchet key
    pub escrow_ephemeral_public_key: PublicKey,
    /// IV for the escrow ciphertext
    #[serde(rename = "escrowIV", with = "base64_bytes")]
    pub escrow_iv: [u8; IV_SIZE],
    /// Message key encrypted to the escrow authority
    #[serde(with = "base64_bytes")]
    pub escrow_ciphertext: Vec<u8>,
}

impl MessageHeader {
    /// Associated data binding this header to its ciphertext.
    pub fn associated_data(&self) -> Result<Vec<u8>, MessengerError> {
        serde_json::to_vec(self)
            .map_err(|e| MessengerError::invalid(format!("failed to encode header: {e}")))
    }

    /// Id of the message this header belongs to.
    pub fn message_id(&self) -> MessageId {
        MessageId {
            ratchet_key: self.sender_ephemeral_public_key,
            message_number: self.message_number,
        }
    }

    /// Reject headers that are inconsistent before touching any key.
    pub(crate) fn check_structure(&self) -> Result<(), MessengerError> {
        if self.escrow_ephemeral_public_key != self.sender_ephemeral_public_key {
            return Err(MessengerError::invalid("escrow key does not match sender ratchet key"));
        }
        Ok(())
    }
}

/// `(header, ciphertext)` pair handed to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Cleartext header
    pub header: MessageHeader,
    /// AES-256-GCM ciphertext with tag
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Encode for transport.
    pub fn to_json(&self) -> Result<String, MessengerError> {
        serde_json::to_string(self)
            .map_err(|e| MessengerError::invalid(format!("failed to encode envelope: {e}")))
    }

    /// Decode from transport.
    pub fn from_json(text: &str) -> Result<Self, MessengerError> {
        serde_json::from_str(text)
            .map_err(|e| MessengerError::invalid(format!("malformed envelope: {e}")))
    }
}

/// Identity of a message within one peer's session: the ratchet key that
/// produced it plus its counter on that chain.
///
/// Binding the id to the ratchet key keeps cached keys and replay entries
/// distinct across DH ratchet steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageId {
    /// Sender ratchet public key
    pub ratchet_key: PublicKey,
    /// Counter on that chain
    pub message_number: u32,
}
