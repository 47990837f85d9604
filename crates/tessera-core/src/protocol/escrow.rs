//! Escrow channel
//!
//! Every outgoing message carries its message key encrypted to a fixed
//! escrow public key:
//!
//! ```text
//! escrow_key = HMAC(DH(sender ratchet secret, escrow public), "AES-GENERATION")
//! escrow_ciphertext = AES-256-GCM(escrow_key, escrow_iv, message_key)
//! ```
//!
//! The holder of the escrow secret recovers any single message key from the
//! header alone, without the recipient's session state. The channel is plain
//! header metadata and is visible to anyone inspecting traffic.

use tessera_crypto::{IV_SIZE, KeyPair, MessageKey, PublicKey, decrypt, encrypt, hmac_sha256};
use zeroize::Zeroize;

use super::{
    error::MessengerError,
    header::{Envelope, MessageHeader},
};

/// Label deriving the escrow AES key from the escrow DH output
const ESCROW_LABEL: &[u8] = b"AES-GENERATION";

/// Encrypt `message_key` to the escrow authority. Returns the ciphertext.
pub(crate) fn seal(
    sender_ratchet: &KeyPair,
    escrow_public_key: &PublicKey,
    iv: &[u8; IV_SIZE],
    message_key: &MessageKey,
) -> Result<Vec<u8>, MessengerError> {
    let shared = sender_ratchet.diffie_hellman(escrow_public_key)?;
    let mut key = hmac_sha256(shared.as_bytes(), ESCROW_LABEL);
    let ciphertext = encrypt(&key, iv, message_key.key(), &[]);
    key.zeroize();
    Ok(ciphertext)
}

/// Holder of the escrow secret key.
pub struct EscrowAuthority {
    key_pair: KeyPair,
}

impl EscrowAuthority {
    /// Wrap the escrow key pair.
    pub fn new(key_pair: KeyPair) -> Self {
        Self { key_pair }
    }

    /// Public key that messengers are configured with.
    pub fn public_key(&self) -> &PublicKey {
        self.key_pair.public()
    }

    /// Recover the message key from a header.
    ///
    /// # Errors
    ///
    /// - `Decryption`: escrow ciphertext was not sealed to this authority or
    ///   was modified
    /// - `InvalidInput`: recovered key has the wrong length or the escrow key
    ///   is a low-order point
    pub fn recover_message_key(&self, header: &MessageHeader) -> Result<MessageKey, MessengerError> {
        let shared = self.key_pair.diffie_hellman(&header.escrow_ephemeral_public_key)?;
        let mut key = hmac_sha256(shared.as_bytes(), ESCROW_LABEL);
        let result = decrypt(&key, &header.escrow_iv, &header.escrow_ciphertext, &[]);
        key.zeroize();

        let mut raw = result?;
        let key_bytes: Result<[u8; 32], _> = raw.as_slice().try_into();
        raw.zeroize();
        let key_bytes = key_bytes
            .map_err(|_| MessengerError::invalid("escrowed key has the wrong length"))?;

        Ok(MessageKey::from_parts(key_bytes, header.message_number))
    }

    /// Decrypt a message without any session state.
    pub fn decrypt(&self, envelope: &Envelope) -> Result<String, MessengerError> {
        envelope.header.check_structure()?;
        let message_key = self.recover_message_key(&envelope.header)?;
        let plaintext = decrypt(
            message_key.key(),
            &envelope.header.per_message_iv,
            &envelope.ciphertext,
            &envelope.header.associated_data()?,
        )?;

        tracing::debug!(
            ratchet_key = %envelope.header.sender_ephemeral_public_key.fingerprint(),
            message_number = envelope.header.message_number,
            "escrow recovered message"
        );

        String::from_utf8(plaintext)
            .map_err(|_| MessengerError::invalid("plaintext is not valid UTF-8"))
    }
}

impl std::fmt::Debug for EscrowAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowAuthority").field("public_key", self.public_key()).finish()
    }
}
