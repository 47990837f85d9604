//! Error types for messenger operations

use tessera_crypto::CryptoError;
use thiserror::Error;

/// Errors from certificate handling and ratchet sessions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessengerError {
    /// Structurally invalid argument, header or envelope
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What was wrong
        reason: String,
    },

    /// AEAD verification failed for a message
    #[error("decryption failed: {reason}")]
    Decryption {
        /// Context for the failure
        reason: String,
    },

    /// Message id was already decrypted once
    #[error("replay detected: message {message_number} from ratchet key {ratchet_key}")]
    Replay {
        /// Fingerprint of the sender's ratchet key
        ratchet_key: String,
        /// Counter on that ratchet chain
        message_number: u32,
    },

    /// Certificate missing, unsigned under a strict policy, or badly signed
    #[error("certificate error: {reason}")]
    Certificate {
        /// What was wrong
        reason: String,
    },

    /// Operation needs session state that is absent or inconsistent
    #[error("session error: {reason}")]
    Session {
        /// What was wrong
        reason: String,
    },
}

impl MessengerError {
    /// Returns true if the failure is consistent with ratchet state drifting
    /// out of sync with the peer.
    ///
    /// Only AEAD failures qualify. Malformed headers, replays and missing
    /// certificates never trigger session recovery.
    pub fn is_desync(&self) -> bool {
        matches!(self, Self::Decryption { .. })
    }

    pub(crate) fn session(reason: impl Into<String>) -> Self {
        Self::Session { reason: reason.into() }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput { reason: reason.into() }
    }
}

impl From<CryptoError> for MessengerError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthenticationFailed => {
                Self::Decryption { reason: "message authentication failed".to_string() }
            },
            CryptoError::InvalidSignature => {
                Self::Certificate { reason: "invalid certificate signature".to_string() }
            },
            CryptoError::CounterOverflow { current } => {
                Self::Session { reason: format!("chain counter exhausted at {current}") }
            },
            other => Self::InvalidInput { reason: other.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_decryption_is_desync() {
        assert!(MessengerError::Decryption { reason: "x".to_string() }.is_desync());
        assert!(!MessengerError::session("x").is_desync());
        assert!(!MessengerError::invalid("x").is_desync());
        assert!(
            !MessengerError::Replay { ratchet_key: "ab".to_string(), message_number: 1 }
                .is_desync()
        );
    }

    #[test]
    fn crypto_errors_map_to_layer() {
        assert!(MessengerError::from(CryptoError::AuthenticationFailed).is_desync());
        assert!(matches!(
            MessengerError::from(CryptoError::NonContributory),
            MessengerError::InvalidInput { .. }
        ));
        assert!(matches!(
            MessengerError::from(CryptoError::InvalidSignature),
            MessengerError::Certificate { .. }
        ));
    }
}
