//! Error types for cryptographic operations

use thiserror::Error;

/// Errors from cryptographic primitives
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// AEAD authentication failed (wrong key, wrong IV, or tampering)
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Key or buffer had the wrong length
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        actual: usize,
    },

    /// Base64 or other textual encoding could not be decoded
    #[error("invalid encoding: {reason}")]
    InvalidEncoding {
        /// Decoder message
        reason: String,
    },

    /// Public key could not be parsed
    #[error("invalid public key: {reason}")]
    InvalidKey {
        /// Parser message
        reason: String,
    },

    /// X25519 produced an all-zero shared secret (low-order peer key)
    #[error("non-contributory key agreement")]
    NonContributory,

    /// Signature did not verify under the authority key
    #[error("signature verification failed")]
    InvalidSignature,

    /// Chain counter would overflow
    #[error("chain counter overflow at {current}")]
    CounterOverflow {
        /// Counter value when overflow was detected
        current: u32,
    },
}

impl CryptoError {
    /// Returns true if this error came from AEAD tag verification.
    ///
    /// Tag failures are the only errors consistent with key desynchronization;
    /// everything else indicates malformed input.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed)
    }
}
