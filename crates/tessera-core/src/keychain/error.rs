//! Error types for keychain operations

use thiserror::Error;

/// Errors from keychain operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeychainError {
    /// Caller supplied an unusable argument or the blob is malformed
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What was wrong
        reason: String,
    },

    /// Password check failed against an existing record
    #[error("incorrect password")]
    Authentication,

    /// Serialized blob does not match the trusted digest
    #[error("integrity check failed: keychain data may have been tampered with")]
    Integrity,

    /// A single record failed AEAD verification
    #[error("failed to decrypt value for '{name}'")]
    Decryption {
        /// Name that was looked up
        name: String,
    },

    /// Password or value exceeds its fixed bound
    #[error("length {actual} exceeds maximum of {max} bytes")]
    Length {
        /// Maximum allowed length in bytes
        max: usize,
        /// Actual length in bytes
        actual: usize,
    },
}

impl KeychainError {
    /// Returns true if the whole store must be rejected.
    ///
    /// `Decryption` is scoped to one record; other records stay readable.
    pub fn is_store_level(&self) -> bool {
        matches!(self, Self::Authentication | Self::Integrity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tamper_and_password_errors_are_store_level() {
        assert!(KeychainError::Integrity.is_store_level());
        assert!(KeychainError::Authentication.is_store_level());
        assert!(!KeychainError::Decryption { name: "a".to_string() }.is_store_level());
        assert!(!KeychainError::Length { max: 64, actual: 65 }.is_store_level());
    }

    #[test]
    fn error_display() {
        let err = KeychainError::Length { max: 64, actual: 70 };
        assert_eq!(err.to_string(), "length 70 exceeds maximum of 64 bytes");
        assert_eq!(KeychainError::Authentication.to_string(), "incorrect password");
    }
}
