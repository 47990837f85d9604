//! Authenticated encryption using AES-256-GCM
//!
//! All functions are pure - the IV must be provided by the caller. Every
//! (key, IV) pair must be used at most once; callers draw IVs from a CSPRNG.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};

use crate::error::CryptoError;

/// AES-256 key size (32 bytes)
pub const KEY_SIZE: usize = 32;

/// GCM IV size (12 bytes)
pub const IV_SIZE: usize = 12;

/// GCM authentication tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under `key` and `iv`, binding `aad` as associated
/// data.
///
/// Returns ciphertext with the 16-byte tag appended.
pub fn encrypt(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE], plaintext: &[u8], aad: &[u8]) -> Vec<u8> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(iv), Payload { msg: plaintext, aad })
    else {
        unreachable!("AES-256-GCM encryption cannot fail for in-memory buffers");
    };

    ciphertext
}

/// Decrypt and verify `ciphertext` produced by [`encrypt`].
///
/// # Errors
///
/// - `AuthenticationFailed`: wrong key, wrong IV, modified ciphertext or
///   modified associated data
pub fn decrypt(
    key: &[u8; KEY_SIZE],
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    cipher
        .decrypt(Nonce::from_slice(iv), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_SIZE] = [0x42; KEY_SIZE];
    const IV: [u8; IV_SIZE] = [0x07; IV_SIZE];

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let ciphertext = encrypt(&KEY, &IV, b"Hello, World!", b"header");
        let plaintext = decrypt(&KEY, &IV, &ciphertext, b"header").unwrap();
        assert_eq!(plaintext, b"Hello, World!");
    }

    #[test]
    fn ciphertext_carries_tag() {
        let ciphertext = encrypt(&KEY, &IV, b"test message", b"");
        assert_eq!(ciphertext.len(), b"test message".len() + TAG_SIZE);
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let ciphertext = encrypt(&KEY, &IV, b"", b"aad");
        assert_eq!(decrypt(&KEY, &IV, &ciphertext, b"aad").unwrap(), b"");
    }

    #[test]
    fn wrong_key_fails() {
        let ciphertext = encrypt(&KEY, &IV, b"secret", b"");
        let result = decrypt(&[0x43; KEY_SIZE], &IV, &ciphertext, b"");
        assert_eq!(result, Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn wrong_iv_fails() {
        let ciphertext = encrypt(&KEY, &IV, b"secret", b"");
        let result = decrypt(&KEY, &[0x08; IV_SIZE], &ciphertext, b"");
        assert_eq!(result, Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn modified_aad_fails() {
        let ciphertext = encrypt(&KEY, &IV, b"secret", b"messageNumber:1");
        let result = decrypt(&KEY, &IV, &ciphertext, b"messageNumber:2");
        assert_eq!(result, Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut ciphertext = encrypt(&KEY, &IV, b"original message", b"");
        ciphertext[0] ^= 0xFF;
        assert!(decrypt(&KEY, &IV, &ciphertext, b"").is_err());
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let ciphertext = encrypt(&KEY, &IV, b"original message", b"");
        assert!(decrypt(&KEY, &IV, &ciphertext[..TAG_SIZE - 1], b"").is_err());
    }
}
