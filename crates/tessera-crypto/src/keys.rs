//! X25519 key agreement
//!
//! Static identity keys and per-chain ephemeral ratchet keys share one type.
//! Secrets are constructed from caller-supplied random bytes and can be
//! exported for state snapshots.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use x25519_dalek::StaticSecret;
use zeroize::Zeroize;

use crate::{encoding, error::CryptoError, kdf::sha256};

/// X25519 public key.
///
/// Serialized as base64. Equality is byte equality, which is what the ratchet
/// uses to detect a new peer ephemeral key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a base64-encoded key.
    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        encoding::decode_array(text).map(Self)
    }

    /// Base64 encoding of the key.
    pub fn to_base64(&self) -> String {
        encoding::encode(self.0)
    }

    /// Short hex fingerprint for logs.
    pub fn fingerprint(&self) -> String {
        hex::encode(&sha256(&self.0)[..8])
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_base64(&text).map_err(D::Error::custom)
    }
}

/// X25519 shared secret, zeroized on drop.
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// X25519 key pair.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Build a key pair from 32 random bytes.
    ///
    /// Caller MUST provide cryptographically secure random bytes in
    /// production. The bytes are clamped by X25519.
    pub fn from_secret_bytes(mut bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        bytes.zeroize();
        let public = PublicKey(*x25519_dalek::PublicKey::from(&secret).as_bytes());
        Self { secret, public }
    }

    /// Public half.
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Secret bytes, for snapshotting only.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// X25519 with a peer public key.
    ///
    /// # Errors
    ///
    /// - `NonContributory`: the peer key is a low-order point and the result
    ///   would be a constant
    pub fn diffie_hellman(&self, peer: &PublicKey) -> Result<SharedSecret, CryptoError> {
        let shared = self.secret.diffie_hellman(&x25519_dalek::PublicKey::from(peer.0));
        if !shared.was_contributory() {
            return Err(CryptoError::NonContributory);
        }
        Ok(SharedSecret(shared.to_bytes()))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agreement_is_symmetric() {
        let alice = KeyPair::from_secret_bytes([1u8; 32]);
        let bob = KeyPair::from_secret_bytes([2u8; 32]);

        let ab = alice.diffie_hellman(bob.public()).unwrap();
        let ba = bob.diffie_hellman(alice.public()).unwrap();
        assert_eq!(ab.as_bytes(), ba.as_bytes());
    }

    #[test]
    fn different_peers_give_different_secrets() {
        let alice = KeyPair::from_secret_bytes([1u8; 32]);
        let bob = KeyPair::from_secret_bytes([2u8; 32]);
        let carol = KeyPair::from_secret_bytes([3u8; 32]);

        let ab = alice.diffie_hellman(bob.public()).unwrap();
        let ac = alice.diffie_hellman(carol.public()).unwrap();
        assert_ne!(ab.as_bytes(), ac.as_bytes());
    }

    #[test]
    fn low_order_point_is_rejected() {
        let alice = KeyPair::from_secret_bytes([1u8; 32]);
        let identity_point = PublicKey::from_bytes([0u8; 32]);
        assert!(matches!(
            alice.diffie_hellman(&identity_point),
            Err(CryptoError::NonContributory)
        ));
    }

    #[test]
    fn secret_bytes_restore_same_pair() {
        let original = KeyPair::from_secret_bytes([9u8; 32]);
        let restored = KeyPair::from_secret_bytes(original.secret_bytes());
        assert_eq!(original.public(), restored.public());
    }

    #[test]
    fn public_key_base64_roundtrip() {
        let pair = KeyPair::from_secret_bytes([5u8; 32]);
        let text = pair.public().to_base64();
        assert_eq!(PublicKey::from_base64(&text).unwrap(), *pair.public());
    }

    #[test]
    fn public_key_rejects_short_input() {
        let text = encoding::encode([1u8; 31]);
        assert!(matches!(
            PublicKey::from_base64(&text),
            Err(CryptoError::InvalidLength { expected: 32, actual: 31 })
        ));
    }

    #[test]
    fn fingerprint_is_short_hex() {
        let pair = KeyPair::from_secret_bytes([5u8; 32]);
        let fingerprint = pair.public().fingerprint();
        assert_eq!(fingerprint.len(), 16);
        assert!(fingerprint.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}
