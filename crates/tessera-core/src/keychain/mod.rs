//! Password-derived encrypted key-value store
//!
//! Persists named secrets under one master password with blind indexing and
//! tamper evidence. Independent of the messenger; the client layer uses it to
//! persist protocol state and message history.
//!
//! # Key Hierarchy
//!
//! ```text
//! password + salt
//!        │
//!        ▼ PBKDF2-HMAC-SHA256
//! master secret (never stored)
//!        │
//!        ├─ HMAC(master, "enc")    → AES-256-GCM value key
//!        └─ HMAC(master, "domain") → lookup tag key
//! ```
//!
//! # Security Properties
//!
//! - Blind Index: the serialized store contains only `HMAC(domainKey, name)`
//!   tags and ciphertexts, never a plaintext name
//! - Length Hiding: values are zero-padded to a fixed bound before encryption
//! - Swap Resistance: each record's tag is its AEAD associated data, so a
//!   ciphertext moved under another tag fails to decrypt
//! - Tamper Evidence: `dump()` returns a SHA-256 digest the caller stores in
//!   trusted storage and hands back to `load()`
//!
//! # Concurrency
//!
//! The keychain holds no locks. Read-modify-write sequences on one name must
//! be serialized by the caller; `&mut self` on `set`/`remove` enforces this
//! within a process.

mod error;
mod record;

use tessera_crypto::{IV_SIZE, decrypt, encoding, encrypt, sha256};

pub use self::error::KeychainError;
use self::record::DerivedKeys;
pub use self::record::{KeychainRecord, SALT_SIZE, StoreRepr};
use crate::env::Environment;

/// Maximum password length in bytes
pub const MAX_PASSWORD_LEN: usize = 64;

/// Lowest PBKDF2 iteration count accepted
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// Default padding bound for values
pub const DEFAULT_MAX_VALUE_LEN: usize = 4096;

/// Padding byte; values may not contain it
const PAD_BYTE: u8 = 0;

/// Keychain tuning. The same config must be used to `load` a store that was
/// created with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeychainConfig {
    /// PBKDF2 iterations (at least [`MIN_PBKDF2_ITERATIONS`])
    pub pbkdf2_iterations: u32,
    /// Every value is padded to exactly this many bytes
    pub max_value_len: usize,
}

impl Default for KeychainConfig {
    fn default() -> Self {
        Self { pbkdf2_iterations: MIN_PBKDF2_ITERATIONS, max_value_len: DEFAULT_MAX_VALUE_LEN }
    }
}

impl KeychainConfig {
    fn validate(&self) -> Result<(), KeychainError> {
        if self.pbkdf2_iterations < MIN_PBKDF2_ITERATIONS {
            return Err(KeychainError::InvalidInput {
                reason: format!(
                    "pbkdf2 iterations {} below minimum {MIN_PBKDF2_ITERATIONS}",
                    self.pbkdf2_iterations
                ),
            });
        }
        if self.max_value_len == 0 {
            return Err(KeychainError::InvalidInput {
                reason: "max value length must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Encrypted key-value store with blind-indexed names.
///
/// # Invariants
///
/// - Every key in `repr.records` equals `base64(HMAC(domain_key, name))`
///   for the name it was written under
/// - Every ciphertext decrypts to exactly `config.max_value_len` bytes
/// - `keys` are re-derived from password and salt, never serialized
#[derive(Clone)]
pub struct Keychain<E: Environment> {
    env: E,
    config: KeychainConfig,
    repr: StoreRepr,
    keys: DerivedKeys,
}

impl<E: Environment> Keychain<E> {
    /// Create an empty store with the default config.
    pub fn init(env: E, password: &str) -> Result<Self, KeychainError> {
        Self::init_with_config(env, password, KeychainConfig::default())
    }

    /// Create an empty store with a fresh random salt.
    ///
    /// # Errors
    ///
    /// - `InvalidInput`: empty password or invalid config
    /// - `Length`: password longer than [`MAX_PASSWORD_LEN`]
    pub fn init_with_config(
        env: E,
        password: &str,
        config: KeychainConfig,
    ) -> Result<Self, KeychainError> {
        validate_password(password)?;
        config.validate()?;

        let salt: [u8; SALT_SIZE] = env.random_array();
        let keys = DerivedKeys::derive(password, &salt, config.pbkdf2_iterations);

        tracing::debug!("initialized empty keychain");

        Ok(Self { env, config, repr: StoreRepr { records: Default::default(), salt }, keys })
    }

    /// Load a store with the default config.
    pub fn load(
        env: E,
        password: &str,
        blob: &str,
        expected_digest: Option<&str>,
    ) -> Result<Self, KeychainError> {
        Self::load_with_config(env, password, blob, expected_digest, KeychainConfig::default())
    }

    /// Load a store from its serialized blob.
    ///
    /// When `expected_digest` is given it is checked before anything else is
    /// parsed. If the store holds records, one is decrypted as a password
    /// check.
    ///
    /// # Errors
    ///
    /// - `Integrity`: blob does not hash to `expected_digest`
    /// - `Authentication`: password does not decrypt existing records
    /// - `InvalidInput`: malformed blob, empty password or invalid config
    /// - `Length`: password longer than [`MAX_PASSWORD_LEN`]
    pub fn load_with_config(
        env: E,
        password: &str,
        blob: &str,
        expected_digest: Option<&str>,
        config: KeychainConfig,
    ) -> Result<Self, KeychainError> {
        validate_password(password)?;
        config.validate()?;

        if let Some(expected) = expected_digest {
            if digest(blob) != expected {
                tracing::warn!("keychain digest mismatch");
                return Err(KeychainError::Integrity);
            }
        }

        let repr: StoreRepr = serde_json::from_str(blob).map_err(|e| {
            KeychainError::InvalidInput { reason: format!("malformed keychain data: {e}") }
        })?;

        let keys = DerivedKeys::derive(password, &repr.salt, config.pbkdf2_iterations);

        if let Some((tag, record)) = repr.records.iter().next() {
            let aad = encoding::decode(tag).map_err(|e| KeychainError::InvalidInput {
                reason: format!("malformed lookup tag: {e}"),
            })?;
            if decrypt(&keys.enc_key, &record.iv, &record.ciphertext, &aad).is_err() {
                tracing::warn!("keychain password check failed");
                return Err(KeychainError::Authentication);
            }
        }

        tracing::debug!(records = repr.records.len(), "loaded keychain");

        Ok(Self { env, config, repr, keys })
    }

    /// Serialize the store.
    ///
    /// Returns `(blob, digest)` where `digest = base64(SHA-256(blob))`. The
    /// caller persists both atomically and keeps the digest somewhere an
    /// attacker who can modify the blob cannot.
    pub fn dump(&self) -> Result<(String, String), KeychainError> {
        let blob = serde_json::to_string(&self.repr).map_err(|e| KeychainError::InvalidInput {
            reason: format!("failed to serialize keychain: {e}"),
        })?;
        let digest = digest(&blob);
        Ok((blob, digest))
    }

    /// Look up a value. `None` if the name was never set.
    ///
    /// # Errors
    ///
    /// - `Decryption`: this record fails AEAD verification (other records are
    ///   unaffected)
    pub fn get(&self, name: &str) -> Result<Option<String>, KeychainError> {
        validate_name(name)?;

        let tag = self.keys.lookup_tag(name);
        let Some(record) = self.repr.records.get(&encoding::encode(tag)) else {
            return Ok(None);
        };

        let padded = decrypt(&self.keys.enc_key, &record.iv, &record.ciphertext, &tag)
            .map_err(|_| KeychainError::Decryption { name: name.to_string() })?;

        let end = padded.iter().rposition(|&b| b != PAD_BYTE).map_or(0, |i| i + 1);
        let value = String::from_utf8(padded[..end].to_vec()).map_err(|_| {
            KeychainError::InvalidInput { reason: "stored value is not UTF-8".to_string() }
        })?;

        Ok(Some(value))
    }

    /// Store a value, replacing any existing record for `name`.
    ///
    /// # Errors
    ///
    /// - `Length`: value longer than `max_value_len`
    /// - `InvalidInput`: empty name or value containing NUL
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), KeychainError> {
        validate_name(name)?;

        let bytes = value.as_bytes();
        if bytes.len() > self.config.max_value_len {
            return Err(KeychainError::Length {
                max: self.config.max_value_len,
                actual: bytes.len(),
            });
        }
        if bytes.contains(&PAD_BYTE) {
            return Err(KeychainError::InvalidInput {
                reason: "value must not contain NUL".to_string(),
            });
        }

        let mut padded = vec![PAD_BYTE; self.config.max_value_len];
        padded[..bytes.len()].copy_from_slice(bytes);

        let tag = self.keys.lookup_tag(name);
        let iv: [u8; IV_SIZE] = self.env.random_array();
        let ciphertext = encrypt(&self.keys.enc_key, &iv, &padded, &tag);

        self.repr.records.insert(encoding::encode(tag), KeychainRecord { iv, ciphertext });
        Ok(())
    }

    /// Delete a value. Returns whether it existed.
    pub fn remove(&mut self, name: &str) -> Result<bool, KeychainError> {
        validate_name(name)?;
        let tag = self.keys.lookup_tag(name);
        Ok(self.repr.records.remove(&encoding::encode(tag)).is_some())
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.repr.records.len()
    }

    /// True if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.repr.records.is_empty()
    }

    /// Config this store was opened with.
    pub fn config(&self) -> &KeychainConfig {
        &self.config
    }
}

impl<E: Environment> std::fmt::Debug for Keychain<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keychain")
            .field("records", &self.repr.records.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// `base64(SHA-256(blob))`
pub fn digest(blob: &str) -> String {
    encoding::encode(sha256(blob.as_bytes()))
}

fn validate_password(password: &str) -> Result<(), KeychainError> {
    if password.is_empty() {
        return Err(KeychainError::InvalidInput {
            reason: "password must be non-empty".to_string(),
        });
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(KeychainError::Length { max: MAX_PASSWORD_LEN, actual: password.len() });
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), KeychainError> {
    if name.is_empty() {
        return Err(KeychainError::InvalidInput { reason: "name must be non-empty".to_string() });
    }
    Ok(())
}
