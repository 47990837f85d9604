//! Serialized keychain layout and derived key material

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tessera_crypto::{IV_SIZE, encoding::base64_bytes, hmac_sha256, pbkdf2_sha256};
use zeroize::Zeroize;

/// Salt length for PBKDF2
pub const SALT_SIZE: usize = 16;

/// Label deriving the AES-256-GCM key from the master secret
const ENC_LABEL: &[u8] = b"enc";

/// Label deriving the blind-index HMAC key from the master secret
const DOMAIN_LABEL: &[u8] = b"domain";

/// One encrypted value. The lookup tag is the map key in [`StoreRepr`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeychainRecord {
    /// Fresh random IV per write
    #[serde(with = "base64_bytes")]
    pub iv: [u8; IV_SIZE],
    /// AES-256-GCM ciphertext of the zero-padded value, tag appended
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

/// Persisted form: `{"records": {<b64 tag>: record}, "salt": <b64>}`.
///
/// `BTreeMap` keeps record order stable so the digest of the JSON is
/// canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRepr {
    /// Records keyed by base64 lookup tag
    pub records: BTreeMap<String, KeychainRecord>,
    /// PBKDF2 salt
    #[serde(with = "base64_bytes")]
    pub salt: [u8; SALT_SIZE],
}

/// Keys derived from the master secret. Never persisted.
#[derive(Clone)]
pub struct DerivedKeys {
    /// AES-256-GCM key for record values
    pub enc_key: [u8; 32],
    /// HMAC key for lookup tags
    pub domain_key: [u8; 32],
}

impl DerivedKeys {
    /// Run PBKDF2 over the password and split the master secret.
    pub fn derive(password: &str, salt: &[u8; SALT_SIZE], iterations: u32) -> Self {
        let mut master = pbkdf2_sha256(password.as_bytes(), salt, iterations);
        let keys = Self {
            enc_key: hmac_sha256(&master, ENC_LABEL),
            domain_key: hmac_sha256(&master, DOMAIN_LABEL),
        };
        master.zeroize();
        keys
    }

    /// Blind index for `name`.
    pub fn lookup_tag(&self, name: &str) -> [u8; 32] {
        hmac_sha256(&self.domain_key, name.as_bytes())
    }
}

impl Drop for DerivedKeys {
    fn drop(&mut self) {
        self.enc_key.zeroize();
        self.domain_key.zeroize();
    }
}
