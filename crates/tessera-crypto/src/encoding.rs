//! Base64 encoding for binary wire fields.
//!
//! All keys, IVs and ciphertexts cross the wire and the keychain blob as
//! standard base64 with padding.

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::error::CryptoError;

/// Encode bytes as standard base64.
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64.
pub fn decode(text: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD.decode(text).map_err(|e| CryptoError::InvalidEncoding { reason: e.to_string() })
}

/// Decode standard base64 into a fixed-size array.
pub fn decode_array<const N: usize>(text: &str) -> Result<[u8; N], CryptoError> {
    let bytes = decode(text)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| CryptoError::InvalidLength { expected: N, actual })
}

/// Serde adapter storing byte buffers and arrays as base64 strings.
///
/// Use with `#[serde(with = "tessera_crypto::encoding::base64_bytes")]` on
/// `Vec<u8>` or `[u8; N]` fields.
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    /// Serialize as a base64 string.
    pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&super::encode(value))
    }

    /// Deserialize from a base64 string, checking the length for arrays.
    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<Vec<u8>>,
    {
        let text = String::deserialize(deserializer)?;
        let bytes = super::decode(&text).map_err(D::Error::custom)?;
        let actual = bytes.len();
        T::try_from(bytes)
            .map_err(|_| D::Error::custom(format!("unexpected byte length {actual}")))
    }
}
