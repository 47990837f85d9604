//! Key derivation: HMAC, two-output HKDF, PBKDF2 and SHA-256
//!
//! The HKDF pair mirrors the ratchet's root-key step: the input key is first
//! conditioned through HMAC, and two distinct salts derived from the salt key
//! yield two independent 32-byte outputs from one call.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

/// Label conditioning the HKDF input key material
const IKM_LABEL: &[u8] = b"0";

/// Label for the first HKDF salt
const FIRST_SALT_LABEL: &[u8] = b"salt1";

/// Label for the second HKDF salt
const SECOND_SALT_LABEL: &[u8] = b"salt2";

/// Compute HMAC-SHA256 over `data` keyed with `key`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Derive two 32-byte keys from `input_key` and `salt_key` under `info`.
///
/// ```text
/// ikm    = HMAC(input_key, "0")
/// salt_i = HMAC(salt_key, "salt1" | "salt2")
/// out_i  = HKDF-SHA256(salt_i, ikm, info)
/// ```
///
/// The ratchet uses the first output as the next root key and the second as
/// a fresh chain key.
pub fn hkdf_pair(input_key: &[u8], salt_key: &[u8], info: &[u8]) -> ([u8; 32], [u8; 32]) {
    let mut ikm = hmac_sha256(input_key, IKM_LABEL);
    let first_salt = hmac_sha256(salt_key, FIRST_SALT_LABEL);
    let second_salt = hmac_sha256(salt_key, SECOND_SALT_LABEL);

    let first = hkdf_expand(&first_salt, &ikm, info);
    let second = hkdf_expand(&second_salt, &ikm, info);

    ikm.zeroize();
    (first, second)
}

fn hkdf_expand(salt: &[u8], ikm: &[u8], info: &[u8]) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; 32];
    let Ok(()) = hkdf.expand(info, &mut okm) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    okm
}

/// Derive a 256-bit secret from a password with PBKDF2-HMAC-SHA256.
pub fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut output = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut output);
    output
}

/// SHA-256 digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}
