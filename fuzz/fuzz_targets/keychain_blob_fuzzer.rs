//! Fuzz target for serialized keychain loading
//!
//! # Strategy
//!
//! - Arbitrary blobs with a trusted digest that does not match
//! - Arbitrary blobs with their own digest (parse and decrypt paths)
//!
//! # Invariants
//!
//! - Loading never panics
//! - A digest mismatch is always `Integrity`, checked before parsing
//! - A blob that loads reports consistent record counts

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tessera_core::{keychain::digest, Keychain, KeychainConfig, KeychainError, SeededEnv};

#[derive(Debug, Clone, Arbitrary)]
struct Input {
    blob: String,
    password: String,
    use_own_digest: bool,
}

fuzz_target!(|input: Input| {
    if input.password.is_empty() || input.password.len() > 64 {
        return;
    }

    let own = digest(&input.blob);
    let trusted = if input.use_own_digest { own.clone() } else { format!("x{own}") };

    let result = Keychain::load_with_config(
        SeededEnv::new(0),
        &input.password,
        &input.blob,
        Some(&trusted),
        KeychainConfig::default(),
    );

    match result {
        Ok(keychain) => {
            assert!(input.use_own_digest, "mismatched digest must not load");
            assert_eq!(keychain.is_empty(), keychain.len() == 0);
        },
        Err(KeychainError::Integrity) => {
            assert!(!input.use_own_digest, "matching digest must pass the integrity check");
        },
        Err(_) => {
            assert!(input.use_own_digest, "digest is checked before parsing");
        },
    }
});
