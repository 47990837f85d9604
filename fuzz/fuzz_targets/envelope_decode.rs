//! Fuzz target for relay envelope decoding
//!
//! # Strategy
//!
//! - Arbitrary bytes interpreted as envelope JSON
//! - Decoded envelopes fed to a messenger that knows the claimed sender
//!
//! # Invariants
//!
//! - Decoding never panics
//! - A decoded envelope re-encodes and decodes to itself
//! - Receiving a forged envelope returns an error, never plaintext

#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_core::{Envelope, Messenger, MessengerConfig, SeededEnv};
use tessera_crypto::{AuthoritySigner, KeyPair};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(envelope) = Envelope::from_json(text) else {
        return;
    };

    let encoded = envelope.to_json().expect("decoded envelope must re-encode");
    let decoded = Envelope::from_json(&encoded).expect("re-encoded envelope must decode");
    assert_eq!(decoded, envelope, "envelope JSON must roundtrip");

    let config = MessengerConfig::new(
        AuthoritySigner::from_secret_bytes(&[1u8; 32]).authority_key(),
        *KeyPair::from_secret_bytes([2u8; 32]).public(),
    );
    let env = SeededEnv::new(0);
    let mut bob = Messenger::new(env.clone(), config.clone());
    let mut mallory = Messenger::new(env, config);
    bob.generate_certificate("bob").expect("bob certificate");
    let forged = mallory.generate_certificate("mallory").expect("mallory certificate");
    bob.receive_certificate(forged, None).expect("trust on first use");

    assert!(
        bob.receive_message("mallory", &envelope).is_err(),
        "fuzzed envelope must not authenticate"
    );
});
