//! Property-based tests for the crypto primitives
//!
//! 1. **Round-trip**: decrypt(encrypt(m)) == m for all messages and AAD
//! 2. **Key uniqueness**: different chain counters produce different keys
//! 3. **Determinism**: same chain key always produces the same sequence
//! 4. **Binding**: any change to associated data breaks decryption

use proptest::prelude::*;
use tessera_crypto::{ChainRatchet, KeyPair, decrypt, encrypt, hkdf_pair};

fn key_strategy() -> impl Strategy<Value = [u8; 32]> {
    prop::collection::vec(any::<u8>(), 32..=32).prop_map(|v| {
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&v);
        arr
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_aead_roundtrip(
        key in key_strategy(),
        iv in any::<[u8; 12]>(),
        plaintext in prop::collection::vec(any::<u8>(), 0..1000),
        aad in prop::collection::vec(any::<u8>(), 0..200),
    ) {
        let ciphertext = encrypt(&key, &iv, &plaintext, &aad);
        let decrypted = decrypt(&key, &iv, &ciphertext, &aad).unwrap();
        prop_assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn prop_aad_flip_breaks_decryption(
        key in key_strategy(),
        plaintext in prop::collection::vec(any::<u8>(), 0..100),
        aad in prop::collection::vec(any::<u8>(), 1..100),
        flip in any::<prop::sample::Index>(),
    ) {
        let iv = [0u8; 12];
        let ciphertext = encrypt(&key, &iv, &plaintext, &aad);

        let mut tampered = aad.clone();
        let position = flip.index(tampered.len());
        tampered[position] ^= 0x01;

        prop_assert!(decrypt(&key, &iv, &ciphertext, &tampered).is_err());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_chain_keys_unique(seed in key_strategy(), num_keys in 2usize..20) {
        let mut chain = ChainRatchet::new(seed);
        let keys: Vec<_> = (0..num_keys).map(|_| chain.advance().unwrap()).collect();

        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                prop_assert_ne!(
                    keys[i].key(),
                    keys[j].key(),
                    "keys at counter {} and {} must be different",
                    keys[i].counter(),
                    keys[j].counter()
                );
            }
        }
    }

    #[test]
    fn prop_chain_deterministic(seed in key_strategy(), num_advances in 1usize..10) {
        let mut chain1 = ChainRatchet::new(seed);
        let mut chain2 = ChainRatchet::new(seed);

        for _ in 0..num_advances {
            prop_assert_eq!(chain1.advance().unwrap(), chain2.advance().unwrap());
        }
    }

    #[test]
    fn prop_dh_then_hkdf_agrees(alice_seed in key_strategy(), bob_seed in key_strategy()) {
        let alice = KeyPair::from_secret_bytes(alice_seed);
        let bob = KeyPair::from_secret_bytes(bob_seed);
        prop_assume!(alice.public() != bob.public());

        let ab = alice.diffie_hellman(bob.public()).unwrap();
        let ba = bob.diffie_hellman(alice.public()).unwrap();

        let left = hkdf_pair(ab.as_bytes(), ab.as_bytes(), b"ratchet-init");
        let right = hkdf_pair(ba.as_bytes(), ba.as_bytes(), b"ratchet-init");
        prop_assert_eq!(left, right);
    }
}
