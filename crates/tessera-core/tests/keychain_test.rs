//! Keychain persistence, integrity and blinding
//!
//! Exercises the store through its public surface only: serialize, tamper
//! with the blob, reload.

use tessera_core::{
    Keychain, KeychainConfig, KeychainError, SeededEnv,
    keychain::{StoreRepr, digest},
};

const PASSWORD: &str = "password123!";

fn populated(seed: u64) -> Keychain<SeededEnv> {
    let mut keychain = Keychain::init(SeededEnv::new(seed), PASSWORD).expect("init");
    keychain.set("service1", "value1").expect("set");
    keychain.set("service2", "value2").expect("set");
    keychain.set("www.example.com", "hunter2").expect("set");
    keychain
}

#[test]
fn reload_with_correct_password_and_digest() {
    let (blob, digest) = populated(1).dump().unwrap();
    let keychain = Keychain::load(SeededEnv::new(2), PASSWORD, &blob, Some(&digest)).unwrap();

    assert_eq!(keychain.len(), 3);
    assert_eq!(keychain.get("www.example.com").unwrap().as_deref(), Some("hunter2"));
}

#[test]
fn tampered_blob_with_stale_digest_is_integrity_error() {
    let (blob, digest) = populated(3).dump().unwrap();

    let mut repr: StoreRepr = serde_json::from_str(&blob).unwrap();
    let first_tag = repr.records.keys().next().cloned().unwrap();
    repr.records.remove(&first_tag);
    let tampered = serde_json::to_string(&repr).unwrap();

    let result = Keychain::load(SeededEnv::new(4), PASSWORD, &tampered, Some(&digest));
    assert_eq!(result.err(), Some(KeychainError::Integrity));
}

#[test]
fn wrong_password_is_authentication_error() {
    let (blob, digest) = populated(5).dump().unwrap();

    let result = Keychain::load(SeededEnv::new(6), "not the password", &blob, Some(&digest));
    assert_eq!(result.err(), Some(KeychainError::Authentication));
}

#[test]
fn serialized_store_never_contains_names() {
    let names = ["service1", "service2", "www.example.com"];
    let (blob, _) = populated(7).dump().unwrap();

    for name in names {
        assert!(!blob.contains(name), "blob leaks name {name}");
    }
    assert!(!blob.contains("hunter2"));
}

#[test]
fn digest_matches_blob_hash() {
    let (blob, reported) = populated(8).dump().unwrap();
    assert_eq!(reported, digest(&blob));
}

#[test]
fn modifications_survive_reload() {
    let mut keychain = populated(9);
    assert!(keychain.remove("service1").unwrap());
    keychain.set("service2", "changed").unwrap();

    let (blob, digest) = keychain.dump().unwrap();
    let reloaded = Keychain::load(SeededEnv::new(10), PASSWORD, &blob, Some(&digest)).unwrap();

    assert_eq!(reloaded.get("service1").unwrap(), None);
    assert_eq!(reloaded.get("service2").unwrap().as_deref(), Some("changed"));
}

#[test]
fn rewriting_a_value_changes_its_ciphertext() {
    let mut keychain = populated(11);
    let (before, _) = keychain.dump().unwrap();
    keychain.set("service1", "value1").unwrap();
    let (after, _) = keychain.dump().unwrap();

    assert_ne!(before, after, "fresh IV per write");
}

#[test]
fn custom_padding_bound_applies() {
    let config = KeychainConfig { max_value_len: 16, ..KeychainConfig::default() };
    let mut keychain = Keychain::init_with_config(SeededEnv::new(12), PASSWORD, config).unwrap();

    keychain.set("short", "0123456789abcdef").unwrap();
    assert_eq!(
        keychain.set("long", "0123456789abcdefX"),
        Err(KeychainError::Length { max: 16, actual: 17 })
    );

    let (blob, digest) = keychain.dump().unwrap();
    let reloaded =
        Keychain::load_with_config(SeededEnv::new(13), PASSWORD, &blob, Some(&digest), config)
            .unwrap();
    assert_eq!(reloaded.get("short").unwrap().as_deref(), Some("0123456789abcdef"));
}

#[test]
fn truncated_salt_is_invalid_input() {
    let (blob, _) = populated(14).dump().unwrap();
    let mut value: serde_json::Value = serde_json::from_str(&blob).unwrap();
    value["salt"] = serde_json::Value::String("AAAA".to_string());

    let result = Keychain::load(SeededEnv::new(15), PASSWORD, &value.to_string(), None);
    assert!(matches!(result, Err(KeychainError::InvalidInput { .. })));
}

#[test]
fn unicode_values_roundtrip() {
    let mut keychain = Keychain::init(SeededEnv::new(16), PASSWORD).unwrap();
    keychain.set("greeting", "xin chào 👋").unwrap();
    assert_eq!(keychain.get("greeting").unwrap().as_deref(), Some("xin chào 👋"));
}
