//! Property tests for symmetric envelopes and the key store

use proptest::prelude::*;
use relaynet_crypto::{
    decrypt_symmetric, encrypt_symmetric, CryptoError, SessionKeyStore, SharedSecret,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn symmetric_roundtrip(
        plaintext in proptest::collection::vec(any::<u8>(), 0..1024),
        secret in any::<[u8; 32]>(),
    ) {
        let s = SharedSecret::from_bytes(secret);
        let envelope = encrypt_symmetric(&s, &plaintext).unwrap();
        prop_assert_eq!(decrypt_symmetric(&s, &envelope).unwrap(), plaintext);
    }

    #[test]
    fn wrong_secret_never_decrypts(
        plaintext in proptest::collection::vec(any::<u8>(), 0..256),
        secret in any::<[u8; 32]>(),
        other in any::<[u8; 32]>(),
    ) {
        prop_assume!(secret != other);
        let envelope = encrypt_symmetric(&SharedSecret::from_bytes(secret), &plaintext).unwrap();
        let result = decrypt_symmetric(&SharedSecret::from_bytes(other), &envelope);
        prop_assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }
}

#[test_log::test]
fn keystore_secrets_are_shared_between_peers() {
    let alice = SessionKeyStore::generate();
    let bob = SessionKeyStore::generate();

    let a = alice.derive_node_shared_secret(bob.node_public_key());
    let b = bob.derive_node_shared_secret(alice.node_public_key());

    let sealed = alice
        .encrypt_under_secret("xchacha20-hmac-sha256", &a, b"route offer")
        .unwrap();
    let opened = bob
        .decrypt_under_secret("xchacha20-hmac-sha256", &b, &sealed)
        .unwrap();
    assert_eq!(opened, b"route offer");
}

#[test_log::test]
fn keystore_rejects_tampered_envelope() {
    let alice = SessionKeyStore::generate();
    let bob = SessionKeyStore::generate();

    let a = alice.derive_node_shared_secret(bob.node_public_key());
    let b = bob.derive_node_shared_secret(alice.node_public_key());

    let mut sealed = alice
        .encrypt_under_secret("xchacha20-hmac-sha256", &a, b"route offer")
        .unwrap();
    let last = sealed.len() - 1;
    sealed[last] ^= 0x80;

    let err = bob
        .decrypt_under_secret("xchacha20-hmac-sha256", &b, &sealed)
        .unwrap_err();
    assert!(err.is_integrity_failure() || matches!(err, CryptoError::MalformedEnvelope(_)));
}

#[test]
fn asymmetric_bootstrap_roundtrip() {
    let store = SessionKeyStore::generate();
    let sealed = relaynet_crypto::encrypt_asymmetric(store.node_public_key(), b"otk").unwrap();
    assert_eq!(store.decrypt_with_node_key(&sealed).unwrap(), b"otk");
}
