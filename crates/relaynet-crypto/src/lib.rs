//! # RelayNet Cryptographic Library
//!
//! Cryptographic primitives for the RelayNet overlay network.
//!
//! ## Core Components
//!
//! - [`signing`]: SHA3-256 hashing and ECDSA over secp256k1
//! - [`ecies`]: Asymmetric encryption for key exchange payloads
//! - [`symmetric`]: ECDH shared secrets and encrypt-then-MAC envelopes
//! - [`keystore`]: Per-node registry of ephemeral keys and derived secrets

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod ecies;
pub mod error;
pub mod keystore;
pub mod signing;
pub mod symmetric;

pub use error::{CryptoError, Result};
pub use keystore::{KeyId, SecretId, SessionKeyStore, SymmetricAlgorithm};
pub use secp256k1::{PublicKey, SecretKey};
pub use signing::{hash, sign, verify, Digest, SigningKeyPair};
pub use symmetric::{
    decrypt_symmetric, derive_shared_secret, encrypt_symmetric, Envelope, SharedSecret,
};

/// Encrypt to a public key (ECIES)
pub fn encrypt_asymmetric(public_key: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    ecies::encrypt(public_key, plaintext)
}

/// Decrypt an ECIES ciphertext
pub fn decrypt_asymmetric(secret_key: &SecretKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    ecies::decrypt(secret_key, ciphertext)
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{CryptoError, Result};
    pub use crate::keystore::{KeyId, SecretId, SessionKeyStore, SymmetricAlgorithm};
    pub use crate::signing::{Digest, SigningKeyPair};
    pub use crate::symmetric::{Envelope, SharedSecret};
    pub use secp256k1::{PublicKey, SecretKey};
}
