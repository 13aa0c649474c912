//! Session key store
//!
//! Holds the node's long-lived signing key, short-lived ephemeral key pairs
//! and ECDH secrets derived from them. Everything is addressed by opaque
//! random ids; private material never leaves this module, only signatures,
//! public keys and ciphertexts do.
//!
//! Entries are never expired here. Rotation is a caller policy, supported by
//! [`SessionKeyStore::discard_ephemeral_key`] and
//! [`SessionKeyStore::discard_secret`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use parking_lot::Mutex;
use secp256k1::PublicKey;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CryptoError, Result};
use crate::signing::{Digest, SigningKeyPair};
use crate::symmetric::{decrypt_symmetric, encrypt_symmetric, Envelope, SharedSecret};

/// Identifier of an ephemeral key pair
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyId(String);

/// Identifier of a cached shared secret
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SecretId(String);

macro_rules! opaque_id {
    ($name:ident) => {
        impl $name {
            fn random() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Wrap an id received from a caller
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get as string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

opaque_id!(KeyId);
opaque_id!(SecretId);

/// Symmetric algorithms understood by the key store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymmetricAlgorithm {
    /// XChaCha20 stream cipher with an HMAC-SHA256 tag (encrypt-then-MAC)
    XChaCha20HmacSha256,
}

impl SymmetricAlgorithm {
    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            SymmetricAlgorithm::XChaCha20HmacSha256 => "xchacha20-hmac-sha256",
        }
    }
}

impl Default for SymmetricAlgorithm {
    fn default() -> Self {
        Self::XChaCha20HmacSha256
    }
}

impl fmt::Display for SymmetricAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymmetricAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "xchacha20-hmac-sha256" => Ok(Self::XChaCha20HmacSha256),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

#[derive(Default)]
struct KeyStoreState {
    ephemeral: HashMap<KeyId, SigningKeyPair>,
    secrets: HashMap<SecretId, SharedSecret>,
}

impl KeyStoreState {
    /// Existing id for a byte-equal secret, or store under a new id
    fn cache_secret(&mut self, secret: SharedSecret) -> SecretId {
        if let Some((id, _)) = self.secrets.iter().find(|(_, cached)| **cached == secret) {
            return id.clone();
        }
        let id = SecretId::random();
        self.secrets.insert(id.clone(), secret);
        id
    }

    fn secret(&self, id: &SecretId) -> Result<SharedSecret> {
        self.secrets
            .get(id)
            .cloned()
            .ok_or_else(|| CryptoError::UnknownKeyId(id.to_string()))
    }
}

/// Per-node registry of key material
pub struct SessionKeyStore {
    node_key: SigningKeyPair,
    state: Mutex<KeyStoreState>,
}

impl SessionKeyStore {
    /// Create a store around the node's long-lived key
    pub fn new(node_key: SigningKeyPair) -> Self {
        Self {
            node_key,
            state: Mutex::new(KeyStoreState::default()),
        }
    }

    /// Create a store with a freshly generated node key
    pub fn generate() -> Self {
        Self::new(SigningKeyPair::generate())
    }

    /// The node's public key
    pub fn node_public_key(&self) -> &PublicKey {
        self.node_key.public_key()
    }

    /// Sign a digest with the node key
    pub fn sign_with_node_key(&self, digest: &Digest) -> Vec<u8> {
        self.node_key.sign(digest)
    }

    /// Decrypt an ECIES payload addressed to the node key
    pub fn decrypt_with_node_key(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.node_key.decrypt_asymmetric(ciphertext)
    }

    /// Generate an ephemeral key pair and return its id
    pub fn create_ephemeral_key_pair(&self) -> KeyId {
        let id = KeyId::random();
        let pair = SigningKeyPair::generate();
        self.state.lock().ephemeral.insert(id.clone(), pair);
        debug!(key_id = %id, "Created ephemeral key pair");
        id
    }

    /// Public half of an ephemeral key pair
    pub fn public_key(&self, id: &KeyId) -> Result<PublicKey> {
        self.state
            .lock()
            .ephemeral
            .get(id)
            .map(|pair| *pair.public_key())
            .ok_or_else(|| CryptoError::UnknownKeyId(id.to_string()))
    }

    /// Sign a digest with an ephemeral key
    pub fn sign_with_ephemeral_key(&self, id: &KeyId, digest: &Digest) -> Result<Vec<u8>> {
        self.state
            .lock()
            .ephemeral
            .get(id)
            .map(|pair| pair.sign(digest))
            .ok_or_else(|| CryptoError::UnknownKeyId(id.to_string()))
    }

    /// ECDH between an ephemeral key and `peer`, cached.
    ///
    /// Deriving a secret that is already cached (byte-equal) returns the
    /// existing id.
    pub fn derive_and_cache_shared_secret(&self, id: &KeyId, peer: &PublicKey) -> Result<SecretId> {
        let mut state = self.state.lock();
        let secret = state
            .ephemeral
            .get(id)
            .map(|pair| pair.derive_shared_secret(peer))
            .ok_or_else(|| CryptoError::UnknownKeyId(id.to_string()))?;
        Ok(state.cache_secret(secret))
    }

    /// ECDH between the node key and `peer`, cached the same way
    pub fn derive_node_shared_secret(&self, peer: &PublicKey) -> SecretId {
        let secret = self.node_key.derive_shared_secret(peer);
        self.state.lock().cache_secret(secret)
    }

    /// Encrypt under a cached secret; returns the encoded envelope
    pub fn encrypt_under_secret(
        &self,
        algorithm: &str,
        secret_id: &SecretId,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let algorithm: SymmetricAlgorithm = algorithm.parse()?;
        let secret = self.state.lock().secret(secret_id)?;

        match algorithm {
            SymmetricAlgorithm::XChaCha20HmacSha256 => {
                Ok(encrypt_symmetric(&secret, plaintext)?.to_bytes())
            }
        }
    }

    /// Decrypt an encoded envelope under a cached secret
    pub fn decrypt_under_secret(
        &self,
        algorithm: &str,
        secret_id: &SecretId,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        let algorithm: SymmetricAlgorithm = algorithm.parse()?;
        let secret = self.state.lock().secret(secret_id)?;

        match algorithm {
            SymmetricAlgorithm::XChaCha20HmacSha256 => {
                let envelope = Envelope::from_bytes(ciphertext)?;
                decrypt_symmetric(&secret, &envelope)
            }
        }
    }

    /// Forget an ephemeral key pair. Returns whether it existed.
    pub fn discard_ephemeral_key(&self, id: &KeyId) -> bool {
        self.state.lock().ephemeral.remove(id).is_some()
    }

    /// Forget a cached secret. Returns whether it existed.
    pub fn discard_secret(&self, id: &SecretId) -> bool {
        self.state.lock().secrets.remove(id).is_some()
    }

    /// Number of ephemeral key pairs held
    pub fn ephemeral_key_count(&self) -> usize {
        self.state.lock().ephemeral.len()
    }

    /// Number of cached secrets
    pub fn secret_count(&self) -> usize {
        self.state.lock().secrets.len()
    }
}

impl fmt::Debug for SessionKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SessionKeyStore")
            .field("node_key", &self.node_key)
            .field("ephemeral_keys", &state.ephemeral.len())
            .field("secrets", &state.secrets.len())
            .finish()
    }
}
