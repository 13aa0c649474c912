//! Symmetric encrypt-then-MAC envelopes keyed by an ECDH shared secret
//!
//! The shared secret is never used directly: an encryption key and a MAC
//! key are derived from it with HMAC-SHA256 under distinct labels. The
//! plaintext is XChaCha20 stream-ciphered under a fresh random 24-byte nonce
//! and the tag is HMAC-SHA256 over `nonce || ciphertext`.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::XChaCha20;
use hmac::{Hmac, Mac};
use prost::Message as _;
use rand::RngCore;
use secp256k1::{ecdh, PublicKey, SecretKey};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, Result};

/// HMAC-SHA256 for message authentication
pub type HmacSha256 = Hmac<Sha256>;

/// XChaCha20 nonce size
pub const NONCE_SIZE: usize = 24;

/// HMAC-SHA256 tag size
pub const TAG_SIZE: usize = 32;

/// Shared secret size
pub const SECRET_SIZE: usize = 32;

/// Largest plaintext accepted by [`encrypt_symmetric`] (16 MiB)
pub const MAX_PLAINTEXT_SIZE: usize = 16 * 1024 * 1024;

/// Domain separation labels for subkey derivation
mod label {
    pub const ENCRYPTION_KEY: &[u8] = b"RelayNet_v1_EnvelopeEncKey";
    pub const MAC_KEY: &[u8] = b"RelayNet_v1_EnvelopeMacKey";
}

/// A shared secret derived from ECDH, zeroized on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SECRET_SIZE]);

impl SharedSecret {
    /// Create a shared secret from raw bytes
    pub fn from_bytes(bytes: [u8; SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the secret bytes
    pub fn as_bytes(&self) -> &[u8; SECRET_SIZE] {
        &self.0
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        // constant time
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for SharedSecret {}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Wire form of a symmetric envelope
#[derive(Clone, PartialEq, prost::Message)]
pub struct Envelope {
    /// Stream-ciphered payload
    #[prost(bytes = "vec", tag = "1")]
    pub ciphertext: Vec<u8>,
    /// Random per-message nonce
    #[prost(bytes = "vec", tag = "2")]
    pub nonce: Vec<u8>,
    /// HMAC-SHA256 over nonce and ciphertext
    #[prost(bytes = "vec", tag = "3")]
    pub tag: Vec<u8>,
}

impl Envelope {
    /// Encode to the field-tagged wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Decode from the field-tagged wire format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::decode(bytes)?)
    }
}

/// ECDH over secp256k1. Deterministic for a given key pair.
pub fn derive_shared_secret(secret_key: &SecretKey, peer: &PublicKey) -> SharedSecret {
    SharedSecret(ecdh::SharedSecret::new(peer, secret_key).secret_bytes())
}

struct Subkeys {
    encryption: [u8; SECRET_SIZE],
    mac: [u8; SECRET_SIZE],
}

impl Drop for Subkeys {
    fn drop(&mut self) {
        self.encryption.zeroize();
        self.mac.zeroize();
    }
}

fn derive_subkey(secret: &SharedSecret, label: &[u8]) -> Result<[u8; SECRET_SIZE]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    mac.update(label);
    let mut key = [0u8; SECRET_SIZE];
    key.copy_from_slice(&mac.finalize().into_bytes());
    Ok(key)
}

fn subkeys(secret: &SharedSecret) -> Result<Subkeys> {
    Ok(Subkeys {
        encryption: derive_subkey(secret, label::ENCRYPTION_KEY)?,
        mac: derive_subkey(secret, label::MAC_KEY)?,
    })
}

fn tag_mac(mac_key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    mac.update(nonce);
    mac.update(ciphertext);
    Ok(mac)
}

fn apply_keystream(key: &[u8], nonce: &[u8], buffer: &mut [u8]) -> Result<()> {
    let mut cipher = XChaCha20::new_from_slices(key, nonce)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    cipher.apply_keystream(buffer);
    Ok(())
}

/// Encrypt `plaintext` under `secret` with a freshly generated nonce.
pub fn encrypt_symmetric(secret: &SharedSecret, plaintext: &[u8]) -> Result<Envelope> {
    if plaintext.len() > MAX_PLAINTEXT_SIZE {
        return Err(CryptoError::MessageTooLarge {
            size: plaintext.len(),
            max: MAX_PLAINTEXT_SIZE,
        });
    }

    let keys = subkeys(secret)?;

    let mut nonce = vec![0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut ciphertext = plaintext.to_vec();
    apply_keystream(&keys.encryption, &nonce, &mut ciphertext)?;

    let tag = tag_mac(&keys.mac, &nonce, &ciphertext)?
        .finalize()
        .into_bytes()
        .to_vec();

    Ok(Envelope {
        ciphertext,
        nonce,
        tag,
    })
}

/// Verify the envelope tag and decrypt.
///
/// Fails with [`CryptoError::AuthenticationFailed`] before touching the
/// ciphertext if the tag does not match.
pub fn decrypt_symmetric(secret: &SharedSecret, envelope: &Envelope) -> Result<Vec<u8>> {
    if envelope.nonce.len() != NONCE_SIZE {
        return Err(CryptoError::MalformedEnvelope(format!(
            "nonce must be {} bytes, got {}",
            NONCE_SIZE,
            envelope.nonce.len()
        )));
    }

    let keys = subkeys(secret)?;

    tag_mac(&keys.mac, &envelope.nonce, &envelope.ciphertext)?
        .verify_slice(&envelope.tag)
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    let mut plaintext = envelope.ciphertext.clone();
    apply_keystream(&keys.encryption, &envelope.nonce, &mut plaintext)?;
    Ok(plaintext)
}
