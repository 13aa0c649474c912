//! ECIES over secp256k1 for bootstrapping key exchange payloads
//!
//! Layout: `ephemeral_public (33) || nonce (12) || AES-256-GCM ciphertext`.
//! The AES key is HKDF-SHA256 over the ECDH secret, salted with the
//! ephemeral public key. The ephemeral public key is also bound as AAD.

use aes_gcm::aead::{Aead as _, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use secp256k1::{PublicKey, SecretKey, SECP256K1};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};
use crate::signing::PUBLIC_KEY_SIZE;
use crate::symmetric::derive_shared_secret;

/// AES-256-GCM nonce size
pub const NONCE_SIZE: usize = 12;

/// AES-256-GCM tag size
pub const TAG_SIZE: usize = 16;

/// Smallest valid ciphertext (empty plaintext)
pub const MIN_CIPHERTEXT_SIZE: usize = PUBLIC_KEY_SIZE + NONCE_SIZE + TAG_SIZE;

const HKDF_INFO: &[u8] = b"RelayNet_v1_ECIES";

fn derive_key(secret_key: &SecretKey, peer: &PublicKey, salt: &[u8]) -> Result<[u8; 32]> {
    let shared = derive_shared_secret(secret_key, peer);
    let hkdf = Hkdf::<Sha256>::new(Some(salt), shared.as_bytes());
    let mut key = [0u8; 32];
    hkdf.expand(HKDF_INFO, &mut key)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    Ok(key)
}

/// Encrypt `plaintext` to `recipient`.
pub fn encrypt(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let ephemeral = SecretKey::new(&mut secp256k1::rand::thread_rng());
    let ephemeral_public = PublicKey::from_secret_key(SECP256K1, &ephemeral).serialize();

    let mut key = derive_key(&ephemeral, recipient, &ephemeral_public)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()));
    key.zeroize();
    let cipher = cipher?;

    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &ephemeral_public,
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed("AES-256-GCM failed".to_string()))?;

    let mut out = Vec::with_capacity(PUBLIC_KEY_SIZE + NONCE_SIZE + sealed.len());
    out.extend_from_slice(&ephemeral_public);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt a ciphertext produced by [`encrypt`].
pub fn decrypt(secret_key: &SecretKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < MIN_CIPHERTEXT_SIZE {
        return Err(CryptoError::DecryptionFailed(format!(
            "ciphertext too short: {} bytes",
            ciphertext.len()
        )));
    }

    let (ephemeral_public, rest) = ciphertext.split_at(PUBLIC_KEY_SIZE);
    let (nonce, sealed) = rest.split_at(NONCE_SIZE);

    let ephemeral = PublicKey::from_slice(ephemeral_public)
        .map_err(|_| CryptoError::DecryptionFailed("invalid ephemeral key".to_string()))?;

    let mut key = derive_key(secret_key, &ephemeral, ephemeral_public)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()));
    key.zeroize();

    Ok(cipher?.decrypt(
        Nonce::from_slice(nonce),
        Payload {
            msg: sealed,
            aad: ephemeral_public,
        },
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::SigningKeyPair;

    #[test]
    fn test_roundtrip() {
        let recipient = SigningKeyPair::generate();
        let ciphertext = encrypt(recipient.public_key(), b"ephemeral key offer").unwrap();
        let plaintext = recipient.decrypt_asymmetric(&ciphertext).unwrap();
        assert_eq!(plaintext, b"ephemeral key offer");
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let recipient = SigningKeyPair::generate();
        let other = SigningKeyPair::generate();
        let ciphertext = encrypt(recipient.public_key(), b"for recipient").unwrap();

        assert!(matches!(
            other.decrypt_asymmetric(&ciphertext),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let recipient = SigningKeyPair::generate();
        let mut ciphertext = encrypt(recipient.public_key(), b"payload").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x01;

        assert!(matches!(
            recipient.decrypt_asymmetric(&ciphertext),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_truncated_input_fails() {
        let recipient = SigningKeyPair::generate();
        assert!(matches!(
            recipient.decrypt_asymmetric(&[0u8; 10]),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }
}
