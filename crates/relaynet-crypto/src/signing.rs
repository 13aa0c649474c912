//! SHA3-256 hashing and ECDSA (secp256k1) signatures
//!
//! Signatures are DER-encoded. Public keys travel in 33-byte compressed
//! SEC1 form.

use secp256k1::{ecdsa, Message, PublicKey, SecretKey, SECP256K1};
use sha3::{Digest as _, Sha3_256};

use crate::error::{CryptoError, Result};

/// SHA3-256 output size
pub const DIGEST_SIZE: usize = 32;

/// Size of a compressed secp256k1 public key
pub const PUBLIC_KEY_SIZE: usize = 33;

/// A SHA3-256 digest
pub type Digest = [u8; DIGEST_SIZE];

/// Hash the concatenation of `parts`, in the order given.
pub fn hash(parts: &[&[u8]]) -> Digest {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut digest = [0u8; DIGEST_SIZE];
    digest.copy_from_slice(&result);
    digest
}

/// Sign a digest, returning a DER-encoded ECDSA signature.
pub fn sign(secret_key: &SecretKey, digest: &Digest) -> Vec<u8> {
    let message = Message::from_digest(*digest);
    SECP256K1
        .sign_ecdsa(&message, secret_key)
        .serialize_der()
        .to_vec()
}

/// Verify a DER-encoded signature over `digest`.
///
/// Returns `Ok(false)` for a well-formed signature that does not match and
/// an error only when `signature` cannot be parsed.
pub fn verify(public_key: &PublicKey, signature: &[u8], digest: &Digest) -> Result<bool> {
    let signature = ecdsa::Signature::from_der(signature)
        .map_err(|e| CryptoError::InvalidSignatureEncoding(e.to_string()))?;
    let message = Message::from_digest(*digest);
    Ok(SECP256K1.verify_ecdsa(&message, &signature, public_key).is_ok())
}

/// Parse a SEC1 encoded public key
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey> {
    PublicKey::from_slice(bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Parse a 32-byte secret key
pub fn parse_secret_key(bytes: &[u8]) -> Result<SecretKey> {
    SecretKey::from_slice(bytes).map_err(|_| CryptoError::InvalidSecretKey)
}

/// A long-lived secp256k1 key pair.
///
/// The secret half is only reachable through the operations on this type.
pub struct SigningKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl SigningKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secret = SecretKey::new(&mut secp256k1::rand::thread_rng());
        Self::from_secret_key(secret)
    }

    /// Build from an existing secret key
    pub fn from_secret_key(secret: SecretKey) -> Self {
        let public = PublicKey::from_secret_key(SECP256K1, &secret);
        Self { secret, public }
    }

    /// Build from raw secret key bytes
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_secret_key(parse_secret_key(bytes)?))
    }

    /// Get the public key
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Get the compressed public key bytes
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public.serialize()
    }

    /// Sign a digest
    pub fn sign(&self, digest: &Digest) -> Vec<u8> {
        sign(&self.secret, digest)
    }

    /// ECDH with a peer public key
    pub fn derive_shared_secret(&self, peer: &PublicKey) -> crate::symmetric::SharedSecret {
        crate::symmetric::derive_shared_secret(&self.secret, peer)
    }

    /// Decrypt an ECIES ciphertext addressed to this key
    pub fn decrypt_asymmetric(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        crate::ecies::decrypt(&self.secret, ciphertext)
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public", &hex::encode(self.public.serialize()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_order_sensitive() {
        let ab = hash(&[b"a", b"b"]);
        let ba = hash(&[b"b", b"a"]);
        assert_ne!(ab, ba);
        assert_eq!(ab, hash(&[b"ab"]));
    }

    #[test]
    fn test_sign_verify() {
        let pair = SigningKeyPair::generate();
        let digest = hash(&[b"relay packet"]);
        let signature = pair.sign(&digest);

        assert!(verify(pair.public_key(), &signature, &digest).unwrap());
    }

    #[test]
    fn test_verify_wrong_key_is_false() {
        let pair = SigningKeyPair::generate();
        let other = SigningKeyPair::generate();
        let digest = hash(&[b"relay packet"]);
        let signature = pair.sign(&digest);

        assert!(!verify(other.public_key(), &signature, &digest).unwrap());
    }

    #[test]
    fn test_verify_wrong_digest_is_false() {
        let pair = SigningKeyPair::generate();
        let signature = pair.sign(&hash(&[b"one"]));

        assert!(!verify(pair.public_key(), &signature, &hash(&[b"two"])).unwrap());
    }

    #[test]
    fn test_verify_garbage_signature_errors() {
        let pair = SigningKeyPair::generate();
        let digest = hash(&[b"x"]);

        let result = verify(pair.public_key(), &[0x01, 0x02, 0x03], &digest);
        assert!(matches!(result, Err(CryptoError::InvalidSignatureEncoding(_))));
    }

    #[test]
    fn test_parse_public_key() {
        let pair = SigningKeyPair::generate();
        let parsed = parse_public_key(&pair.public_key_bytes()).unwrap();
        assert_eq!(&parsed, pair.public_key());

        assert!(matches!(
            parse_public_key(&[0x05; PUBLIC_KEY_SIZE]),
            Err(CryptoError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_from_secret_bytes_is_deterministic() {
        let a = SigningKeyPair::from_secret_bytes(&[0x11; 32]).unwrap();
        let b = SigningKeyPair::from_secret_bytes(&[0x11; 32]).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert!(SigningKeyPair::from_secret_bytes(&[0u8; 32]).is_err());
    }
}
