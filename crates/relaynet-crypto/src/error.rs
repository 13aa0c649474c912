//! Error types for cryptographic operations

use thiserror::Error;

/// Result type alias for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Signature bytes are not valid DER
    #[error("Invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),

    /// Invalid public key (not a point on secp256k1)
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid secret key
    #[error("Invalid secret key")]
    InvalidSecretKey,

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Authentication failed (MAC verification)
    #[error("Message authentication failed")]
    AuthenticationFailed,

    /// Envelope bytes could not be decoded
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Key or secret id not present in the key store
    #[error("Unknown key id: {0}")]
    UnknownKeyId(String),

    /// Symmetric algorithm name not recognized
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Message too large
    #[error("Message too large: {size} bytes exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },
}

impl CryptoError {
    /// True for failures that indicate tampering or a wrong key, as opposed
    /// to absence or caller mistakes.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            CryptoError::AuthenticationFailed | CryptoError::DecryptionFailed(_)
        )
    }
}

impl From<prost::DecodeError> for CryptoError {
    fn from(err: prost::DecodeError) -> Self {
        CryptoError::MalformedEnvelope(err.to_string())
    }
}

impl From<aes_gcm::Error> for CryptoError {
    fn from(_: aes_gcm::Error) -> Self {
        CryptoError::DecryptionFailed("AEAD operation failed".to_string())
    }
}
