//! Error types for RelayNet core

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Debug, Error)]
pub enum Error {
    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    Crypto(#[from] relaynet_crypto::CryptoError),

    /// Packet bytes could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// A public key field is not a valid curve point
    #[error("Key format error: {0}")]
    KeyFormat(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Store has been shut down
    #[error("Store is shut down")]
    StoreClosed,
}

impl Error {
    /// True for malformed-input errors (bad bytes, bad keys)
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Decode(_) | Error::KeyFormat(_))
    }
}

impl From<prost::DecodeError> for Error {
    fn from(err: prost::DecodeError) -> Self {
        Error::Decode(err.to_string())
    }
}
