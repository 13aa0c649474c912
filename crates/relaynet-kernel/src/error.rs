//! Kernel error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, KernelError>;

/// Kernel errors
#[derive(Debug, Error)]
pub enum KernelError {
    /// Handlers can no longer be registered
    #[error("Kernel is already running")]
    AlreadyRunning,

    /// Kernel has not been started, or has been stopped
    #[error("Kernel is not running")]
    NotRunning,

    /// A handler already owns this packet type
    #[error("Packet type {0:#04x} already has a handler")]
    DuplicateType(u8),

    /// Packet has no body
    #[error("Packet body is empty")]
    EmptyBody,

    /// Packet body exceeds the configured limit
    #[error("Packet body too large: {size} bytes (max {max})")]
    BodyTooLarge {
        /// Body size
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Packet signature does not match its contents
    #[error("Invalid packet signature")]
    InvalidSignature,

    /// Handler failed while processing a packet
    #[error("Handler for packet type {protocol:#04x} failed: {source}")]
    Handler {
        /// Packet type
        protocol: u8,
        /// Handler error
        #[source]
        source: Box<KernelError>,
    },

    /// Module-specific failure
    #[error("Module error: {0}")]
    Module(String),

    /// Module name not present in the registry
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    /// Relay routing error
    #[error("Relay error: {0}")]
    Relay(#[from] relaynet_relay::RelayError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] relaynet_core::Error),

    /// Crypto error
    #[error("Crypto error: {0}")]
    Crypto(#[from] relaynet_crypto::CryptoError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl KernelError {
    /// True when the packet itself was malformed or forged
    pub fn is_protocol_error(&self) -> bool {
        match self {
            KernelError::EmptyBody
            | KernelError::BodyTooLarge { .. }
            | KernelError::InvalidSignature => true,
            KernelError::Core(e) => e.is_protocol_error(),
            _ => false,
        }
    }

    /// True for start/stop ordering errors
    pub fn is_lifecycle(&self) -> bool {
        match self {
            KernelError::AlreadyRunning | KernelError::NotRunning => true,
            KernelError::Relay(e) => e.is_lifecycle(),
            _ => false,
        }
    }
}
