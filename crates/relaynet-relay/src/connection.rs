//! Transport connection capability
//!
//! Concrete transports (WebSocket, TCP, ...) live outside this crate. The
//! routing engine only holds and multiplexes over objects implementing
//! [`RelayConnection`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// A live transport connection to a relay
#[async_trait]
pub trait RelayConnection: Send + Sync {
    /// Whether the transport currently reports connected
    fn is_connected(&self) -> bool;

    /// Unique identity of this connection object
    fn object_id(&self) -> &str;

    /// Transport protocol name
    fn protocol(&self) -> &str;

    /// Last measured round-trip time in milliseconds
    fn ping_time(&self) -> u64;

    /// Bytes sent and received on this connection
    fn tx_rx_bytes(&self) -> (u64, u64);

    /// Write one encoded packet
    async fn write(&self, bytes: Vec<u8>) -> Result<()>;

    /// Ask the transport to close; called during shutdown
    fn close_by_kernel(&self);
}

/// Shared handle to a transport connection
pub type SharedConnection = Arc<dyn RelayConnection>;
