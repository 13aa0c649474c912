//! Packet-type handler capability

use std::sync::Arc;

use async_trait::async_trait;
use relaynet_core::AddressLayerPacket;
use relaynet_relay::SharedConnection;

use crate::error::Result;
use crate::kernel::KernelHandle;

/// Receives locally addressed packets of one protocol type
#[async_trait]
pub trait PackageTypeHandler: Send + Sync {
    /// Called once during registration. An error aborts the registration.
    fn on_register(&self, handle: KernelHandle) -> Result<()>;

    /// Handle a verified packet addressed to this node.
    ///
    /// `source` is the connection the packet arrived on, `None` for packets
    /// sent by this node to itself.
    async fn on_packet_received(
        &self,
        packet: AddressLayerPacket,
        source: Option<SharedConnection>,
    ) -> Result<()>;

    /// Protocol name, for logs and diagnostics
    fn protocol_name(&self) -> &str;

    /// Unique identity of the handler object
    fn object_id(&self) -> &str;
}

/// Shared handle to a packet-type handler
pub type SharedHandler = Arc<dyn PackageTypeHandler>;
