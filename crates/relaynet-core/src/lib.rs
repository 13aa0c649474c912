//! # RelayNet Core
//!
//! Core types for the RelayNet overlay network.
//!
//! This crate provides:
//! - Node addresses, relay records and route entries
//! - The signed address-layer packet and its wire format
//! - Storage traits for the trusted-relay and routing tables
//! - Common error types

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod packet;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
pub use packet::{AddressLayerPacket, PACKET_VERSION};
pub use storage::{MemoryRoutingStore, MemoryTrustedRelayStore, RoutingStore, TrustedRelayStore};
pub use types::{NodeAddress, Relay, RelayId, RouteEntry};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::packet::AddressLayerPacket;
    pub use crate::storage::{RoutingStore, TrustedRelayStore};
    pub use crate::types::{NodeAddress, Relay, RelayId, RouteEntry};
}
