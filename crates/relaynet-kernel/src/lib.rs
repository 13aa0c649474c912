//! # RelayNet Kernel
//!
//! Packet dispatcher for a RelayNet node.
//!
//! The [`Kernel`] verifies every inbound address-layer packet, hands packets
//! addressed to this node to the [`PackageTypeHandler`] registered for their
//! protocol type, and forwards everything else through its
//! [`RelayRoutingTable`](relaynet_relay::RelayRoutingTable).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use relaynet_core::{MemoryRoutingStore, MemoryTrustedRelayStore};
//! use relaynet_crypto::SessionKeyStore;
//! use relaynet_kernel::{Kernel, KernelConfig, ModuleRegistry};
//!
//! # async fn example() -> relaynet_kernel::Result<()> {
//! let kernel = Kernel::new(
//!     KernelConfig::default(),
//!     SessionKeyStore::generate(),
//!     Arc::new(MemoryTrustedRelayStore::new()),
//!     Arc::new(MemoryRoutingStore::new()),
//! )?;
//! kernel.load_enabled_modules(&ModuleRegistry::with_builtin())?;
//! kernel.start().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod handler;
pub mod kernel;
pub mod modules;

pub use config::KernelConfig;
pub use error::{KernelError, Result};
pub use handler::{PackageTypeHandler, SharedHandler};
pub use kernel::{Dispatched, Kernel, KernelHandle};
pub use modules::{
    ModuleRegistry, PingHandler, Pong, MAX_OUTSTANDING_PINGS, MAX_RECORDED_PONGS, PING_MODULE,
    PING_PROTOCOL,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{KernelError, Result};
    pub use crate::handler::PackageTypeHandler;
    pub use crate::kernel::{Dispatched, Kernel, KernelHandle};
}
