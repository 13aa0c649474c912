//! # RelayNet Relay
//!
//! Connection and routing engine for RelayNet relays.
//!
//! ## Overview
//!
//! Every known relay gets a [`ConnectionEntry`] holding its live transport
//! connections and the routes reachable through it. The
//! [`RelayRoutingTable`] owns the entries and forwards packets on the best
//! connection of the relay that routes to the receiver, returning a
//! [`SendStateToken`] for the background write.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod connection;
pub mod entry;
pub mod error;
pub mod send_state;
pub mod table;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::RelayTableConfig;
pub use connection::{RelayConnection, SharedConnection};
pub use entry::{ConnectionEntry, RemoveOutcome};
pub use error::{RelayError, Result};
pub use send_state::{SendState, SendStateToken};
pub use table::{Forwarded, RelayMetadata, RelayRoutingTable, TableStats};
