//! Storage traits for RelayNet
//!
//! The trusted-relay and routing tables are persisted by an external
//! storage layer. The core only reads from them and shuts them down.
//! In-memory implementations are provided for embedding and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Relay, RelayId, RouteEntry};

/// Source of known relays
#[async_trait]
pub trait TrustedRelayStore: Send + Sync {
    /// All known relays
    async fn list_relays(&self) -> Result<Vec<Relay>>;

    /// Release resources; later calls fail
    async fn shutdown(&self) -> Result<()>;
}

/// Source of routes reachable through each relay
#[async_trait]
pub trait RoutingStore: Send + Sync {
    /// Routes whose next hop is `relay`
    async fn routes_for_relay(&self, relay: &Relay) -> Result<Vec<RouteEntry>>;

    /// Release resources; later calls fail
    async fn shutdown(&self) -> Result<()>;
}

/// In-memory trusted relay store
#[derive(Default)]
pub struct MemoryTrustedRelayStore {
    relays: RwLock<HashMap<RelayId, Relay>>,
    closed: AtomicBool,
}

impl MemoryTrustedRelayStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create pre-populated
    pub fn with_relays(relays: impl IntoIterator<Item = Relay>) -> Self {
        let store = Self::new();
        for relay in relays {
            store.insert(relay);
        }
        store
    }

    /// Insert or replace a relay
    pub fn insert(&self, relay: Relay) {
        self.relays.write().insert(relay.id.clone(), relay);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::StoreClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl TrustedRelayStore for MemoryTrustedRelayStore {
    async fn list_relays(&self) -> Result<Vec<Relay>> {
        self.ensure_open()?;
        let mut relays: Vec<Relay> = self.relays.read().values().cloned().collect();
        relays.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(relays)
    }

    async fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        debug!("Trusted relay store shut down");
        Ok(())
    }
}

/// In-memory routing store
#[derive(Default)]
pub struct MemoryRoutingStore {
    routes: RwLock<HashMap<RelayId, Vec<RouteEntry>>>,
    closed: AtomicBool,
}

impl MemoryRoutingStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route under its relay
    pub fn insert(&self, route: RouteEntry) {
        self.routes
            .write()
            .entry(route.relay.clone())
            .or_default()
            .push(route);
    }

    /// Drop all routes through `relay`
    pub fn remove_relay(&self, relay: &RelayId) -> usize {
        self.routes.write().remove(relay).map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RoutingStore for MemoryRoutingStore {
    async fn routes_for_relay(&self, relay: &Relay) -> Result<Vec<RouteEntry>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::StoreClosed);
        }
        Ok(self.routes.read().get(&relay.id).cloned().unwrap_or_default())
    }

    async fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        debug!("Routing store shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeAddress;
    use relaynet_crypto::SigningKeyPair;

    fn relay() -> Relay {
        Relay::new(
            NodeAddress::new(*SigningKeyPair::generate().public_key()),
            "ws",
            "ws://127.0.0.1:1",
        )
    }

    #[test_log::test(tokio::test)]
    async fn test_trusted_store_lifecycle() {
        let store = MemoryTrustedRelayStore::with_relays([relay(), relay().trusted()]);
        assert_eq!(store.list_relays().await.unwrap().len(), 2);

        store.shutdown().await.unwrap();
        assert!(matches!(store.list_relays().await, Err(Error::StoreClosed)));
    }

    #[test_log::test(tokio::test)]
    async fn test_routing_store_lookup() {
        let store = MemoryRoutingStore::new();
        let via = relay();
        let other = relay();
        let dest = NodeAddress::new(*SigningKeyPair::generate().public_key());

        store.insert(RouteEntry::new(dest, via.id.clone(), 2));

        assert_eq!(store.routes_for_relay(&via).await.unwrap().len(), 1);
        assert!(store.routes_for_relay(&other).await.unwrap().is_empty());

        assert_eq!(store.remove_relay(&via.id), 1);
        store.shutdown().await.unwrap();
        assert!(store.routes_for_relay(&via).await.is_err());
    }
}
