//! Relay routing table
//!
//! Maps relay identities to their [`ConnectionEntry`], destination addresses
//! to the relays that reach them (in activation order), and connection ids
//! back to their relay.
//! The three maps are updated together under one lock. Entry locks are only
//! ever taken while holding the table lock, never the other way round.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use relaynet_core::{AddressLayerPacket, NodeAddress, Relay, RelayId, RouteEntry};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::config::RelayTableConfig;
use crate::connection::SharedConnection;
use crate::entry::{ConnectionEntry, RemoveOutcome};
use crate::error::{RelayError, Result};
use crate::send_state::SendStateToken;

/// Outcome of [`RelayRoutingTable::forward_packet`]
#[derive(Debug)]
pub struct Forwarded {
    /// Token tracking the background write, when one was started
    pub token: Option<SendStateToken>,
    /// Whether an active route was found
    pub routed: bool,
}

impl Forwarded {
    fn unrouted() -> Self {
        Self {
            token: None,
            routed: false,
        }
    }
}

/// Snapshot of one relay's connection state
#[derive(Clone, Debug, Serialize)]
pub struct RelayMetadata {
    /// Relay id
    pub relay: RelayId,
    /// Relay address
    pub address: NodeAddress,
    /// Trust flag
    pub trusted: bool,
    /// Attached connections
    pub connections: usize,
    /// Whether the entry is active
    pub active: bool,
    /// Mean ping over connected transports
    pub average_ping_ms: u64,
    /// Bytes sent
    pub tx_bytes: u64,
    /// Bytes received
    pub rx_bytes: u64,
    /// Transport protocols in use
    pub protocols: Vec<String>,
    /// Number of assigned routes
    pub routes: usize,
}

/// Table-wide counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    /// Relays with at least one attached connection
    pub relays: usize,
    /// Relays whose entry is active
    pub active_relays: usize,
    /// Attached connections
    pub connections: usize,
    /// Destinations with a route
    pub routes: usize,
}

struct TableState {
    relays: HashMap<RelayId, Arc<ConnectionEntry>>,
    routes: HashMap<NodeAddress, Vec<RelayId>>,
    connections: HashMap<String, RelayId>,
    closed: bool,
}

/// Routing table over all connected relays
pub struct RelayRoutingTable {
    config: RelayTableConfig,
    state: Mutex<TableState>,
    live: watch::Sender<usize>,
}

impl RelayRoutingTable {
    /// Create an empty table
    pub fn new(config: RelayTableConfig) -> Self {
        let (live, _) = watch::channel(0);
        Self {
            config,
            state: Mutex::new(TableState {
                relays: HashMap::new(),
                routes: HashMap::new(),
                connections: HashMap::new(),
                closed: false,
            }),
            live,
        }
    }

    /// Table configuration
    pub fn config(&self) -> &RelayTableConfig {
        &self.config
    }

    /// Attach a transport connection to `relay`, creating its entry if needed
    #[instrument(skip(self, relay, conn), fields(relay = %relay.id, connection = %conn.object_id()))]
    pub fn register_connection(&self, relay: Arc<Relay>, conn: SharedConnection) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(RelayError::Closed);
        }

        let id = conn.object_id().to_string();
        if let Some(owner) = state.connections.get(&id) {
            if *owner != relay.id {
                return Err(RelayError::DuplicateConnection(id));
            }
        }

        let entry = state
            .relays
            .entry(relay.id.clone())
            .or_insert_with(|| Arc::new(ConnectionEntry::new(relay.clone())))
            .clone();
        entry.add_connection(conn)?;

        state.connections.insert(id, relay.id.clone());
        self.live.send_replace(state.connections.len());
        debug!("Connection registered");
        Ok(())
    }

    /// Detach a connection; prunes the relay when its last connection goes
    #[instrument(skip(self))]
    pub fn remove_connection(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let relay = state
            .connections
            .remove(id)
            .ok_or_else(|| RelayError::UnknownConnection(id.to_string()))?;

        let outcome = match state.relays.get(&relay) {
            Some(entry) => entry.remove_connection(id),
            None => RemoveOutcome::NotPresent,
        };

        match outcome {
            RemoveOutcome::Emptied => {
                state.relays.remove(&relay);
                state.routes.retain(|_, owners| {
                    owners.retain(|owner| *owner != relay);
                    !owners.is_empty()
                });
                debug!(relay = %relay, "Relay pruned");
            }
            RemoveOutcome::Removed { remaining } => {
                debug!(relay = %relay, remaining, "Connection removed");
            }
            RemoveOutcome::NotPresent => {
                warn!(relay = %relay, "Connection index out of sync with entry");
            }
        }

        self.live.send_replace(state.connections.len());
        Ok(())
    }

    /// Whether the relay has a connected transport
    pub fn relay_is_connected(&self, relay: &RelayId) -> bool {
        self.entry(relay).map_or(false, |e| e.has_active_connection())
    }

    /// Number of connections attached to the relay
    pub fn connection_count_for(&self, relay: &RelayId) -> usize {
        self.entry(relay).map_or(0, |e| e.connection_count())
    }

    /// Connection snapshot for one relay
    pub fn metadata_for(&self, relay: &RelayId) -> Result<RelayMetadata> {
        let entry = self
            .entry(relay)
            .ok_or_else(|| RelayError::NotFound(relay.to_string()))?;
        let (tx_bytes, rx_bytes) = entry.total_tx_rx();

        Ok(RelayMetadata {
            relay: relay.clone(),
            address: entry.relay().address,
            trusted: entry.is_trusted(),
            connections: entry.connection_count(),
            active: entry.is_active(),
            average_ping_ms: entry.average_ping(),
            tx_bytes,
            rx_bytes,
            protocols: entry.protocols(),
            routes: entry.routes().map_or(0, |r| r.len()),
        })
    }

    /// Relay owning a connection id
    pub fn relay_for_connection(&self, id: &str) -> Option<Arc<Relay>> {
        let state = self.state.lock();
        let relay = state.connections.get(id)?;
        state.relays.get(relay).map(|e| e.relay().clone())
    }

    /// Assign routes to a relay's entry.
    ///
    /// Returns `(found, activated)`: whether the relay has an entry, and
    /// whether this call activated it. Always `(false, false)` once the
    /// table is closed.
    #[instrument(skip(self, routes), fields(routes = routes.len()))]
    pub fn activate_routes_for(&self, relay: &RelayId, routes: Vec<RouteEntry>) -> (bool, bool) {
        let mut state = self.state.lock();
        if state.closed {
            return (false, false);
        }
        let Some(entry) = state.relays.get(relay).cloned() else {
            return (false, false);
        };

        let destinations: Vec<NodeAddress> = routes.iter().map(|r| r.destination).collect();
        if !entry.register_routes(routes) {
            return (true, false);
        }

        for destination in destinations {
            let owners = state.routes.entry(destination).or_default();
            if !owners.contains(relay) {
                owners.push(relay.clone());
            }
        }
        info!("Relay activated");
        (true, true)
    }

    /// Forward a packet toward its receiver.
    ///
    /// Uses the earliest activated relay that routes to the receiver and is
    /// still active.
    pub fn forward_packet(&self, packet: &AddressLayerPacket) -> Result<Forwarded> {
        let candidates: Vec<Arc<ConnectionEntry>> = {
            let state = self.state.lock();
            if state.closed {
                return Err(RelayError::Closed);
            }
            state
                .routes
                .get(&packet.receiver)
                .map(|owners| {
                    owners
                        .iter()
                        .filter_map(|relay| state.relays.get(relay).cloned())
                        .collect()
                })
                .unwrap_or_default()
        };

        let Some(entry) = candidates.into_iter().find(|e| e.is_active()) else {
            debug!(receiver = %packet.receiver.short(), "No active route");
            return Ok(Forwarded::unrouted());
        };

        match entry.buffer_and_send(packet) {
            Ok(token) => Ok(Forwarded {
                token: Some(token),
                routed: true,
            }),
            Err(RelayError::NoConnection(relay)) => {
                debug!(relay = %relay, "Relay lost its connections while forwarding");
                Ok(Forwarded::unrouted())
            }
            Err(e) => Err(e),
        }
    }

    /// Whether any relay has a connected transport
    pub fn has_active_connections(&self) -> bool {
        self.state
            .lock()
            .relays
            .values()
            .any(|e| e.has_active_connection())
    }

    /// Whether shutdown has begun
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Table-wide counters
    pub fn stats(&self) -> TableStats {
        let state = self.state.lock();
        TableStats {
            relays: state.relays.len(),
            active_relays: state.relays.values().filter(|e| e.is_active()).count(),
            connections: state.connections.len(),
            routes: state.routes.len(),
        }
    }

    /// Close the table and wait for every transport to disconnect.
    ///
    /// New registrations and forwards fail with [`RelayError::Closed`] from
    /// the moment this is called.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        let entries: Vec<Arc<ConnectionEntry>> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.relays.values().cloned().collect()
        };

        info!(relays = entries.len(), "Shutting down routing table");
        for entry in &entries {
            entry.close_all();
        }

        match self.config.shutdown_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, self.wait_for_drain())
                .await
                .map_err(|_| {
                    warn!("Connections still open at shutdown timeout");
                    RelayError::Timeout
                })?,
            None => self.wait_for_drain().await,
        }

        info!("Routing table shut down");
        Ok(())
    }

    async fn wait_for_drain(&self) {
        let mut live = self.live.subscribe();
        let poll = self.config.shutdown_poll_interval();

        while self.has_active_connections() {
            // transports may disconnect without removing themselves
            tokio::select! {
                _ = live.changed() => {}
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }

    fn entry(&self, relay: &RelayId) -> Option<Arc<ConnectionEntry>> {
        self.state.lock().relays.get(relay).cloned()
    }
}

impl Default for RelayRoutingTable {
    fn default() -> Self {
        Self::new(RelayTableConfig::default())
    }
}

impl std::fmt::Debug for RelayRoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayRoutingTable")
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}
