//! Per-relay connection aggregate

use std::sync::Arc;

use parking_lot::Mutex;
use relaynet_core::{AddressLayerPacket, Relay, RouteEntry};
use tracing::{debug, warn};

use crate::connection::SharedConnection;
use crate::error::{RelayError, Result};
use crate::send_state::SendStateToken;

/// Result of removing a connection from an entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The id was not attached to this entry
    NotPresent,
    /// Removed; other connections remain
    Removed {
        /// Connections left on the entry
        remaining: usize,
    },
    /// Removed the last connection; the entry is now inactive
    Emptied,
}

struct EntryState {
    connections: Vec<SharedConnection>,
    routes: Option<Vec<RouteEntry>>,
    active: bool,
}

/// Live transport connections to one relay and the routes reachable through it.
///
/// Becomes active only once a connected transport and a route list are both
/// present. Losing the last connection deactivates the entry and clears its
/// routes.
pub struct ConnectionEntry {
    relay: Arc<Relay>,
    state: Mutex<EntryState>,
}

impl ConnectionEntry {
    /// Empty, inactive entry for `relay`
    pub fn new(relay: Arc<Relay>) -> Self {
        Self {
            relay,
            state: Mutex::new(EntryState {
                connections: Vec::new(),
                routes: None,
                active: false,
            }),
        }
    }

    /// The relay this entry belongs to
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Attach a connection.
    ///
    /// A disconnected object already holding the same id is replaced.
    pub fn add_connection(&self, conn: SharedConnection) -> Result<()> {
        let mut state = self.state.lock();
        let id = conn.object_id().to_string();

        if let Some(pos) = state.connections.iter().position(|c| c.object_id() == id) {
            if state.connections[pos].is_connected() {
                return Err(RelayError::DuplicateConnection(id));
            }
            debug!(relay = %self.relay.id, connection = %id, "Replacing stale connection");
            state.connections[pos] = conn;
            return Ok(());
        }

        state.connections.push(conn);
        debug!(
            relay = %self.relay.id,
            connection = %id,
            count = state.connections.len(),
            "Connection added"
        );
        Ok(())
    }

    /// Detach a connection by id
    pub fn remove_connection(&self, id: &str) -> RemoveOutcome {
        let mut state = self.state.lock();
        let Some(pos) = state.connections.iter().position(|c| c.object_id() == id) else {
            return RemoveOutcome::NotPresent;
        };
        state.connections.remove(pos);

        if state.connections.is_empty() {
            state.active = false;
            state.routes = None;
            debug!(relay = %self.relay.id, "Last connection removed, entry deactivated");
            RemoveOutcome::Emptied
        } else {
            RemoveOutcome::Removed {
                remaining: state.connections.len(),
            }
        }
    }

    /// Whether a connection with this id is attached
    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().connections.iter().any(|c| c.object_id() == id)
    }

    /// Whether any attached transport reports connected
    pub fn has_active_connection(&self) -> bool {
        self.state.lock().connections.iter().any(|c| c.is_connected())
    }

    /// Number of attached connections
    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Snapshot of attached connections
    pub fn connections(&self) -> Vec<SharedConnection> {
        self.state.lock().connections.clone()
    }

    /// Connected transport with the lowest ping; earliest attached wins ties
    pub fn select_best_connection(&self) -> Result<SharedConnection> {
        let state = self.state.lock();
        Self::select_locked(&state)
            .ok_or_else(|| RelayError::NoConnection(self.relay.id.to_string()))
    }

    fn select_locked(state: &EntryState) -> Option<SharedConnection> {
        state
            .connections
            .iter()
            .filter(|c| c.is_connected())
            .min_by_key(|c| c.ping_time())
            .cloned()
    }

    /// Assign the route list and activate.
    ///
    /// Returns false when routes are already assigned or nothing is connected.
    pub fn register_routes(&self, routes: Vec<RouteEntry>) -> bool {
        let mut state = self.state.lock();
        if state.routes.is_some() {
            return false;
        }
        if !state.connections.iter().any(|c| c.is_connected()) {
            return false;
        }
        debug!(relay = %self.relay.id, routes = routes.len(), "Entry activated");
        state.routes = Some(routes);
        state.active = true;
        true
    }

    /// Active flag set and a transport still connected
    pub fn is_active(&self) -> bool {
        let state = self.state.lock();
        state.active && state.connections.iter().any(|c| c.is_connected())
    }

    /// Assigned routes, if any
    pub fn routes(&self) -> Option<Vec<RouteEntry>> {
        self.state.lock().routes.clone()
    }

    /// Whether a route list is assigned
    pub fn has_routes(&self) -> bool {
        self.state.lock().routes.is_some()
    }

    /// Write `packet` on the best connection in the background.
    ///
    /// The returned token resolves once the transport accepts or rejects the
    /// write. Must be called from within a Tokio runtime.
    pub fn buffer_and_send(&self, packet: &AddressLayerPacket) -> Result<SendStateToken> {
        let conn = self.select_best_connection()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| RelayError::Internal(format!("no async runtime: {}", e)))?;

        let token = SendStateToken::new();
        let bytes = packet.encode();
        let outcome = token.clone();
        let relay = self.relay.id.clone();

        runtime.spawn(async move {
            match conn.write(bytes).await {
                Ok(()) => {
                    outcome.mark_sent();
                }
                Err(e) => {
                    warn!(relay = %relay, connection = %conn.object_id(), "Write failed: {}", e);
                    outcome.mark_dropped();
                }
            }
        });

        Ok(token)
    }

    /// Ask every attached transport to close
    pub fn close_all(&self) {
        for conn in self.connections() {
            conn.close_by_kernel();
        }
    }

    /// Summed tx/rx bytes over all attached connections
    pub fn total_tx_rx(&self) -> (u64, u64) {
        self.state
            .lock()
            .connections
            .iter()
            .map(|c| c.tx_rx_bytes())
            .fold((0u64, 0u64), |(tx, rx), (t, r)| {
                (tx.saturating_add(t), rx.saturating_add(r))
            })
    }

    /// Mean ping over connected transports, 0 when none
    pub fn average_ping(&self) -> u64 {
        let state = self.state.lock();
        let pings: Vec<u64> = state
            .connections
            .iter()
            .filter(|c| c.is_connected())
            .map(|c| c.ping_time())
            .collect();
        if pings.is_empty() {
            0
        } else {
            let total = pings.iter().fold(0u64, |acc, p| acc.saturating_add(*p));
            total / pings.len() as u64
        }
    }

    /// Trust flag of the relay
    pub fn is_trusted(&self) -> bool {
        self.relay.trusted
    }

    /// Transport protocols of attached connections
    pub fn protocols(&self) -> Vec<String> {
        self.state
            .lock()
            .connections
            .iter()
            .map(|c| c.protocol().to_string())
            .collect()
    }
}

impl std::fmt::Debug for ConnectionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ConnectionEntry")
            .field("relay", &self.relay.id)
            .field("connections", &state.connections.len())
            .field("active", &state.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::send_state::SendState;
    use crate::testing::MockConnection;
    use relaynet_core::NodeAddress;
    use relaynet_crypto::SigningKeyPair;

    fn address() -> NodeAddress {
        NodeAddress::new(*SigningKeyPair::generate().public_key())
    }

    fn entry() -> ConnectionEntry {
        ConnectionEntry::new(Arc::new(Relay::new(address(), "ws", "ws://relay")))
    }

    fn route(entry: &ConnectionEntry) -> RouteEntry {
        RouteEntry::new(address(), entry.relay().id.clone(), 1)
    }

    #[test]
    fn test_duplicate_connected_rejected() {
        let entry = entry();
        entry.add_connection(MockConnection::connected("a", 10)).unwrap();

        let err = entry
            .add_connection(MockConnection::connected("a", 10))
            .unwrap_err();
        assert!(matches!(err, RelayError::DuplicateConnection(id) if id == "a"));
        assert_eq!(entry.connection_count(), 1);
    }

    #[test]
    fn test_stale_connection_replaced() {
        let entry = entry();
        let stale = MockConnection::new("a");
        entry.add_connection(stale).unwrap();

        let fresh = MockConnection::connected("a", 5);
        entry.add_connection(fresh).unwrap();
        assert_eq!(entry.connection_count(), 1);
        assert!(entry.has_active_connection());
    }

    #[test]
    fn test_select_lowest_ping_first_wins_ties() {
        let entry = entry();
        entry.add_connection(MockConnection::connected("slow", 80)).unwrap();
        entry.add_connection(MockConnection::connected("fast-1", 20)).unwrap();
        entry.add_connection(MockConnection::connected("fast-2", 20)).unwrap();
        entry.add_connection(MockConnection::new("down")).unwrap();

        let best = entry.select_best_connection().unwrap();
        assert_eq!(best.object_id(), "fast-1");
    }

    #[test]
    fn test_select_without_connected_transport() {
        let entry = entry();
        entry.add_connection(MockConnection::new("down")).unwrap();
        assert!(matches!(
            entry.select_best_connection(),
            Err(RelayError::NoConnection(_))
        ));
    }

    #[test]
    fn test_activation_requires_connection() {
        let entry = entry();
        let r = route(&entry);
        assert!(!entry.register_routes(vec![r.clone()]));
        assert!(!entry.is_active());

        entry.add_connection(MockConnection::connected("a", 1)).unwrap();
        assert!(entry.register_routes(vec![r.clone()]));
        assert!(entry.is_active());

        // second assignment is refused
        assert!(!entry.register_routes(vec![r]));
    }

    #[test]
    fn test_emptied_entry_deactivates_and_clears_routes() {
        let entry = entry();
        entry.add_connection(MockConnection::connected("a", 1)).unwrap();
        entry.add_connection(MockConnection::connected("b", 2)).unwrap();
        let r = route(&entry);
        assert!(entry.register_routes(vec![r]));

        assert_eq!(entry.remove_connection("a"), RemoveOutcome::Removed { remaining: 1 });
        assert!(entry.is_active());

        assert_eq!(entry.remove_connection("b"), RemoveOutcome::Emptied);
        assert!(!entry.is_active());
        assert!(!entry.has_routes());

        assert_eq!(entry.remove_connection("b"), RemoveOutcome::NotPresent);
    }

    #[test]
    fn test_aggregates() {
        let entry = entry();
        assert_eq!(entry.average_ping(), 0);

        let a = MockConnection::connected("a", 10);
        let b = MockConnection::connected("b", 30);
        a.add_rx(7);
        entry.add_connection(a).unwrap();
        entry.add_connection(b).unwrap();
        entry.add_connection(MockConnection::new("c")).unwrap();

        assert_eq!(entry.average_ping(), 20);
        assert_eq!(entry.total_tx_rx(), (0, 7));
        assert!(!entry.is_trusted());
        assert_eq!(entry.protocols().len(), 3);
    }

    #[tokio::test]
    async fn test_buffer_and_send_resolves() {
        let entry = entry();
        let conn = MockConnection::connected("a", 1);
        entry.add_connection(conn.clone()).unwrap();

        let packet = AddressLayerPacket::new(address(), address(), 3, b"payload".to_vec());

        let token = entry.buffer_and_send(&packet).unwrap();
        assert_eq!(token.wait().await, SendState::Sent);
        assert_eq!(conn.written(), vec![packet.encode()]);

        conn.set_fail_writes(true);
        let token = entry.buffer_and_send(&packet).unwrap();
        assert_eq!(token.wait().await, SendState::Dropped);
    }

    #[test]
    fn test_aggregates_saturate() {
        let entry = entry();
        let a = MockConnection::connected("a", u64::MAX);
        let b = MockConnection::connected("b", 10);
        a.add_rx(u64::MAX);
        b.add_rx(5);
        entry.add_connection(a).unwrap();
        entry.add_connection(b).unwrap();

        assert_eq!(entry.average_ping(), u64::MAX / 2);
        assert_eq!(entry.total_tx_rx(), (0, u64::MAX));
    }

    #[test]
    fn test_close_all() {
        let entry = entry();
        let a = MockConnection::connected("a", 1);
        entry.add_connection(a.clone()).unwrap();
        entry.close_all();
        assert!(a.was_closed_by_kernel());
        assert!(!entry.has_active_connection());
    }
}
