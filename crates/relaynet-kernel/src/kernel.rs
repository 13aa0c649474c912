//! Node kernel
//!
//! The kernel owns the routing table and the session key store. Inbound
//! packets are verified, then either delivered to the handler registered for
//! their protocol type (when addressed to this node) or forwarded through the
//! routing table. Handlers reach the kernel through a [`KernelHandle`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use relaynet_core::{
    AddressLayerPacket, NodeAddress, Relay, RouteEntry, RoutingStore, TrustedRelayStore,
};
use relaynet_crypto::SessionKeyStore;
use relaynet_relay::{RelayRoutingTable, SendStateToken, SharedConnection};
use tracing::{debug, info, instrument, warn};

use crate::config::KernelConfig;
use crate::error::{KernelError, Result};
use crate::handler::SharedHandler;
use crate::modules::ModuleRegistry;

/// What happened to a dispatched packet
#[derive(Debug)]
pub enum Dispatched {
    /// Delivered to a local handler
    Delivered,
    /// Handed to a relay connection; the token reports the write outcome
    Forwarded(SendStateToken),
    /// Discarded: no handler or no route
    Dropped,
}

impl Dispatched {
    /// Whether the packet was discarded
    pub fn is_dropped(&self) -> bool {
        matches!(self, Dispatched::Dropped)
    }
}

struct KernelInner {
    config: KernelConfig,
    node_address: NodeAddress,
    keys: Arc<SessionKeyStore>,
    table: Arc<RelayRoutingTable>,
    trusted_store: Arc<dyn TrustedRelayStore>,
    routing_store: Arc<dyn RoutingStore>,
    handlers: RwLock<HashMap<u8, SharedHandler>>,
    local_addresses: RwLock<HashSet<NodeAddress>>,
    trusted: RwLock<HashMap<NodeAddress, Arc<Relay>>>,
    running: AtomicBool,
}

/// The node kernel
pub struct Kernel {
    inner: Arc<KernelInner>,
}

impl Kernel {
    /// Create a stopped kernel
    pub fn new(
        config: KernelConfig,
        keys: SessionKeyStore,
        trusted_store: Arc<dyn TrustedRelayStore>,
        routing_store: Arc<dyn RoutingStore>,
    ) -> Result<Self> {
        config.validate()?;

        let node_address = NodeAddress::new(*keys.node_public_key());
        let table = Arc::new(RelayRoutingTable::new(config.relay_table.clone()));

        info!(node = %config.node_name, address = %node_address.short(), "Kernel created");

        Ok(Self {
            inner: Arc::new(KernelInner {
                config,
                node_address,
                keys: Arc::new(keys),
                table,
                trusted_store,
                routing_store,
                handlers: RwLock::new(HashMap::new()),
                local_addresses: RwLock::new(HashSet::new()),
                trusted: RwLock::new(HashMap::new()),
                running: AtomicBool::new(false),
            }),
        })
    }

    /// Context handle for handlers and transports
    pub fn handle(&self) -> KernelHandle {
        KernelHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// This node's address
    pub fn node_address(&self) -> NodeAddress {
        self.inner.node_address
    }

    /// Kernel configuration
    pub fn config(&self) -> &KernelConfig {
        &self.inner.config
    }

    /// Routing table owned by the kernel
    pub fn routing_table(&self) -> &Arc<RelayRoutingTable> {
        &self.inner.table
    }

    /// Session key store owned by the kernel
    pub fn key_store(&self) -> &Arc<SessionKeyStore> {
        &self.inner.keys
    }

    /// Whether the kernel is running
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Register the handler for a packet type.
    ///
    /// Only allowed before [`Kernel::start`]. The handler's `on_register` runs
    /// before this returns, with the handler set locked; if it fails nothing
    /// is registered. `on_register` must not dispatch packets.
    #[instrument(skip(self, handler), fields(handler = %handler.protocol_name()))]
    pub fn register_package_type_handler(&self, protocol: u8, handler: SharedHandler) -> Result<()> {
        let mut handlers = self.inner.handlers.write();
        // start() flips the flag under this lock
        if self.is_running() {
            return Err(KernelError::AlreadyRunning);
        }
        if handlers.contains_key(&protocol) {
            return Err(KernelError::DuplicateType(protocol));
        }

        if let Err(e) = handler.on_register(self.handle()) {
            warn!(protocol, "Handler registration failed: {}", e);
            return Err(e);
        }
        handlers.insert(protocol, handler);

        debug!(protocol, "Handler registered");
        Ok(())
    }

    /// Register every module named in `enabled_modules`
    pub fn load_enabled_modules(&self, registry: &ModuleRegistry) -> Result<()> {
        for name in &self.inner.config.enabled_modules {
            let (protocol, handler) = registry.create(name, &self.inner.config)?;
            self.register_package_type_handler(protocol, handler)?;
            info!(module = %name, protocol, "Module loaded");
        }
        Ok(())
    }

    /// Load trusted relays and begin accepting packets
    #[instrument(skip(self), fields(node = %self.inner.config.node_name))]
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            return Err(KernelError::AlreadyRunning);
        }

        let relays = self.inner.trusted_store.list_relays().await?;
        {
            let mut trusted = self.inner.trusted.write();
            trusted.clear();
            for relay in relays {
                trusted.insert(relay.address, Arc::new(relay));
            }
            info!(relays = trusted.len(), "Trusted relays loaded");
        }

        {
            let handlers = self.inner.handlers.write();
            if self.inner.running.swap(true, Ordering::SeqCst) {
                return Err(KernelError::AlreadyRunning);
            }
            info!(handlers = handlers.len(), "Kernel started");
        }
        Ok(())
    }

    /// Stop dispatching, shut the routing table down, then both stores.
    ///
    /// Every step is attempted even when an earlier one fails; the first
    /// error is returned.
    #[instrument(skip(self), fields(node = %self.inner.config.node_name))]
    pub async fn stop(&self) -> Result<()> {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return Err(KernelError::NotRunning);
        }

        let table = self.inner.table.shutdown().await.map_err(KernelError::from);
        let trusted = self.inner.trusted_store.shutdown().await.map_err(KernelError::from);
        let routing = self.inner.routing_store.shutdown().await.map_err(KernelError::from);

        for result in [&table, &trusted, &routing] {
            if let Err(e) = result {
                warn!("Shutdown step failed: {}", e);
            }
        }
        table.and(trusted).and(routing)?;

        info!("Kernel stopped");
        Ok(())
    }

    /// Verify a packet and deliver or forward it
    pub async fn dispatch(
        &self,
        packet: AddressLayerPacket,
        source: Option<SharedConnection>,
    ) -> Result<Dispatched> {
        self.inner.dispatch(packet, source).await
    }

    /// Decode wire bytes received on `source`, then dispatch
    pub async fn dispatch_bytes(
        &self,
        bytes: &[u8],
        source: Option<SharedConnection>,
    ) -> Result<Dispatched> {
        let packet = AddressLayerPacket::decode(bytes).map_err(|e| {
            warn!(len = bytes.len(), "Rejected malformed packet: {}", e);
            KernelError::from(e)
        })?;
        self.inner.dispatch(packet, source).await
    }

    /// Attach a transport connection to `relay`.
    ///
    /// Once the relay has a connected transport its routes are loaded from
    /// the routing store. Returns whether the relay was activated by this call.
    #[instrument(skip(self, relay, conn), fields(relay = %relay.id, connection = %conn.object_id()))]
    pub async fn attach_connection(&self, relay: Arc<Relay>, conn: SharedConnection) -> Result<bool> {
        let connected = conn.is_connected();
        self.inner.table.register_connection(relay.clone(), conn)?;
        if !connected {
            return Ok(false);
        }
        self.activate_relay(&relay).await
    }

    /// Push a relay's routes into its connection entry.
    ///
    /// The relay itself is always reachable through its own connections.
    pub async fn activate_relay(&self, relay: &Relay) -> Result<bool> {
        let mut routes = self.inner.routing_store.routes_for_relay(relay).await?;
        if !routes.iter().any(|r| r.destination == relay.address) {
            routes.insert(0, RouteEntry::new(relay.address, relay.id.clone(), 0));
        }

        let (found, activated) = self.inner.table.activate_routes_for(&relay.id, routes);
        if !found {
            debug!(relay = %relay.id, "Relay has no connection entry");
        }
        Ok(activated)
    }

    /// Detach a transport connection
    pub fn detach_connection(&self, id: &str) -> Result<()> {
        self.inner.table.remove_connection(id)?;
        Ok(())
    }

    /// Trusted relay record for an address, loaded at start
    pub fn trusted_relay(&self, address: &NodeAddress) -> Option<Arc<Relay>> {
        self.inner.trusted.read().get(address).cloned()
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("node", &self.inner.config.node_name)
            .field("address", &self.inner.node_address)
            .field("running", &self.is_running())
            .finish()
    }
}

impl KernelInner {
    fn is_local(&self, address: &NodeAddress) -> bool {
        *address == self.node_address || self.local_addresses.read().contains(address)
    }

    async fn dispatch(
        &self,
        packet: AddressLayerPacket,
        source: Option<SharedConnection>,
    ) -> Result<Dispatched> {
        if packet.body.is_empty() {
            return Err(KernelError::EmptyBody);
        }
        if packet.body.len() > self.config.max_body_size {
            return Err(KernelError::BodyTooLarge {
                size: packet.body.len(),
                max: self.config.max_body_size,
            });
        }
        if !packet.validate_signature() {
            warn!(
                sender = %packet.sender.short(),
                protocol = packet.protocol,
                "Rejected packet with invalid signature"
            );
            return Err(KernelError::InvalidSignature);
        }

        if self.is_local(&packet.receiver) {
            let protocol = packet.protocol;
            let handler = self.handlers.read().get(&protocol).cloned();
            let Some(handler) = handler else {
                debug!(protocol, sender = %packet.sender.short(), "No handler, packet dropped");
                return Ok(Dispatched::Dropped);
            };
            if !self.running.load(Ordering::SeqCst) {
                return Err(KernelError::NotRunning);
            }

            handler
                .on_packet_received(packet, source)
                .await
                .map_err(|e| KernelError::Handler {
                    protocol,
                    source: Box::new(e),
                })?;
            return Ok(Dispatched::Delivered);
        }

        if !self.running.load(Ordering::SeqCst) {
            return Err(KernelError::NotRunning);
        }

        let forwarded = self.table.forward_packet(&packet)?;
        match forwarded.token {
            Some(token) if forwarded.routed => Ok(Dispatched::Forwarded(token)),
            _ => {
                debug!(receiver = %packet.receiver.short(), "No route, packet dropped");
                Ok(Dispatched::Dropped)
            }
        }
    }

    async fn send(&self, protocol: u8, receiver: NodeAddress, body: Vec<u8>) -> Result<Dispatched> {
        let mut packet = AddressLayerPacket::new(self.node_address, receiver, protocol, body);
        packet.signature = self.keys.sign_with_node_key(&packet.compute_hash());
        self.dispatch(packet, None).await
    }
}

/// Context object handed to handlers.
///
/// Holds a weak reference: once the kernel is dropped every call fails with
/// [`KernelError::NotRunning`].
#[derive(Clone)]
pub struct KernelHandle {
    inner: Weak<KernelInner>,
}

impl KernelHandle {
    fn upgrade(&self) -> Result<Arc<KernelInner>> {
        self.inner.upgrade().ok_or(KernelError::NotRunning)
    }

    /// This node's address
    pub fn node_address(&self) -> Result<NodeAddress> {
        Ok(self.upgrade()?.node_address)
    }

    /// Whether the kernel is running
    pub fn is_running(&self) -> bool {
        self.inner
            .upgrade()
            .map_or(false, |inner| inner.running.load(Ordering::SeqCst))
    }

    /// Build, sign with the node key and dispatch a packet
    pub async fn send(&self, protocol: u8, receiver: NodeAddress, body: Vec<u8>) -> Result<Dispatched> {
        self.upgrade()?.send(protocol, receiver, body).await
    }

    /// Treat packets addressed to `address` as local
    pub fn add_local_address(&self, address: NodeAddress) -> Result<bool> {
        let inner = self.upgrade()?;
        let added = inner.local_addresses.write().insert(address);
        if added {
            debug!(address = %address.short(), "Local address added");
        }
        Ok(added)
    }

    /// Whether `address` is handled by this node
    pub fn is_local(&self, address: &NodeAddress) -> Result<bool> {
        Ok(self.upgrade()?.is_local(address))
    }

    /// Session key store owned by the kernel
    pub fn key_store(&self) -> Result<Arc<SessionKeyStore>> {
        Ok(self.upgrade()?.keys.clone())
    }

    /// Routing table owned by the kernel
    pub fn routing_table(&self) -> Result<Arc<RelayRoutingTable>> {
        Ok(self.upgrade()?.table.clone())
    }
}

impl std::fmt::Debug for KernelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelHandle")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
