//! Statically linked kernel modules

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use relaynet_core::{AddressLayerPacket, NodeAddress};
use relaynet_relay::SharedConnection;
use tracing::debug;

use crate::config::KernelConfig;
use crate::error::{KernelError, Result};
use crate::handler::{PackageTypeHandler, SharedHandler};
use crate::kernel::{Dispatched, KernelHandle};

/// Builds a module's handler and reports the packet type it serves
pub type ModuleFactory = Arc<dyn Fn(&KernelConfig) -> (u8, SharedHandler) + Send + Sync>;

/// Name-to-factory map of available modules
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    factories: BTreeMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in modules
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(PING_MODULE, |_| {
            (PING_PROTOCOL, Arc::new(PingHandler::new()) as SharedHandler)
        });
        registry
    }

    /// Add or replace a module factory
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&KernelConfig) -> (u8, SharedHandler) + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Registered module names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build the named module
    pub fn create(&self, name: &str, config: &KernelConfig) -> Result<(u8, SharedHandler)> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| KernelError::UnknownModule(name.to_string()))?;
        Ok(factory(config))
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names())
            .finish()
    }
}

/// Name of the ping module
pub const PING_MODULE: &str = "ping";
/// Packet type served by the ping module
pub const PING_PROTOCOL: u8 = 0x01;

const PING: u8 = 0x01;
const PONG: u8 = 0x02;

/// Unanswered pings remembered per handler; the oldest is forgotten first
pub const MAX_OUTSTANDING_PINGS: usize = 64;
/// Pongs kept until drained; the oldest is dropped first
pub const MAX_RECORDED_PONGS: usize = 64;

/// A pong received in answer to one of our pings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pong {
    /// Node that answered
    pub from: NodeAddress,
    /// Sequence number echoed back
    pub sequence: u64,
}

/// Answers pings with pongs and records pongs to its own pings.
///
/// Body layout: one kind byte (`0x01` ping, `0x02` pong) followed by an
/// 8-byte big-endian sequence number. A pong is recorded only when it
/// echoes a sequence this handler sent to that same node.
pub struct PingHandler {
    handle: Mutex<Option<KernelHandle>>,
    next_sequence: AtomicU64,
    outstanding: Mutex<BTreeMap<u64, NodeAddress>>,
    pongs: Mutex<VecDeque<Pong>>,
}

impl PingHandler {
    /// New unregistered handler
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
            next_sequence: AtomicU64::new(1),
            outstanding: Mutex::new(BTreeMap::new()),
            pongs: Mutex::new(VecDeque::new()),
        }
    }

    fn kernel(&self) -> Result<KernelHandle> {
        self.handle.lock().clone().ok_or(KernelError::NotRunning)
    }

    /// Send a ping; returns the sequence number and the dispatch outcome
    pub async fn ping(&self, target: NodeAddress) -> Result<(u64, Dispatched)> {
        let kernel = self.kernel()?;
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        self.expect_pong(sequence, target);

        match kernel.send(PING_PROTOCOL, target, encode(PING, sequence)).await {
            Ok(outcome) => Ok((sequence, outcome)),
            Err(e) => {
                self.outstanding.lock().remove(&sequence);
                Err(e)
            }
        }
    }

    /// Recorded pongs, oldest first
    pub fn pongs(&self) -> Vec<Pong> {
        self.pongs.lock().iter().copied().collect()
    }

    /// Remove and return the recorded pongs
    pub fn take_pongs(&self) -> Vec<Pong> {
        self.pongs.lock().drain(..).collect()
    }

    /// Pings still waiting for their pong
    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().len()
    }

    fn expect_pong(&self, sequence: u64, target: NodeAddress) {
        let mut outstanding = self.outstanding.lock();
        outstanding.insert(sequence, target);
        while outstanding.len() > MAX_OUTSTANDING_PINGS {
            outstanding.pop_first();
        }
    }

    /// Record `pong` if it answers one of our pings
    fn record_pong(&self, pong: Pong) -> bool {
        {
            let mut outstanding = self.outstanding.lock();
            if outstanding.get(&pong.sequence) != Some(&pong.from) {
                return false;
            }
            outstanding.remove(&pong.sequence);
        }

        let mut pongs = self.pongs.lock();
        if pongs.len() == MAX_RECORDED_PONGS {
            pongs.pop_front();
        }
        pongs.push_back(pong);
        true
    }
}

impl Default for PingHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(kind: u8, sequence: u64) -> Vec<u8> {
    let mut body = Vec::with_capacity(9);
    body.push(kind);
    body.extend_from_slice(&sequence.to_be_bytes());
    body
}

fn decode(body: &[u8]) -> Result<(u8, u64)> {
    let (kind, rest) = body
        .split_first()
        .ok_or_else(|| KernelError::Module("empty ping body".to_string()))?;
    let sequence: [u8; 8] = rest
        .try_into()
        .map_err(|_| KernelError::Module(format!("ping body of {} bytes", body.len())))?;
    Ok((*kind, u64::from_be_bytes(sequence)))
}

#[async_trait]
impl PackageTypeHandler for PingHandler {
    fn on_register(&self, handle: KernelHandle) -> Result<()> {
        let mut slot = self.handle.lock();
        if slot.is_some() {
            return Err(KernelError::Module("ping handler already registered".to_string()));
        }
        *slot = Some(handle);
        Ok(())
    }

    async fn on_packet_received(
        &self,
        packet: AddressLayerPacket,
        _source: Option<SharedConnection>,
    ) -> Result<()> {
        match decode(&packet.body)? {
            (PING, sequence) => {
                debug!(from = %packet.sender.short(), sequence, "Ping");
                self.kernel()?
                    .send(PING_PROTOCOL, packet.sender, encode(PONG, sequence))
                    .await?;
                Ok(())
            }
            (PONG, sequence) => {
                let pong = Pong {
                    from: packet.sender,
                    sequence,
                };
                if self.record_pong(pong) {
                    debug!(from = %packet.sender.short(), sequence, "Pong");
                } else {
                    debug!(from = %packet.sender.short(), sequence, "Ignoring unsolicited pong");
                }
                Ok(())
            }
            (kind, _) => Err(KernelError::Module(format!("unknown ping kind {:#04x}", kind))),
        }
    }

    fn protocol_name(&self) -> &str {
        PING_MODULE
    }

    fn object_id(&self) -> &str {
        "builtin.ping"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_layout() {
        let body = encode(PONG, 0x0102);
        assert_eq!(body, vec![0x02, 0, 0, 0, 0, 0, 0, 0x01, 0x02]);
        assert_eq!(decode(&body).unwrap(), (PONG, 0x0102));
    }

    #[test]
    fn test_short_body_rejected() {
        assert!(decode(&[]).is_err());
        assert!(decode(&[PING, 1, 2]).is_err());
    }

    fn address(seed: u8) -> NodeAddress {
        let pair = relaynet_crypto::SigningKeyPair::from_secret_bytes(&[seed; 32]).unwrap();
        NodeAddress::new(*pair.public_key())
    }

    #[test]
    fn test_pong_must_match_outstanding_ping() {
        let handler = PingHandler::new();
        let (a, b) = (address(1), address(2));
        handler.expect_pong(7, a);

        assert!(!handler.record_pong(Pong { from: a, sequence: 8 }));
        assert!(!handler.record_pong(Pong { from: b, sequence: 7 }));
        assert!(handler.record_pong(Pong { from: a, sequence: 7 }));
        // answered once only
        assert!(!handler.record_pong(Pong { from: a, sequence: 7 }));

        assert_eq!(handler.outstanding(), 0);
        assert_eq!(handler.take_pongs(), vec![Pong { from: a, sequence: 7 }]);
        assert!(handler.pongs().is_empty());
    }

    #[test]
    fn test_bookkeeping_is_bounded() {
        let handler = PingHandler::new();
        let a = address(1);
        let total = (MAX_OUTSTANDING_PINGS + 10) as u64;
        for sequence in 0..total {
            handler.expect_pong(sequence, a);
        }
        assert_eq!(handler.outstanding(), MAX_OUTSTANDING_PINGS);
        // the oldest pings were forgotten
        assert!(!handler.record_pong(Pong { from: a, sequence: 0 }));

        for sequence in 10..total {
            handler.record_pong(Pong { from: a, sequence });
        }
        let pongs = handler.pongs();
        assert_eq!(pongs.len(), MAX_RECORDED_PONGS);
        assert_eq!(pongs.last().map(|p| p.sequence), Some(total - 1));
    }

    #[test]
    fn test_registry() {
        let registry = ModuleRegistry::with_builtin();
        assert_eq!(registry.names(), vec![PING_MODULE]);

        let (protocol, handler) = registry.create("ping", &KernelConfig::default()).unwrap();
        assert_eq!(protocol, PING_PROTOCOL);
        assert_eq!(handler.protocol_name(), "ping");

        assert!(matches!(
            registry.create("chat", &KernelConfig::default()),
            Err(KernelError::UnknownModule(name)) if name == "chat"
        ));
    }
}
