//! In-memory transport connection for tests

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::connection::RelayConnection;
use crate::error::{RelayError, Result};

/// Transport connection that records writes instead of sending them
pub struct MockConnection {
    id: String,
    protocol: String,
    connected: AtomicBool,
    ping: AtomicU64,
    tx: AtomicU64,
    rx: AtomicU64,
    fail_writes: AtomicBool,
    closed_by_kernel: AtomicBool,
    ignore_close: AtomicBool,
    written: Mutex<Vec<Vec<u8>>>,
}

impl MockConnection {
    /// Disconnected mock with the given id
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            protocol: "mock".to_string(),
            connected: AtomicBool::new(false),
            ping: AtomicU64::new(0),
            tx: AtomicU64::new(0),
            rx: AtomicU64::new(0),
            fail_writes: AtomicBool::new(false),
            closed_by_kernel: AtomicBool::new(false),
            ignore_close: AtomicBool::new(false),
            written: Mutex::new(Vec::new()),
        })
    }

    /// Connected mock with the given ping
    pub fn connected(id: impl Into<String>, ping_ms: u64) -> Arc<Self> {
        let conn = Self::new(id);
        conn.set_connected(true);
        conn.set_ping(ping_ms);
        conn
    }

    /// Flip the connected flag
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Set reported ping
    pub fn set_ping(&self, ping_ms: u64) {
        self.ping.store(ping_ms, Ordering::SeqCst);
    }

    /// Make subsequent writes fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Stay connected when the kernel asks to close
    pub fn set_ignore_close(&self, ignore: bool) {
        self.ignore_close.store(ignore, Ordering::SeqCst);
    }

    /// Record inbound traffic
    pub fn add_rx(&self, bytes: u64) {
        self.rx.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Whether `close_by_kernel` was called
    pub fn was_closed_by_kernel(&self) -> bool {
        self.closed_by_kernel.load(Ordering::SeqCst)
    }

    /// Frames written so far
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }
}

#[async_trait]
impl RelayConnection for MockConnection {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn object_id(&self) -> &str {
        &self.id
    }

    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn ping_time(&self) -> u64 {
        self.ping.load(Ordering::SeqCst)
    }

    fn tx_rx_bytes(&self) -> (u64, u64) {
        (self.tx.load(Ordering::SeqCst), self.rx.load(Ordering::SeqCst))
    }

    async fn write(&self, bytes: Vec<u8>) -> Result<()> {
        if !self.is_connected() {
            return Err(RelayError::Write(format!("{} is disconnected", self.id)));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RelayError::Write(format!("{} write failed", self.id)));
        }
        self.tx.fetch_add(bytes.len() as u64, Ordering::SeqCst);
        self.written.lock().push(bytes);
        Ok(())
    }

    fn close_by_kernel(&self) {
        self.closed_by_kernel.store(true, Ordering::SeqCst);
        if !self.ignore_close.load(Ordering::SeqCst) {
            self.set_connected(false);
        }
    }
}
