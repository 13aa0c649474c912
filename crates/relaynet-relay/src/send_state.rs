//! One-shot send outcome token

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Disposition of a buffered packet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendState {
    /// Write not finished yet
    Waiting,
    /// Transport accepted the packet
    Sent,
    /// Transport failed or the packet was discarded
    Dropped,
}

/// Reports the eventual outcome of a single outbound packet.
///
/// Leaves [`SendState::Waiting`] at most once; later transitions are
/// ignored. Clones share the same state. Waiting has no built-in deadline,
/// use [`SendStateToken::wait_timeout`] when the transport may stall.
#[derive(Clone)]
pub struct SendStateToken {
    state: Arc<watch::Sender<SendState>>,
}

impl SendStateToken {
    /// New token in the waiting state
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SendState::Waiting);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Current state
    pub fn state(&self) -> SendState {
        *self.state.borrow()
    }

    /// Whether the token has left the waiting state
    pub fn is_resolved(&self) -> bool {
        self.state() != SendState::Waiting
    }

    /// Transition out of waiting. Returns false if already resolved.
    pub fn resolve(&self, outcome: SendState) -> bool {
        if outcome == SendState::Waiting {
            return false;
        }
        self.state.send_if_modified(|current| {
            if *current == SendState::Waiting {
                *current = outcome;
                true
            } else {
                false
            }
        })
    }

    /// Mark sent
    pub fn mark_sent(&self) -> bool {
        self.resolve(SendState::Sent)
    }

    /// Mark dropped
    pub fn mark_dropped(&self) -> bool {
        self.resolve(SendState::Dropped)
    }

    /// Wait for the first transition; returns immediately if resolved
    pub async fn wait(&self) -> SendState {
        let mut rx = self.state.subscribe();
        let resolved = match rx.wait_for(|s| *s != SendState::Waiting).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        resolved
    }

    /// Wait with a deadline; `None` if still waiting when it expires
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<SendState> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }
}

impl Default for SendStateToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SendStateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SendStateToken").field(&self.state()).finish()
    }
}
