//! Heartbeat Sender Module
//!
//! One tick of the send-heartbeat task: signal the known peer unless a
//! shutdown is underway.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::process::PeerSignaller;
use super::signals::ProtocolFlags;

/// Sends heartbeats on behalf of one side
pub struct HeartbeatSender {
    signaller: Arc<dyn PeerSignaller>,
    flags: &'static ProtocolFlags,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl HeartbeatSender {
    pub fn new(signaller: Arc<dyn PeerSignaller>, flags: &'static ProtocolFlags) -> Self {
        Self {
            signaller,
            flags,
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Send one heartbeat to `peer` (0 = not known yet). Returns whether a
    /// signal went out.
    pub fn tick(&self, peer: u32) -> bool {
        if self.flags.stop_requested() || peer == 0 {
            return false;
        }

        match self.signaller.send_heartbeat(peer) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(peer, "Heartbeat sent");
                true
            }
            Err(e) => {
                // A dead peer is the check task's business.
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(peer, "Heartbeat not delivered: {}", e);
                false
            }
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
