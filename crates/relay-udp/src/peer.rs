//! Per-peer reliability state
//!
//! Each remote socket address gets one [`UdpPeer`]: a monotonic sequence
//! counter, the pending set of sent-but-unacknowledged payloads, and a
//! last-activity timestamp. Peers are created on the first datagram from a
//! new address and never evicted; peers are independent, so the table uses
//! per-peer locking around a shared address map.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

// ----------------------------------------------------------------------------
// Peer State
// ----------------------------------------------------------------------------

/// Reliability state for one remote peer
#[derive(Debug)]
pub struct UdpPeer {
    /// Remote socket address identifying this peer
    pub addr: SocketAddr,
    /// Next sequence id to assign; monotonic from 0
    next_seq: u64,
    /// Sent-but-unacknowledged payloads, keyed by sequence id
    pending: HashMap<u64, String>,
    /// When this peer was first seen
    pub connected_at: Instant,
    /// When this peer last sent anything
    last_activity: Instant,
}

impl UdpPeer {
    fn new(addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            addr,
            next_seq: 0,
            pending: HashMap::new(),
            connected_at: now,
            last_activity: now,
        }
    }

    /// Assign the next sequence id and record the payload as pending
    pub fn track(&mut self, payload: String) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(seq, payload);
        seq
    }

    /// Remove an acknowledged sequence id.
    ///
    /// Idempotent: removing an absent id is a no-op, which covers duplicate
    /// or late ACKs.
    pub fn acknowledge(&mut self, seq: u64) -> bool {
        self.pending.remove(&seq).is_some()
    }

    /// Snapshot of the current pending set for a retransmission sweep
    pub fn pending_snapshot(&self) -> Vec<(u64, String)> {
        self.pending
            .iter()
            .map(|(seq, payload)| (*seq, payload.clone()))
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Refresh the last-activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }
}

// ----------------------------------------------------------------------------
// Peer Table
// ----------------------------------------------------------------------------

/// Shared table of peers keyed by remote address
#[derive(Debug, Default, Clone)]
pub struct PeerTable {
    peers: Arc<RwLock<HashMap<SocketAddr, Arc<Mutex<UdpPeer>>>>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the peer for an address, creating it on first contact
    pub fn get_or_create(&self, addr: SocketAddr) -> Arc<Mutex<UdpPeer>> {
        if let Some(peer) = self.peers.read().expect("peer table poisoned").get(&addr) {
            return peer.clone();
        }
        self.peers
            .write()
            .expect("peer table poisoned")
            .entry(addr)
            .or_insert_with(|| Arc::new(Mutex::new(UdpPeer::new(addr))))
            .clone()
    }

    /// Get the peer for an address if it is already known
    pub fn get(&self, addr: &SocketAddr) -> Option<Arc<Mutex<UdpPeer>>> {
        self.peers
            .read()
            .expect("peer table poisoned")
            .get(addr)
            .cloned()
    }

    /// All known peers, for the retransmission sweep
    pub fn all(&self) -> Vec<Arc<Mutex<UdpPeer>>> {
        self.peers
            .read()
            .expect("peer table poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().expect("peer table poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
