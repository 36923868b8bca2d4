//! Server role of the reliable datagram channel
//!
//! Owns the UDP socket, the peer table, the receive loop and the periodic
//! retransmission sweep. Inbound data frames are acknowledged and handed to
//! the application through an mpsc channel rather than re-entrant callbacks.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use relay_core::config::UdpChannelConfig;

use crate::error::{Result, UdpChannelError};
use crate::frame::DatagramFrame;
use crate::peer::PeerTable;

// ----------------------------------------------------------------------------
// Inbound Delivery
// ----------------------------------------------------------------------------

/// One application-bound payload received from a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDatagram {
    /// Remote peer that sent the frame
    pub from: SocketAddr,
    /// Sequence id the frame arrived with (already acknowledged)
    pub seq: u64,
    /// Unescaped payload
    pub payload: String,
}

// ----------------------------------------------------------------------------
// Channel Server
// ----------------------------------------------------------------------------

/// Server side of the reliable datagram channel
pub struct UdpChannelServer {
    socket: Arc<UdpSocket>,
    peers: PeerTable,
    config: UdpChannelConfig,
    inbound_tx: mpsc::UnboundedSender<InboundDatagram>,
}

impl UdpChannelServer {
    /// Bind a socket and create the server plus its inbound delivery channel
    pub async fn bind(
        addr: SocketAddr,
        config: UdpChannelConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<InboundDatagram>)> {
        let socket = UdpSocket::bind(addr).await?;
        info!("UDP channel listening on {}", socket.local_addr()?);
        Ok(Self::with_socket(socket, config))
    }

    /// Wrap an already-bound socket
    pub fn with_socket(
        socket: UdpSocket,
        config: UdpChannelConfig,
    ) -> (Self, mpsc::UnboundedReceiver<InboundDatagram>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                socket: Arc::new(socket),
                peers: PeerTable::new(),
                config,
                inbound_tx,
            },
            inbound_rx,
        )
    }

    /// Local address of the bound socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Number of known peers
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Size of a peer's pending set; zero for unknown peers
    pub fn pending_count(&self, addr: &SocketAddr) -> usize {
        self.peers
            .get(addr)
            .map(|peer| peer.lock().expect("peer poisoned").pending_len())
            .unwrap_or(0)
    }

    /// Send a payload reliably to a known peer.
    ///
    /// Assigns the peer's next sequence id, transmits once immediately, and
    /// leaves the payload in the pending set until an ACK removes it; the
    /// retransmission sweep resends it on every tick until then.
    pub async fn send_reliable(&self, addr: SocketAddr, payload: &str) -> Result<u64> {
        let peer = self
            .peers
            .get(&addr)
            .ok_or(UdpChannelError::UnknownPeer { addr })?;

        let (seq, frame) = {
            let mut peer = peer.lock().expect("peer poisoned");
            let seq = peer.track(payload.to_string());
            (seq, DatagramFrame::data(seq, payload).encode())
        };

        self.socket.send_to(frame.as_bytes(), addr).await?;
        debug!(peer = %addr, seq, "Sent reliable datagram");
        Ok(seq)
    }

    /// Run the receive loop and retransmission timer until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut buf = vec![0u8; self.config.recv_buffer_size];
        let mut retransmit = tokio::time::interval(self.config.retransmit_interval);
        // First tick fires immediately; skip it so sweeps start one interval in.
        retransmit.tick().await;

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, addr)) => {
                            let data = String::from_utf8_lossy(&buf[..len]).into_owned();
                            self.handle_datagram(addr, &data).await;
                        }
                        Err(err) => {
                            warn!("UDP receive error: {err}");
                        }
                    }
                }
                _ = retransmit.tick() => {
                    self.retransmit_pending().await;
                }
                changed = shutdown.changed() => {
                    // A dropped sender counts as a stop request.
                    if changed.is_err() || *shutdown.borrow() {
                        info!("UDP channel shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_datagram(&self, addr: SocketAddr, data: &str) {
        let known = self.peers.get(&addr).is_some();
        let peer = self.peers.get_or_create(addr);
        if !known {
            info!(peer = %addr, "New datagram peer registered");
        }
        peer.lock().expect("peer poisoned").touch();

        match DatagramFrame::decode(data) {
            DatagramFrame::Ack { seq } => {
                let removed = peer.lock().expect("peer poisoned").acknowledge(seq);
                debug!(peer = %addr, seq, removed, "ACK received");
            }
            DatagramFrame::Register => {
                debug!(peer = %addr, "REGISTER received, sending welcome");
                let welcome = self.config.welcome_message.clone();
                if let Err(err) = self.send_reliable(addr, &welcome).await {
                    warn!(peer = %addr, "Failed to send welcome: {err}");
                }
            }
            DatagramFrame::Ping => {
                debug!(peer = %addr, "Heartbeat received");
            }
            DatagramFrame::Data { seq, payload } => {
                // Acknowledge every received copy; duplicate receipt produces
                // duplicate ACKs, which the sender handles idempotently.
                let ack = DatagramFrame::Ack { seq }.encode();
                if let Err(err) = self.socket.send_to(ack.as_bytes(), addr).await {
                    warn!(peer = %addr, seq, "Failed to send ACK: {err}");
                }
                if self
                    .inbound_tx
                    .send(InboundDatagram { from: addr, seq, payload })
                    .is_err()
                {
                    warn!("Inbound consumer gone, dropping datagram");
                }
            }
            DatagramFrame::Raw { payload } => {
                debug!(peer = %addr, "Unframed payload dropped: {payload}");
            }
        }
    }

    /// Retransmit the entire pending set of every peer, unconditionally.
    ///
    /// No backoff and no retry ceiling: a message is retransmitted until
    /// acknowledged or the process restarts.
    async fn retransmit_pending(&self) {
        for peer in self.peers.all() {
            let (addr, pending) = {
                let peer = peer.lock().expect("peer poisoned");
                (peer.addr, peer.pending_snapshot())
            };
            for (seq, payload) in pending {
                let frame = DatagramFrame::data(seq, &payload).encode();
                match self.socket.send_to(frame.as_bytes(), addr).await {
                    Ok(_) => debug!(peer = %addr, seq, "Retransmitted pending datagram"),
                    Err(err) => warn!(peer = %addr, seq, "Retransmit failed: {err}"),
                }
            }
        }
    }
}
