//! Client role of the reliable datagram channel
//!
//! Used when this process is itself a relay client of a remote datagram
//! server: sends REGISTER on start, heartbeats on a fixed interval, and
//! acknowledges every inbound data frame before delivering its payload.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use relay_core::config::UdpChannelConfig;

use crate::error::Result;
use crate::frame::DatagramFrame;

// ----------------------------------------------------------------------------
// Channel Client
// ----------------------------------------------------------------------------

/// Client side of the reliable datagram channel
pub struct UdpChannelClient {
    socket: Arc<UdpSocket>,
    config: UdpChannelConfig,
    inbound_tx: mpsc::UnboundedSender<String>,
}

impl UdpChannelClient {
    /// Bind an ephemeral local port and connect to the server address
    pub async fn connect(
        server: SocketAddr,
        config: UdpChannelConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<String>)> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.connect(server).await?;
        info!(
            "UDP client on {} connected to {server}",
            socket.local_addr()?
        );

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Ok((
            Self {
                socket: Arc::new(socket),
                config,
                inbound_tx,
            },
            inbound_rx,
        ))
    }

    /// Local address of the client socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one unreliable payload to the server
    pub async fn send(&self, payload: &str) -> Result<()> {
        self.socket.send(payload.as_bytes()).await?;
        Ok(())
    }

    /// Run the registration, heartbeat and receive loops until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        // Initiate the connection; the server answers with a reliable welcome.
        self.send(&DatagramFrame::Register.encode()).await?;
        debug!("Sent REGISTER to server");

        let mut heartbeat = tokio::time::interval(self.config.ping_interval);
        // The immediate first tick would duplicate the REGISTER contact.
        heartbeat.tick().await;

        let mut buf = vec![0u8; self.config.recv_buffer_size];
        loop {
            tokio::select! {
                received = self.socket.recv(&mut buf) => {
                    match received {
                        Ok(len) => {
                            let data = String::from_utf8_lossy(&buf[..len]).into_owned();
                            self.handle_datagram(&data).await;
                        }
                        Err(err) => {
                            warn!("UDP client receive error: {err}");
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(err) = self.send(&DatagramFrame::Ping.encode()).await {
                        warn!("Heartbeat send failed: {err}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("UDP client shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_datagram(&self, data: &str) {
        match DatagramFrame::decode(data) {
            DatagramFrame::Data { seq, payload } => {
                // ACK first, deliver second; the server retransmits until it
                // sees the ACK, so duplicates are expected and harmless.
                let ack = DatagramFrame::Ack { seq }.encode();
                if let Err(err) = self.send(&ack).await {
                    warn!(seq, "Failed to send ACK: {err}");
                }
                if self.inbound_tx.send(payload).is_err() {
                    warn!("Inbound consumer gone, dropping server push");
                }
            }
            other => {
                debug!("Ignoring non-data frame from server: {other:?}");
            }
        }
    }
}
