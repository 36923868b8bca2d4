//! WebSocket endpoint
//!
//! Accepts connections on the single relay endpoint path, authenticates the
//! bearer token before any registry binding, then runs one reader loop
//! feeding the command bus and one writer task draining the connection's
//! outbound channel. The close callback drives `Registry::unbind`.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use relay_core::types::ConnectionHandle;
use relay_core::{ClientRegistry, CommandBus};

use crate::auth::AuthValidator;
use crate::error::Result;

// ----------------------------------------------------------------------------
// Endpoint
// ----------------------------------------------------------------------------

/// WebSocket listener for relay clients
pub struct WsEndpoint {
    listener: TcpListener,
    path: String,
    bus: Arc<CommandBus>,
    registry: Arc<ClientRegistry>,
    validator: Arc<dyn AuthValidator>,
}

impl WsEndpoint {
    /// Bind the listener socket
    pub async fn bind(
        addr: SocketAddr,
        path: String,
        bus: Arc<CommandBus>,
        registry: Arc<ClientRegistry>,
        validator: Arc<dyn AuthValidator>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("WebSocket endpoint listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            path,
            bus,
            registry,
            validator,
        })
    }

    /// Local address of the bound listener
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let path = self.path.clone();
                            let bus = self.bus.clone();
                            let registry = self.registry.clone();
                            let validator = self.validator.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, peer, path, bus, registry, validator)
                                    .await;
                            });
                        }
                        Err(err) => {
                            warn!("Accept failed: {err}");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("WebSocket endpoint shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Connection Handling
// ----------------------------------------------------------------------------

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    path: String,
    bus: Arc<CommandBus>,
    registry: Arc<ClientRegistry>,
    validator: Arc<dyn AuthValidator>,
) {
    let mut auth_header: Option<String> = None;
    let callback = |req: &Request, resp: Response| {
        if req.uri().path() != path {
            debug!(requested = %req.uri().path(), "Rejected client with invalid path");
            let mut rejection = ErrorResponse::new(Some("Invalid path".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            return Err(rejection);
        }
        auth_header = req
            .headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        Ok(resp)
    };

    let ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(err) => {
            debug!(%peer, "WebSocket handshake failed: {err}");
            return;
        }
    };

    let Some(token) = auth_header
        .as_deref()
        .and_then(|header| header.strip_prefix("Bearer "))
    else {
        info!(%peer, "Rejected client: missing or invalid Authorization header");
        close_with_policy(ws, "Missing/invalid Authorization header").await;
        return;
    };

    let validation = match validator.validate(token).await {
        Ok(validation) => validation,
        Err(err) => {
            warn!(%peer, "Auth service call failed: {err}");
            close_with_policy(ws, "Token validation unavailable").await;
            return;
        }
    };
    if !validation.valid {
        info!(%peer, "Rejected client: invalid token");
        close_with_policy(ws, "Invalid token").await;
        return;
    }

    let identity = match validation.identity() {
        Ok(identity) => identity,
        Err(err) => {
            warn!(%peer, "Rejected client: {err}");
            close_with_policy(ws, "Invalid identity").await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(peer.to_string(), tx);
    registry.bind(identity.clone(), handle.clone());
    info!(%identity, %peer, "WebSocket client connected");

    let (mut sink, mut source) = ws.split();

    // Writer task: drains the connection's outbound channel into the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Reader loop: each inbound frame rebinds the bus writer to this
    // connection before dispatch, since one bus serves connections serially.
    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(raw)) => {
                debug!(%identity, "WebSocket received: {raw}");
                bus.set_outbound_writer(handle.sender());
                bus.receive(&raw).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(%identity, "WebSocket error: {err}");
                break;
            }
        }
    }

    registry.unbind(&handle);
    writer.abort();
    info!(%identity, "WebSocket client disconnected");
}

async fn close_with_policy(mut ws: WebSocketStream<TcpStream>, reason: &str) {
    let frame = CloseFrame {
        code: CloseCode::Policy,
        reason: reason.to_string().into(),
    };
    let _ = ws.close(Some(frame)).await;
}
