//! Application wiring
//!
//! Builds the registry, the bus and its handlers, then runs the WebSocket
//! endpoint, the UDP channel, the stream bridge and the registry monitor as
//! independent tasks sharing one shutdown signal.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use relay_bridge::{StreamBridge, StreamPublisher};
use relay_core::{ClientRegistry, CommandBus, RegistryReport};
use relay_udp::UdpChannelServer;

use crate::auth::HttpAuthValidator;
use crate::commands;
use crate::config::AppConfig;
use crate::error::Result;
use crate::ws::WsEndpoint;

// ----------------------------------------------------------------------------
// Relay Application
// ----------------------------------------------------------------------------

/// The assembled relay service
pub struct RelayApp {
    config: AppConfig,
    registry: Arc<ClientRegistry>,
    bus: Arc<CommandBus>,
    udp_enabled: bool,
    bridge_enabled: bool,
}

impl RelayApp {
    /// Validate the configuration and build the shared core
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(ClientRegistry::new());
        let bus = Arc::new(CommandBus::new(config.relay.bus.default_timeout));
        Ok(Self {
            config,
            registry,
            bus,
            udp_enabled: true,
            bridge_enabled: true,
        })
    }

    /// Enable or disable optional components (CLI `--no-udp` / `--no-bridge`)
    pub fn with_components(mut self, udp: bool, bridge: bool) -> Self {
        self.udp_enabled = udp;
        self.bridge_enabled = bridge;
        self
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        self.registry.clone()
    }

    pub fn bus(&self) -> Arc<CommandBus> {
        self.bus.clone()
    }

    /// Run the service until ctrl-c
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        // Command handlers need the stream publisher for SEND_MESSAGE.
        let publisher =
            StreamPublisher::connect(&self.config.redis_url, &self.config.relay.bridge).await?;
        commands::register_handlers(&self.bus, Arc::new(publisher));

        // WebSocket endpoint.
        let validator = Arc::new(HttpAuthValidator::new(self.config.auth_base_url.clone()));
        let endpoint = WsEndpoint::bind(
            self.config.ws_bind,
            self.config.endpoint_path.clone(),
            self.bus.clone(),
            self.registry.clone(),
            validator,
        )
        .await?;
        {
            let shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(err) = endpoint.run(shutdown).await {
                    error!("WebSocket endpoint failed: {err}");
                }
            }));
        }

        // Reliable datagram channel.
        if self.udp_enabled {
            let (udp_server, mut udp_inbound) =
                UdpChannelServer::bind(self.config.udp_bind, self.config.relay.udp.clone()).await?;
            let shutdown = shutdown_rx.clone();
            // The server owns the inbound sender; when its task exits on
            // shutdown the drain loop below sees end-of-channel and follows.
            tasks.push(tokio::spawn(async move {
                if let Err(err) = udp_server.run(shutdown).await {
                    error!("UDP channel failed: {err}");
                }
            }));
            tasks.push(tokio::spawn(async move {
                while let Some(datagram) = udp_inbound.recv().await {
                    info!(
                        from = %datagram.from,
                        seq = datagram.seq,
                        "Datagram payload: {}",
                        datagram.payload
                    );
                }
            }));
        }

        // Stream bridge.
        if self.bridge_enabled {
            let bridge = StreamBridge::new(
                self.config.redis_url.clone(),
                self.config.relay.bridge.clone(),
                self.registry.clone(),
            );
            let shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(err) = bridge.run(shutdown).await {
                    error!("Stream bridge failed: {err}");
                }
            }));
        }

        // Periodic registry diagnostics.
        if self.config.relay.monitor.enabled {
            let registry = self.registry.clone();
            let interval = self.config.relay.monitor.interval;
            let mut shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            info!("{}", RegistryReport::collect(&registry));
                        }
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            }));
        }

        info!("Relay service running");
        tokio::signal::ctrl_c().await?;
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);

        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }
}
