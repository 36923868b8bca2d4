//! Stream consumer loop
//!
//! Consumes the shared stream as a named consumer group and forwards each
//! entry to the registry-resolved connection as a SEND_MESSAGE request.
//! Entries are acknowledged whether or not the forward succeeds: the current
//! policy trades redelivery safety for bounded consumer-group backlog.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use relay_core::config::BridgeConfig;
use relay_core::params::send_message_params;
use relay_core::registry::ClientRegistry;
use relay_core::types::ClientIdentity;
use relay_core::wire::CommandMessage;

use crate::backoff::Backoff;
use crate::error::{BridgeError, Result};

// ----------------------------------------------------------------------------
// Bridge State
// ----------------------------------------------------------------------------

/// Consumer loop state, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Disconnected,
    Connecting,
    EnsuringGroup,
    Listening,
    Backoff,
    Stopped,
}

/// What happened to one delivered entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Frame handed to the target connection
    Forwarded { to: ClientIdentity },
    /// Entry carried no `data` field; nothing to forward
    SkippedMissingData,
    /// `to` was absent or not a valid composite identity
    SkippedBadTarget { reason: String },
    /// No connection currently bound for the target identity
    NoTargetConnection { to: ClientIdentity },
    /// Target connection refused the frame (writer gone)
    SendFailed { to: ClientIdentity },
}

// ----------------------------------------------------------------------------
// Stream Bridge
// ----------------------------------------------------------------------------

/// Durable stream consumer forwarding entries into the command protocol
pub struct StreamBridge {
    redis_url: String,
    config: BridgeConfig,
    registry: Arc<ClientRegistry>,
    state: Mutex<BridgeState>,
}

enum ListenExit {
    Shutdown,
    ConnectionLost,
}

impl StreamBridge {
    pub fn new(redis_url: String, config: BridgeConfig, registry: Arc<ClientRegistry>) -> Self {
        Self {
            redis_url,
            config,
            registry,
            state: Mutex::new(BridgeState::Disconnected),
        }
    }

    /// Current consumer loop state
    pub fn state(&self) -> BridgeState {
        *self.state.lock().expect("bridge state poisoned")
    }

    fn set_state(&self, state: BridgeState) {
        debug!(?state, "Bridge state transition");
        *self.state.lock().expect("bridge state poisoned") = state;
    }

    /// Run the consumer loop until shutdown.
    ///
    /// Connection-level failures drop to a jittered exponential backoff and
    /// reconnect; the loop only exits on an explicit stop request.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut backoff = Backoff::new(self.config.backoff_base, self.config.backoff_max);

        loop {
            if *shutdown.borrow() {
                self.set_state(BridgeState::Stopped);
                info!("Bridge stopped");
                return Ok(());
            }

            self.set_state(BridgeState::Connecting);
            let mut conn = match self.connect().await {
                Ok(conn) => conn,
                Err(err) => {
                    warn!("Bridge connect failed: {err}");
                    if self.wait_backoff(&mut backoff, &mut shutdown).await {
                        continue;
                    }
                    self.set_state(BridgeState::Stopped);
                    return Ok(());
                }
            };

            self.set_state(BridgeState::EnsuringGroup);
            if let Err(err) = self.ensure_group(&mut conn).await {
                warn!("Consumer group setup failed: {err}");
                if self.wait_backoff(&mut backoff, &mut shutdown).await {
                    continue;
                }
                self.set_state(BridgeState::Stopped);
                return Ok(());
            }

            self.set_state(BridgeState::Listening);
            info!(
                stream = %self.config.stream,
                group = %self.config.group,
                consumer = %self.config.consumer,
                "Bridge listening"
            );
            backoff.reset();

            match self.listen(&mut conn, &mut shutdown).await {
                ListenExit::Shutdown => {
                    self.set_state(BridgeState::Stopped);
                    info!("Bridge stopped");
                    return Ok(());
                }
                ListenExit::ConnectionLost => {
                    if self.wait_backoff(&mut backoff, &mut shutdown).await {
                        continue;
                    }
                    self.set_state(BridgeState::Stopped);
                    return Ok(());
                }
            }
        }
    }

    /// Acquire a connection and probe its liveness
    async fn connect(&self) -> Result<MultiplexedConnection> {
        let client = redis::Client::open(self.redis_url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(conn)
    }

    /// Create the consumer group at the stream tail; existing group is fine
    async fn ensure_group(&self, conn: &mut MultiplexedConnection) -> Result<()> {
        let created: std::result::Result<String, redis::RedisError> = conn
            .xgroup_create_mkstream(&self.config.stream, &self.config.group, "$")
            .await;

        match created {
            Ok(_) => {
                info!(
                    group = %self.config.group,
                    stream = %self.config.stream,
                    "Created consumer group"
                );
                Ok(())
            }
            Err(err) if err.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists, continuing");
                Ok(())
            }
            Err(err) => Err(BridgeError::GroupSetup {
                reason: err.to_string(),
            }),
        }
    }

    async fn listen(
        &self,
        conn: &mut MultiplexedConnection,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ListenExit {
        let options = StreamReadOptions::default()
            .group(&self.config.group, &self.config.consumer)
            .count(self.config.batch_count)
            .block(self.config.block_interval.as_millis() as usize);

        loop {
            if *shutdown.borrow() {
                return ListenExit::Shutdown;
            }

            let streams = [&self.config.stream];
            let ids = [">"];
            let read = tokio::select! {
                result = conn.xread_options::<_, _, StreamReadReply>(
                    &streams,
                    &ids,
                    &options,
                ) => Some(result),
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return ListenExit::Shutdown;
                    }
                    None
                }
            };

            let reply = match read {
                // Stop requested while blocked; the in-flight read is dropped.
                None => {
                    if *shutdown.borrow() {
                        return ListenExit::Shutdown;
                    }
                    continue;
                }
                Some(Ok(reply)) => reply,
                Some(Err(err)) => {
                    warn!("Stream read failed: {err}");
                    return ListenExit::ConnectionLost;
                }
            };

            // An empty result just means nothing arrived within the block
            // interval; loop again.
            for key in reply.keys {
                for entry in key.ids {
                    let outcome = self.forward_entry(&entry);
                    match &outcome {
                        ForwardOutcome::Forwarded { to } => {
                            debug!(entry = %entry.id, to = %to, "Forwarded stream entry");
                        }
                        other => {
                            warn!(entry = %entry.id, ?other, "Stream entry not forwarded");
                        }
                    }

                    // Acknowledge regardless of the forward outcome.
                    if let Err(err) = self.ack(conn, &entry.id).await {
                        warn!(entry = %entry.id, "XACK failed: {err}");
                        return ListenExit::ConnectionLost;
                    }
                }
            }
        }
    }

    /// Translate one delivered entry into a SEND_MESSAGE push.
    ///
    /// Pure with respect to the stream connection, so the policy is
    /// testable without a broker.
    pub fn forward_entry(&self, entry: &StreamId) -> ForwardOutcome {
        let data: Option<String> = entry.get("data");
        let Some(data) = data else {
            return ForwardOutcome::SkippedMissingData;
        };

        let to_raw: Option<String> = entry.get("to");
        let Some(to_raw) = to_raw else {
            return ForwardOutcome::SkippedBadTarget {
                reason: "missing 'to' field".to_string(),
            };
        };
        let to = match ClientIdentity::from_str(&to_raw) {
            Ok(identity) => identity,
            Err(err) => {
                return ForwardOutcome::SkippedBadTarget {
                    reason: err.to_string(),
                }
            }
        };

        let Some(target) = self.registry.lookup(&to) else {
            return ForwardOutcome::NoTargetConnection { to };
        };

        let from: Option<String> = entry.get("from");
        let request = CommandMessage::request(
            Uuid::new_v4().to_string(),
            "SEND_MESSAGE",
            send_message_params(from.as_deref(), &to_raw, &data),
        );

        if target.send(request.encode()) {
            ForwardOutcome::Forwarded { to }
        } else {
            ForwardOutcome::SendFailed { to }
        }
    }

    async fn ack(&self, conn: &mut MultiplexedConnection, entry_id: &str) -> Result<()> {
        let _: i64 = conn
            .xack(&self.config.stream, &self.config.group, &[entry_id])
            .await?;
        Ok(())
    }

    /// Sleep the jittered backoff delay; returns false if stop was requested
    async fn wait_backoff(
        &self,
        backoff: &mut Backoff,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        self.set_state(BridgeState::Backoff);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(100..300));
        let delay = backoff.next_delay() + jitter;
        info!("Bridge reconnecting in ~{}ms", delay.as_millis());

        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
