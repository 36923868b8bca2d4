//! Command bus with request/response correlation
//!
//! Multiplexes many concurrent request/response exchanges over one duplex
//! text channel, and dispatches inbound requests to registered handlers. One
//! bus instance is reused across physical connections serially; the outbound
//! writer is rebound whenever a different connection delivers traffic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::BusError;
use crate::wire::CommandMessage;

// ----------------------------------------------------------------------------
// Handler Trait
// ----------------------------------------------------------------------------

/// Handler for one named command.
///
/// Handlers are awaited inline on the delivery path: a handler that blocks,
/// blocks that connection's inbound processing. Handlers are expected to be
/// fast or to perform their own asynchronous hand-off.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, request: &CommandMessage) -> CommandMessage;
}

/// Adapter turning a plain function into a [`CommandHandler`]
struct FnHandler<F>(F);

#[async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(&CommandMessage) -> CommandMessage + Send + Sync,
{
    async fn handle(&self, request: &CommandMessage) -> CommandMessage {
        (self.0)(request)
    }
}

// ----------------------------------------------------------------------------
// Command Bus
// ----------------------------------------------------------------------------

/// Single-argument "send a frame" capability, rebound per physical connection
pub type OutboundWriter = mpsc::UnboundedSender<String>;

/// Correlating command bus
pub struct CommandBus {
    /// Command name -> handler
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
    /// Correlation id -> in-flight completion handle
    pending: Mutex<HashMap<String, oneshot::Sender<CommandMessage>>>,
    /// Current outbound writer, if any connection is bound
    writer: Mutex<Option<OutboundWriter>>,
    /// Deadline applied when `request` is called without an explicit timeout
    default_timeout: Duration,
}

impl CommandBus {
    /// Create a bus with the given default request timeout
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            writer: Mutex::new(None),
            default_timeout,
        }
    }

    /// Register a handler for a command name
    pub fn register<N: Into<String>>(&self, name: N, handler: Arc<dyn CommandHandler>) {
        self.handlers
            .write()
            .expect("handler table poisoned")
            .insert(name.into(), handler);
    }

    /// Register a plain function as a handler
    pub fn register_fn<N, F>(&self, name: N, handler: F)
    where
        N: Into<String>,
        F: Fn(&CommandMessage) -> CommandMessage + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnHandler(handler)));
    }

    /// Rebind the outbound writer to a new physical connection
    pub fn set_outbound_writer(&self, writer: OutboundWriter) {
        *self.writer.lock().expect("writer slot poisoned") = Some(writer);
    }

    /// Number of requests currently awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending map poisoned").len()
    }

    /// Send a REQUEST and await its RESPONSE or ERROR.
    ///
    /// Resolves with a timeout failure if no reply arrives before the
    /// deadline (the caller-supplied one, or the bus default). Whichever of
    /// reply and deadline happens first wins; the other resolution is a
    /// harmless no-op.
    pub async fn request(
        &self,
        name: &str,
        params: Vec<String>,
        timeout: Option<Duration>,
    ) -> Result<CommandMessage, BusError> {
        let id = Uuid::new_v4().to_string();
        let msg = CommandMessage::request(id.clone(), name, params);
        let frame = msg.encode();

        let writer = self
            .writer
            .lock()
            .expect("writer slot poisoned")
            .clone()
            .ok_or(BusError::NoWriter)?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending map poisoned")
            .insert(id.clone(), tx);

        if writer.send(frame).is_err() {
            self.remove_pending(&id);
            return Err(BusError::WriterClosed);
        }

        let deadline = timeout.unwrap_or(self.default_timeout);
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                self.remove_pending(&id);
                Err(BusError::ReplyChannelClosed)
            }
            Err(_elapsed) => {
                self.remove_pending(&id);
                Err(BusError::Timeout {
                    name: name.to_string(),
                    after_ms: deadline.as_millis() as u64,
                })
            }
        }
    }

    /// Process one raw inbound frame.
    ///
    /// RESPONSE/ERROR frames resolve their pending request exactly once
    /// (remove-then-complete); a reply with no outstanding correlation is a
    /// silent no-op. REQUEST frames are dispatched to their handler; an
    /// unparsable frame or unknown command name is answered with an
    /// ERROR-kind reply and never faults the bus.
    pub async fn receive(&self, raw: &str) {
        let msg = match CommandMessage::decode(raw) {
            Ok(msg) => msg,
            Err(err) => {
                warn!("Dropping unparsable frame: {err}");
                let id = recover_correlation_id(raw).unwrap_or_else(|| "-".to_string());
                self.write_frame(
                    CommandMessage::error(id, "BAD_REQUEST", vec![err.to_string()]).encode(),
                );
                return;
            }
        };

        if msg.kind.is_reply() {
            match self.remove_pending(&msg.id) {
                Some(tx) => {
                    // Receiver may already be gone after a timeout fired.
                    let _ = tx.send(msg);
                }
                None => {
                    debug!(id = %msg.id, "Reply with no pending request, dropping");
                }
            }
            return;
        }

        let handler = self
            .handlers
            .read()
            .expect("handler table poisoned")
            .get(&msg.name)
            .cloned();

        match handler {
            Some(handler) => {
                let reply = handler.handle(&msg).await;
                self.write_frame(reply.encode());
            }
            None => {
                warn!(command = %msg.name, "No handler registered");
                self.write_frame(
                    CommandMessage::error(
                        msg.id.clone(),
                        "UNKNOWN_COMMAND",
                        vec![format!("no handler registered for '{}'", msg.name)],
                    )
                    .encode(),
                );
            }
        }
    }

    fn remove_pending(&self, id: &str) -> Option<oneshot::Sender<CommandMessage>> {
        self.pending.lock().expect("pending map poisoned").remove(id)
    }

    fn write_frame(&self, frame: String) {
        let writer = self.writer.lock().expect("writer slot poisoned").clone();
        match writer {
            Some(writer) => {
                if writer.send(frame).is_err() {
                    warn!("Outbound writer closed while writing reply");
                }
            }
            None => warn!("No outbound writer bound, dropping reply frame"),
        }
    }
}

/// Best-effort extraction of the correlation id from an unparsable frame.
///
/// Correlation ids are generated as UUIDs, so a naive split is adequate for
/// the error-reply path.
fn recover_correlation_id(raw: &str) -> Option<String> {
    let id = raw.split(':').nth(1)?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::CommandKind;

    fn bus_with_writer() -> (Arc<CommandBus>, mpsc::UnboundedReceiver<String>) {
        let bus = Arc::new(CommandBus::new(Duration::from_secs(30)));
        let (tx, rx) = mpsc::unbounded_channel();
        bus.set_outbound_writer(tx);
        (bus, rx)
    }

    #[tokio::test]
    async fn request_without_writer_fails() {
        let bus = CommandBus::new(Duration::from_millis(50));
        let err = bus.request("PING", vec![], None).await.unwrap_err();
        assert!(matches!(err, BusError::NoWriter));
    }

    #[tokio::test(start_paused = true)]
    async fn request_times_out_and_clears_pending() {
        let (bus, mut rx) = bus_with_writer();

        let err = bus
            .request("PING", vec![], Some(Duration::from_millis(100)))
            .await
            .unwrap_err();

        assert!(matches!(err, BusError::Timeout { after_ms: 100, .. }));
        assert_eq!(bus.pending_count(), 0);

        // The frame was still written before the deadline elapsed.
        let frame = rx.recv().await.unwrap();
        assert!(frame.starts_with("REQUEST:"));
    }

    #[tokio::test]
    async fn late_reply_after_timeout_is_a_no_op() {
        let (bus, mut rx) = bus_with_writer();

        let err = bus
            .request("PING", vec![], Some(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Timeout { .. }));

        let frame = rx.recv().await.unwrap();
        let sent = CommandMessage::decode(&frame).unwrap();

        // Reply arrives after the deadline already fired.
        bus.receive(&CommandMessage::response(sent.id, "PONG", vec![]).encode())
            .await;
        assert_eq!(bus.pending_count(), 0);
    }

    #[tokio::test]
    async fn reply_resolves_matching_request() {
        let (bus, mut rx) = bus_with_writer();

        let requester = {
            let bus = bus.clone();
            tokio::spawn(async move {
                bus.request("ECHO", vec!["hello".to_string()], Some(Duration::from_secs(5)))
                    .await
            })
        };

        let frame = rx.recv().await.unwrap();
        let sent = CommandMessage::decode(&frame).unwrap();
        assert_eq!(sent.kind, CommandKind::Request);
        assert_eq!(sent.name, "ECHO");

        bus.receive(
            &CommandMessage::response(sent.id, "ECHO", vec!["hello".to_string()]).encode(),
        )
        .await;

        let reply = requester.await.unwrap().unwrap();
        assert_eq!(reply.kind, CommandKind::Response);
        assert_eq!(reply.params, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn error_reply_resolves_request_too() {
        let (bus, mut rx) = bus_with_writer();

        let requester = {
            let bus = bus.clone();
            tokio::spawn(async move {
                bus.request("DO_THING", vec![], Some(Duration::from_secs(5))).await
            })
        };

        let sent = CommandMessage::decode(&rx.recv().await.unwrap()).unwrap();
        bus.receive(
            &CommandMessage::error(sent.id, "ERROR", vec!["boom".to_string()]).encode(),
        )
        .await;

        let reply = requester.await.unwrap().unwrap();
        assert_eq!(reply.kind, CommandKind::Error);
    }

    #[tokio::test]
    async fn concurrent_requests_resolve_independently() {
        let (bus, mut rx) = bus_with_writer();

        let first = {
            let bus = bus.clone();
            tokio::spawn(async move {
                bus.request("A", vec![], Some(Duration::from_secs(5))).await
            })
        };
        let second = {
            let bus = bus.clone();
            tokio::spawn(async move {
                bus.request("B", vec![], Some(Duration::from_secs(5))).await
            })
        };

        let sent_a = CommandMessage::decode(&rx.recv().await.unwrap()).unwrap();
        let sent_b = CommandMessage::decode(&rx.recv().await.unwrap()).unwrap();
        assert_ne!(sent_a.id, sent_b.id);

        // Resolve in reverse order of sending.
        bus.receive(&CommandMessage::response(sent_b.id, sent_b.name, vec![]).encode())
            .await;
        bus.receive(&CommandMessage::response(sent_a.id, sent_a.name, vec![]).encode())
            .await;

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        assert_eq!(bus.pending_count(), 0);
    }

    #[tokio::test]
    async fn request_dispatches_to_handler() {
        let (bus, mut rx) = bus_with_writer();
        bus.register_fn("REGISTER", |req| {
            let who = req.params.first().cloned().unwrap_or_default();
            CommandMessage::response(req.id.clone(), "PONG", vec![format!("Hi there, {who}")])
        });

        bus.receive("REQUEST:r1:REGISTER:alice").await;

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply, "RESPONSE:r1:PONG:Hi there, alice");
    }

    #[tokio::test]
    async fn unknown_command_gets_error_reply() {
        let (bus, mut rx) = bus_with_writer();

        bus.receive("REQUEST:r9:NO_SUCH_COMMAND").await;

        let reply = CommandMessage::decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(reply.kind, CommandKind::Error);
        assert_eq!(reply.id, "r9");
        assert_eq!(reply.name, "UNKNOWN_COMMAND");
    }

    #[tokio::test]
    async fn unparsable_frame_gets_error_reply() {
        let (bus, mut rx) = bus_with_writer();

        bus.receive("GIBBERISH:r4:WHAT").await;

        let reply = CommandMessage::decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(reply.kind, CommandKind::Error);
        assert_eq!(reply.id, "r4");
        assert_eq!(reply.name, "BAD_REQUEST");
    }

    #[tokio::test]
    async fn reply_without_pending_request_is_dropped() {
        let (bus, mut rx) = bus_with_writer();

        bus.receive("RESPONSE:nobody:PONG").await;

        // No reply frame is produced for an uncorrelated response.
        assert!(rx.try_recv().is_err());
    }
}
