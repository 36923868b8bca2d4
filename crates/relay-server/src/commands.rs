//! Built-in command handlers
//!
//! REGISTER answers with a greeting; SEND_MESSAGE validates its structured
//! parameters and publishes the message onto the durable stream for the
//! bridge (or any other consumer group) to deliver.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use relay_bridge::Publish;
use relay_core::params::{send_message_spec, ParamSpec};
use relay_core::{CommandBus, CommandHandler, CommandMessage};

// ----------------------------------------------------------------------------
// REGISTER
// ----------------------------------------------------------------------------

/// Greets a registering client by name
pub struct RegisterHandler;

#[async_trait]
impl CommandHandler for RegisterHandler {
    async fn handle(&self, request: &CommandMessage) -> CommandMessage {
        match request.params.first().filter(|name| !name.is_empty()) {
            Some(name) => {
                debug!(%name, "REGISTER");
                CommandMessage::response(
                    request.id.clone(),
                    "PONG",
                    vec![format!("Hi there, {name}")],
                )
            }
            None => CommandMessage::error(
                request.id.clone(),
                "ERROR",
                vec!["missing required parameter: name".to_string()],
            ),
        }
    }
}

// ----------------------------------------------------------------------------
// SEND_MESSAGE
// ----------------------------------------------------------------------------

/// Publishes a client message onto the durable stream
pub struct SendMessageHandler {
    publisher: Arc<dyn Publish>,
    spec: ParamSpec,
}

impl SendMessageHandler {
    pub fn new(publisher: Arc<dyn Publish>) -> Self {
        Self {
            publisher,
            spec: send_message_spec(),
        }
    }
}

#[async_trait]
impl CommandHandler for SendMessageHandler {
    async fn handle(&self, request: &CommandMessage) -> CommandMessage {
        let parsed = match self.spec.parse(&request.params) {
            Ok(parsed) => parsed,
            Err(err) => {
                return CommandMessage::error(request.id.clone(), "ERROR", vec![err.to_string()])
            }
        };

        let (Some(to), Some(message)) = (parsed.get("TO"), parsed.get("MESSAGE")) else {
            return CommandMessage::error(
                request.id.clone(),
                "ERROR",
                vec!["missing required parameter: TO or MESSAGE".to_string()],
            );
        };

        match self.publisher.publish(parsed.get("FROM"), to, message).await {
            Ok(entry_id) => CommandMessage::response(
                request.id.clone(),
                "ACK",
                vec![format!("entry_id={entry_id}")],
            ),
            Err(err) => {
                CommandMessage::error(request.id.clone(), "ERROR", vec![err.to_string()])
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Registration
// ----------------------------------------------------------------------------

/// Register the built-in handlers on the bus
pub fn register_handlers(bus: &CommandBus, publisher: Arc<dyn Publish>) {
    bus.register("REGISTER", Arc::new(RegisterHandler));
    bus.register("SEND_MESSAGE", Arc::new(SendMessageHandler::new(publisher)));
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use relay_bridge::error::Result as BridgeResult;
    use relay_core::CommandKind;

    /// Publisher stub recording calls, optionally failing
    struct StubPublisher {
        calls: Mutex<Vec<(Option<String>, String, String)>>,
        fail: bool,
    }

    impl StubPublisher {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl Publish for StubPublisher {
        async fn publish(&self, from: Option<&str>, to: &str, data: &str) -> BridgeResult<String> {
            if self.fail {
                return Err(relay_bridge::BridgeError::GroupSetup {
                    reason: "broker unavailable".to_string(),
                });
            }
            self.calls.lock().unwrap().push((
                from.map(String::from),
                to.to_string(),
                data.to_string(),
            ));
            Ok("1-0".to_string())
        }
    }

    #[tokio::test]
    async fn register_greets_by_name() {
        let reply = RegisterHandler
            .handle(&CommandMessage::request(
                "r1",
                "REGISTER",
                vec!["alice".to_string()],
            ))
            .await;

        assert_eq!(reply.encode(), "RESPONSE:r1:PONG:Hi there, alice");
    }

    #[tokio::test]
    async fn register_without_name_is_an_error() {
        let reply = RegisterHandler
            .handle(&CommandMessage::request("r2", "REGISTER", vec![]))
            .await;
        assert_eq!(reply.kind, CommandKind::Error);
        assert_eq!(reply.id, "r2");
    }

    #[tokio::test]
    async fn send_message_publishes_and_acks() {
        let publisher = StubPublisher::new(false);
        let handler = SendMessageHandler::new(publisher.clone());

        let reply = handler
            .handle(&CommandMessage::request(
                "r3",
                "SEND_MESSAGE",
                vec![
                    "FROM:u1:d1".to_string(),
                    "TO:u2:d2".to_string(),
                    "MESSAGE:hello".to_string(),
                ],
            ))
            .await;

        assert_eq!(reply.kind, CommandKind::Response);
        assert_eq!(reply.name, "ACK");
        assert_eq!(reply.params, vec!["entry_id=1-0".to_string()]);

        let calls = publisher.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[(
                Some("u1:d1".to_string()),
                "u2:d2".to_string(),
                "hello".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn send_message_missing_message_is_an_error() {
        let handler = SendMessageHandler::new(StubPublisher::new(false));

        let reply = handler
            .handle(&CommandMessage::request(
                "r4",
                "SEND_MESSAGE",
                vec!["TO:u2:d2".to_string()],
            ))
            .await;

        assert_eq!(reply.kind, CommandKind::Error);
        assert!(reply.params[0].contains("MESSAGE"));
    }

    #[tokio::test]
    async fn send_message_publish_failure_surfaces_as_error_reply() {
        let handler = SendMessageHandler::new(StubPublisher::new(true));

        let reply = handler
            .handle(&CommandMessage::request(
                "r5",
                "SEND_MESSAGE",
                vec!["TO:u2:d2".to_string(), "MESSAGE:hello".to_string()],
            ))
            .await;

        assert_eq!(reply.kind, CommandKind::Error);
        assert_eq!(reply.id, "r5");
        assert!(reply.params[0].contains("broker unavailable"));
    }
}
