//! Integration tests exercising the codec, bus and registry together

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use relay_core::{
    send_message_params, ClientIdentity, ClientRegistry, CommandBus, CommandKind, CommandMessage,
    ConnectionHandle,
};

fn new_connection(remote: &str) -> (ConnectionHandle, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConnectionHandle::new(remote, tx), rx)
}

#[tokio::test]
async fn register_round_trip_over_the_bus() {
    let bus = Arc::new(CommandBus::new(Duration::from_secs(30)));
    bus.register_fn("REGISTER", |req| {
        let who = req.params.first().cloned().unwrap_or_default();
        CommandMessage::response(req.id.clone(), "PONG", vec![format!("Hi there, {who}")])
    });

    let (conn, mut outbound) = new_connection("client-1");
    bus.set_outbound_writer(conn.sender());

    // Frame exactly as a client would send it.
    bus.receive("REQUEST:r1:REGISTER:alice").await;

    // The reply frame is byte-exact; a comma needs no escaping.
    let frame = outbound.recv().await.unwrap();
    assert_eq!(frame, "RESPONSE:r1:PONG:Hi there, alice");
}

#[tokio::test]
async fn stream_entry_forwarded_to_bound_connection() {
    let registry = ClientRegistry::new();
    let identity: ClientIdentity = "u2:d2".parse().unwrap();
    let (conn, mut outbound) = new_connection("client-k");
    registry.bind(identity.clone(), conn);

    // What the stream bridge does for an entry {from, to, data}.
    let target = registry.lookup(&identity).unwrap();
    let request = CommandMessage::request(
        "push-1",
        "SEND_MESSAGE",
        send_message_params(Some("u1:d1"), "u2:d2", "hello"),
    );
    assert!(target.send(request.encode()));

    let frame = outbound.recv().await.unwrap();
    let decoded = CommandMessage::decode(&frame).unwrap();
    assert_eq!(decoded.kind, CommandKind::Request);
    assert_eq!(decoded.name, "SEND_MESSAGE");
    assert_eq!(
        decoded.params,
        vec![
            "FROM:u1:d1".to_string(),
            "TO:u2:d2".to_string(),
            "MESSAGE:hello".to_string(),
        ]
    );
}

#[tokio::test]
async fn reconnect_rebinds_the_outbound_writer() {
    let bus = Arc::new(CommandBus::new(Duration::from_secs(30)));
    bus.register_fn("ECHO", |req| {
        CommandMessage::response(req.id.clone(), "ECHO", req.params.clone())
    });

    let (first, mut first_rx) = new_connection("conn-1");
    bus.set_outbound_writer(first.sender());
    bus.receive("REQUEST:a:ECHO:one").await;
    assert!(first_rx.recv().await.unwrap().ends_with("one"));

    // A new physical connection takes over the single bus instance.
    let (second, mut second_rx) = new_connection("conn-2");
    bus.set_outbound_writer(second.sender());
    bus.receive("REQUEST:b:ECHO:two").await;
    assert!(second_rx.recv().await.unwrap().ends_with("two"));
    assert!(first_rx.try_recv().is_err());
}
