//! End-to-end tests: typed senders talking to a dispatcher-driven receiver
//! over loopback TCP.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tagwire::prelude::*;
use tagwire::{ProtocolError, Structured, TransportError, TypedReceiver, TypedSender};

const WAIT: Duration = Duration::from_secs(2);

// =========================================================================
// Fixtures
// =========================================================================

const COMMIT: u8 = 10;
const PREPARE: u8 = 140;
const PREPARE_REPLY: u8 = 141;
const UNKNOWN: u8 = 150;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Prepare {
    ballot: u64,
    instance: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PrepareReply {
    instance: u64,
    ok: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Commit {
    instance: u64,
    value: Vec<u8>,
}

fn registry() -> Arc<Registry<JsonCodec>> {
    let mut registry = Registry::new();
    registry
        .register::<Commit>(COMMIT)
        .register::<Prepare>(PREPARE)
        .register::<PrepareReply>(PREPARE_REPLY);
    Arc::new(registry)
}

/// Accepts ballots above 5. A bare prepare gets a bare reply.
fn acceptor() -> Dispatcher<Option<Structured>> {
    let mut dispatcher = Dispatcher::new();
    dispatcher
        .on(PREPARE, |msg: &TypedMessage| {
            let Some(prepare) = msg.payload_as::<Prepare>() else {
                return Some(TypedMessage::new(PREPARE_REPLY, None));
            };
            Some(TypedMessage::typed(
                PREPARE_REPLY,
                PrepareReply {
                    instance: prepare.instance,
                    ok: prepare.ballot > 5,
                },
            ))
        })
        .on(COMMIT, |_: &TypedMessage| None);
    dispatcher
}

async fn start(registry: Arc<Registry<JsonCodec>>) -> (TypedReceiver<JsonCodec>, String) {
    tagwire::logging::init(tracing::Level::DEBUG);

    let mut receiver = ReceiverBuilder::new()
        .queue_capacity(4)
        .build_with_format(registry);
    let addr = receiver.listen("127.0.0.1:0").await.unwrap().to_string();
    receiver.go_start().unwrap();

    let dispatcher = Arc::new(acceptor());
    let inbox = receiver.inbox();
    tokio::spawn(async move { dispatcher.run(inbox).await });
    (receiver, addr)
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_typed_request_reply_through_dispatcher() {
    let registry = registry();
    let (_receiver, addr) = start(Arc::clone(&registry)).await;
    let mut sender: TypedSender<JsonCodec> =
        Sender::connect_with(&addr, registry, SenderConfig::default())
            .await
            .unwrap();

    for (ballot, ok) in [(3, false), (9, true)] {
        let request = TypedMessage::typed(
            PREPARE,
            Prepare {
                ballot,
                instance: ballot * 10,
            },
        );
        let reply = tokio::time::timeout(WAIT, sender.send(&request))
            .await
            .unwrap()
            .unwrap()
            .expect("prepare requires a reply");
        assert_eq!(
            reply.payload_as::<PrepareReply>(),
            Some(&PrepareReply {
                instance: ballot * 10,
                ok
            })
        );
    }
}

#[tokio::test]
async fn test_fire_and_forget_then_request_on_one_connection() {
    let registry = registry();
    let (_receiver, addr) = start(Arc::clone(&registry)).await;
    let mut sender: TypedSender<JsonCodec> =
        Sender::connect_with(&addr, registry, SenderConfig::default())
            .await
            .unwrap();

    let commit = TypedMessage::typed(
        COMMIT,
        Commit {
            instance: 1,
            value: b"x=1".to_vec(),
        },
    );
    assert!(sender.send(&commit).await.unwrap().is_none());

    let prepare = TypedMessage::typed(PREPARE, Prepare { ballot: 7, instance: 2 });
    let reply = tokio::time::timeout(WAIT, sender.send(&prepare))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply.tag(), Tag::new(PREPARE_REPLY));
}

#[tokio::test]
async fn test_empty_typed_payload_round_trips() {
    let registry = registry();
    let (_receiver, addr) = start(Arc::clone(&registry)).await;
    let mut sender: TypedSender<JsonCodec> =
        Sender::connect_with(&addr, registry, SenderConfig::default())
            .await
            .unwrap();

    let reply = tokio::time::timeout(WAIT, sender.send(&TypedMessage::new(PREPARE, None)))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply.tag(), Tag::new(PREPARE_REPLY));
    assert!(reply.payload().is_none());
}

#[tokio::test]
async fn test_unregistered_tag_fails_before_the_wire() {
    let registry = registry();
    let (_receiver, addr) = start(Arc::clone(&registry)).await;
    let mut sender: TypedSender<JsonCodec> =
        Sender::connect_with(&addr, registry, SenderConfig::default())
            .await
            .unwrap();

    let result = sender.send(&TypedMessage::new(UNKNOWN, None)).await;
    assert!(matches!(
        result,
        Err(TransportError::SendFailed(ProtocolError::UnregisteredTag(_)))
    ));
    assert!(!sender.is_connected());
}

#[tokio::test]
async fn test_local_and_remote_requests_share_consumers() {
    let registry = registry();
    let (receiver, addr) = start(Arc::clone(&registry)).await;

    let local = receiver
        .deliver_locally(TypedMessage::typed(PREPARE, Prepare { ballot: 6, instance: 1 }))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        local.payload_as::<PrepareReply>(),
        Some(&PrepareReply {
            instance: 1,
            ok: true
        })
    );

    let mut sender: TypedSender<JsonCodec> =
        Sender::connect_with(&addr, registry, SenderConfig::default())
            .await
            .unwrap();
    let remote = sender
        .send(&TypedMessage::typed(PREPARE, Prepare { ballot: 1, instance: 2 }))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        remote.payload_as::<PrepareReply>(),
        Some(&PrepareReply {
            instance: 2,
            ok: false
        })
    );
}

#[tokio::test]
async fn test_errors_convert_into_tagwire_error() {
    async fn connect_nowhere() -> Result<(), TagwireError> {
        let closed = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        Sender::connect(&closed.to_string()).await?;
        Ok(())
    }

    let err = connect_nowhere().await.unwrap_err();
    assert!(matches!(
        err,
        TagwireError::Transport(TransportError::Connect(_))
    ));
}
