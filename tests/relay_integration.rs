//! End-to-end relay behavior against the in-memory backend: delivery
//! identifiers, queue trimming, failure classification, and connection
//! teardown.

use std::collections::HashSet;

use pretty_assertions::assert_eq;

use mailsink::{
    encoder::JsonEventEncoder,
    envelope::{Envelope, EnvelopeBuilder, RawBuilder},
    relay::{
        BackendConnection, DeliveryResult, Interrupt, MemoryBackend, MemoryConnector,
        PublishRelay, QueueRelay, QueueTrimPolicy, Relay,
    },
};

fn envelope(sender: &str, recipient: &str, content: &str) -> Envelope {
    let mut envelope = RawBuilder.begin(Some(sender.to_string()));
    envelope.push_recipient(recipient.to_string());
    RawBuilder
        .finish(&mut envelope, content.as_bytes().to_vec())
        .expect("raw content is always accepted");
    envelope
}

fn queue_relay(backend: &MemoryBackend, trim: QueueTrimPolicy) -> QueueRelay<MemoryConnector> {
    let connection = BackendConnection::new(backend.connector(), Interrupt::new());
    QueueRelay::new(connection, "events", trim)
}

#[tokio::test]
async fn delivered_message_ids_are_unique() {
    let backend = MemoryBackend::new();
    let relay = queue_relay(&backend, QueueTrimPolicy::default());

    let mut seen = HashSet::new();
    for n in 0..5 {
        match relay
            .attempt(&envelope("a@x.com", "b@y.com", &format!("body {n}")), 0)
            .await
        {
            DeliveryResult::Delivered(id) => {
                let id = id.to_string();
                assert!(!id.is_empty());
                assert!(seen.insert(id), "message id repeated");
            }
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    assert_eq!(backend.list_len("events"), 5);
}

#[tokio::test]
async fn trim_fires_only_above_the_high_water_mark() {
    let backend = MemoryBackend::new();
    let trim = QueueTrimPolicy::new(3, 1).expect("valid policy");
    let relay = queue_relay(&backend, trim);

    for n in 0..3 {
        let result = relay
            .attempt(&envelope("a@x.com", "b@y.com", &format!("body {n}")), 0)
            .await;
        assert!(result.is_delivered());
    }

    // At the mark, nothing is discarded.
    assert_eq!(backend.trim_call_count(), 0);
    assert_eq!(backend.list_len("events"), 3);

    let result = relay
        .attempt(&envelope("a@x.com", "b@y.com", "Subject: hi\n\nbody"), 0)
        .await;
    assert!(result.is_delivered());

    // One push over the mark trims down to the newest entry.
    assert_eq!(backend.trim_call_count(), 1);
    let entries = backend.list("events");
    assert_eq!(entries.len(), 1);

    let event: serde_json::Value =
        serde_json::from_slice(&entries[0]).expect("stored payload is JSON");
    assert_eq!(event["data"]["mailfrom"], "a@x.com");
    assert_eq!(event["data"]["rcptto"][0], "b@y.com");
    assert_eq!(event["data"]["data"], "Subject: hi\n\nbody");
}

#[tokio::test]
async fn queue_operation_failures_are_permanent() {
    let backend = MemoryBackend::new();
    let relay = queue_relay(&backend, QueueTrimPolicy::default());
    backend.fail_operations(1);

    let result = relay.attempt(&envelope("a@x.com", "b@y.com", "body"), 0).await;
    assert!(
        matches!(result, DeliveryResult::Permanent(_)),
        "queue failures never ask for a retry, got {result:?}"
    );

    // The failed handle was discarded; the next attempt reconnects.
    assert!(!relay.connection().is_connected().await);
    let result = relay.attempt(&envelope("a@x.com", "b@y.com", "body"), 1).await;
    assert!(result.is_delivered());
    assert_eq!(backend.connect_count(), 2);
}

#[tokio::test]
async fn publish_failures_are_unclassified() {
    let backend = MemoryBackend::new();
    let connection = BackendConnection::new(backend.connector(), Interrupt::new());
    let relay = PublishRelay::new(connection, "events");
    backend.fail_operations(1);

    let result = relay.attempt(&envelope("a@x.com", "b@y.com", "body"), 0).await;
    assert!(
        matches!(result, DeliveryResult::Unclassified(_)),
        "publish failures carry no classification, got {result:?}"
    );
}

#[tokio::test]
async fn published_payload_matches_the_encoder_output() {
    let backend = MemoryBackend::new();
    let connection = BackendConnection::new(backend.connector(), Interrupt::new());
    let relay = PublishRelay::new(connection, "events");

    let envelope = envelope("a@x.com", "b@y.com", "body");
    let expected = JsonEventEncoder.encode(&envelope).expect("encodes");

    let result = relay.attempt(&envelope, 0).await;
    assert!(result.is_delivered());

    assert_eq!(backend.published("events"), vec![expected.as_bytes().to_vec()]);
}

#[tokio::test]
async fn kill_forces_a_fresh_connection() {
    let backend = MemoryBackend::new();
    let relay = queue_relay(&backend, QueueTrimPolicy::default());

    assert!(relay.attempt(&envelope("a@x.com", "b@y.com", "one"), 0).await.is_delivered());
    assert_eq!(backend.connect_count(), 1);

    relay.kill().await;
    assert!(!relay.connection().is_connected().await);

    assert!(relay.attempt(&envelope("a@x.com", "b@y.com", "two"), 0).await.is_delivered());
    assert_eq!(backend.connect_count(), 2);
}
