// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::{json, Map};
use tether_core::{SessionState, Target};

use crate::events::EventKind;
use crate::test_helpers::{connected_session, test_options};

fn test_envelope() -> RequestEnvelope {
    RequestEnvelope {
        target: Target::new("server", "now"),
        body: json!({}),
        request_id: "r1".to_string(),
        volatile: Map::new(),
        jwt: None,
        refresh: None,
        extra: Map::new(),
    }
}

#[test]
fn config_follows_session_options() {
    let options = SessionOptions {
        auto_reconnect: false,
        max_reconnect_attempts: 4,
        max_reconnect_delay_secs: 5,
        reconnection_delay_ms: 250,
        ..SessionOptions::default()
    };
    let config = WebSocketConfig::from_options("ws://example:7512", &options);

    assert_eq!(config.url, "ws://example:7512");
    assert!(!config.auto_reconnect);
    assert_eq!(config.max_retries, 4);
    assert_eq!(config.max_delay_secs, 5);
    assert_eq!(config.initial_delay_ms, 250);
}

#[test]
fn emit_before_connect_fails() {
    let transport = WebSocketTransport::new(WebSocketConfig::default());
    let err = transport.emit(&test_envelope()).unwrap_err();
    assert!(matches!(err, TransportError::ConnectionClosed));
}

#[test]
fn connect_outside_runtime_fails() {
    let transport = WebSocketTransport::new(WebSocketConfig::default());
    let err = transport.connect(EventSink::new(Weak::new())).unwrap_err();
    assert!(matches!(err, TransportError::ConnectionFailed(_)));
}

#[tokio::test]
async fn emit_after_disconnect_fails() {
    let transport = WebSocketTransport::new(WebSocketConfig {
        url: "ws://127.0.0.1:1".to_string(),
        ..WebSocketConfig::default()
    });
    transport.connect(EventSink::new(Weak::new())).unwrap();
    transport.emit(&test_envelope()).unwrap();

    transport.disconnect();
    assert!(matches!(
        transport.emit(&test_envelope()),
        Err(TransportError::ConnectionClosed)
    ));
}

#[test]
fn sink_without_session_is_closed() {
    let sink = EventSink::new(Weak::new());
    assert!(sink.is_closed());
    assert!(!sink.send(TransportEvent::Connected));
}

#[test]
fn inbound_messages_map_to_events() {
    let response = InboundMessage::from_json(r#"{"requestId":"r1","result":{}}"#).unwrap();
    assert!(matches!(TransportEvent::from(response), TransportEvent::Response(r) if r.request_id == "r1"));

    let notification = InboundMessage::from_json(r#"{"room":"chan","action":"create"}"#).unwrap();
    assert!(matches!(
        TransportEvent::from(notification),
        TransportEvent::Notification(n) if n.room == "chan"
    ));
}

#[tokio::test]
async fn frames_written_before_the_loss_is_seen_are_dropped() {
    let (session, _mock) = connected_session(test_options());
    let (tx, mut rx) = mpsc::unbounded_channel();
    tx.send("before".to_string()).unwrap();
    let late = tx.clone();
    session.add_listener(EventKind::Disconnected, move |_| {
        let _ = late.send("during".to_string());
    });

    let sink = EventSink::new(session.shared().me.clone());
    assert!(report_loss(&sink, &mut rx));

    assert_eq!(session.state(), SessionState::Offline);
    assert!(rx.try_recv().is_err());
    tx.send("after".to_string()).unwrap();
    assert_eq!(rx.try_recv().unwrap(), "after");
}

#[test]
fn loss_without_session_reports_closed() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tx.send("stale".to_string()).unwrap();

    assert!(!report_loss(&EventSink::new(Weak::new()), &mut rx));
    assert!(rx.try_recv().is_err());
}
