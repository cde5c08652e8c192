// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers: an in-memory transport and a manual clock.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tether_core::{ClockSource, Notification, RequestEnvelope, Response, ServerError, SessionState};

use crate::config::SessionOptions;
use crate::events::{EventKind, SessionEvent};
use crate::session::Session;
use crate::transport::{EventSink, Transport, TransportError, TransportEvent, TransportResult};

/// Transport that records emitted requests and lets tests play the server.
#[derive(Default)]
pub struct MockTransport {
    sink: Mutex<Option<EventSink>>,
    sent: Mutex<Vec<RequestEnvelope>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    fail_emit: AtomicBool,
    fail_connect: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(MockTransport::default())
    }

    /// Delivers an event as if it came from the wire.
    pub fn fire(&self, event: TransportEvent) {
        let sink = self.sink.lock().clone();
        sink.expect("transport was never connected").send(event);
    }

    pub fn respond(&self, request_id: &str, result: Value) {
        self.fire(TransportEvent::Response(Response::success(request_id, result)));
    }

    pub fn respond_error(&self, request_id: &str, error: ServerError) {
        self.fire(TransportEvent::Response(Response::failure(request_id, error)));
    }

    pub fn notify(&self, notification: Notification) {
        self.fire(TransportEvent::Notification(notification));
    }

    /// Sink handed over by the last `connect`.
    pub fn sink(&self) -> Option<EventSink> {
        self.sink.lock().clone()
    }

    pub fn sent(&self) -> Vec<RequestEnvelope> {
        self.sent.lock().clone()
    }

    /// `controller:action` of every emitted request, in order.
    pub fn sent_actions(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|r| format!("{}:{}", r.target.controller, r.target.action))
            .collect()
    }

    pub fn last_sent(&self) -> RequestEnvelope {
        self.sent.lock().last().cloned().expect("nothing was sent")
    }

    /// Last emitted request for `controller:action`.
    pub fn last_sent_for(&self, controller: &str, action: &str) -> RequestEnvelope {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|r| r.target.is(controller, action))
            .cloned()
            .unwrap_or_else(|| panic!("no {}:{} request was sent", controller, action))
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    pub fn set_fail_emit(&self, fail: bool) {
        self.fail_emit.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn connect(&self, sink: EventSink) -> TransportResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed("refused".to_string()));
        }
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn emit(&self, request: &RequestEnvelope) -> TransportResult<()> {
        if self.fail_emit.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("socket closed".to_string()));
        }
        self.sent.lock().push(request.clone());
        Ok(())
    }
}

/// Clock advanced by hand.
#[derive(Debug, Default)]
pub struct MockClock {
    now_ms: AtomicU64,
}

impl MockClock {
    pub fn new(now_ms: u64) -> Arc<Self> {
        Arc::new(MockClock { now_ms: AtomicU64::new(now_ms) })
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl ClockSource for MockClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Options with an immediate replay, so tests never wait on timers.
pub fn test_options() -> SessionOptions {
    SessionOptions { replay_interval_ms: 0, ..SessionOptions::default() }
}

pub fn build_session(options: SessionOptions) -> (Session, Arc<MockTransport>) {
    let transport = MockTransport::new();
    let session = Session::builder(options).transport(transport.clone()).build().unwrap();
    (session, transport)
}

/// A session that went through a successful first connection.
pub fn connected_session(options: SessionOptions) -> (Session, Arc<MockTransport>) {
    let (session, transport) = build_session(options);
    let _ = session.connect().unwrap();
    transport.fire(TransportEvent::Connected);
    assert_eq!(session.state(), SessionState::Connected);
    (session, transport)
}

/// Collects every event of `kind` the session triggers.
pub fn record_events(session: &Session, kind: EventKind) -> Arc<Mutex<Vec<SessionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    session.add_listener(kind, move |event| sink.lock().push(event.clone()));
    events
}

/// Answers the latest `subscribe:on` request with the given room and channel.
pub fn accept_subscription(transport: &MockTransport, room_id: &str, channel: &str) {
    let request = transport.last_sent_for("subscribe", "on");
    transport.respond(&request.request_id, json!({ "roomId": room_id, "channel": channel }));
}
