// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tether_core::{SessionState, Target};

use crate::config::{QueryOptions, SessionOptions};
use crate::error::{DiscardReason, Error};
use crate::events::{EventKind, SessionEvent};
use crate::request::QueryRequest;
use crate::session::Session;
use crate::test_helpers::{connected_session, test_options, MockClock, MockTransport};
use crate::transport::TransportEvent;

fn queuing_options() -> SessionOptions {
    SessionOptions { auto_queue: true, ..test_options() }
}

/// A connected session that lost its connection and is queuing.
fn offline_session(options: SessionOptions) -> (Session, Arc<MockTransport>) {
    let (session, transport) = connected_session(options);
    transport.fire(TransportEvent::Disconnected);
    transport.clear_sent();
    assert!(session.is_queuing());
    (session, transport)
}

fn queue(session: &Session, request_id: &str) -> crate::request::ResponseFuture {
    session
        .query(
            Target::new("document", "create"),
            json!({ "id": request_id }),
            QueryOptions::new().with_request_id(request_id),
        )
        .unwrap()
}

fn sent_ids(transport: &MockTransport) -> Vec<String> {
    transport.sent().into_iter().map(|r| r.request_id).collect()
}

fn loaded(request_id: &str, marker: &str) -> QueryRequest {
    QueryRequest::new(Target::new("document", "create"), json!({ "from": marker }))
        .with_request_id(request_id)
}

#[tokio::test]
async fn reconnect_replays_queue_in_order() {
    let options = SessionOptions { auto_replay: true, ..queuing_options() };
    let (session, transport) = offline_session(options);
    let popped = Arc::new(Mutex::new(Vec::new()));
    let sink = popped.clone();
    session.add_listener(EventKind::OfflineQueuePop, move |event| {
        if let SessionEvent::OfflineQueuePop { request } = event {
            sink.lock().push(request.request_id.clone());
        }
    });
    let futures: Vec<_> = ["a", "b", "c"].iter().map(|id| queue(&session, id)).collect();

    transport.fire(TransportEvent::Reconnected);

    assert_eq!(sent_ids(&transport), vec!["a", "b", "c"]);
    assert_eq!(*popped.lock(), vec!["a", "b", "c"]);
    assert_eq!(session.queue_len(), 0);
    assert!(!session.is_queuing());

    transport.respond("b", json!({ "created": "b" }));
    let mut futures = futures;
    let b = futures.remove(1);
    assert_eq!(b.await.unwrap().result()["created"], "b");
}

#[tokio::test]
async fn reconnect_without_auto_replay_keeps_queue() {
    let (session, transport) = offline_session(queuing_options());
    let _a = queue(&session, "a");

    transport.fire(TransportEvent::Reconnected);

    assert!(transport.sent().is_empty());
    assert_eq!(session.queue_len(), 1);

    let sent = session.replay_queue().unwrap().await;
    assert_eq!(sent, 1);
    assert_eq!(sent_ids(&transport), vec!["a"]);
}

#[tokio::test]
async fn replay_while_offline_sends_nothing() {
    let (session, transport) = offline_session(queuing_options());
    let _a = queue(&session, "a");

    let sent = session.replay_queue().unwrap().await;

    assert_eq!(sent, 0);
    assert!(transport.sent().is_empty());
    assert_eq!(session.queue_len(), 1);
}

#[tokio::test]
async fn loader_duplicates_prefer_local_entries() {
    let (session, transport) = offline_session(queuing_options());
    let _a = queue(&session, "a");
    let _b = queue(&session, "b");
    session.set_queue_loader(Some(Arc::new(|| {
        vec![loaded("b", "loader"), loaded("c", "loader"), loaded("c", "loader-again")]
    })));
    transport.fire(TransportEvent::Reconnected);

    session.replay_queue().unwrap().await;

    let sent = transport.sent();
    let ids: Vec<_> = sent.iter().map(|r| r.request_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(sent[1].body, json!({ "id": "b" }));
    assert_eq!(sent[2].body, json!({ "from": "loader" }));
}

#[tokio::test]
async fn loader_skips_recently_sent_requests() {
    let (session, transport) = connected_session(test_options());
    let _sent = queue(&session, "done");
    transport.clear_sent();
    session.set_queue_loader(Some(Arc::new(|| vec![loaded("done", "loader"), loaded("new", "loader")])));

    session.replay_queue().unwrap().await;

    assert_eq!(sent_ids(&transport), vec!["new"]);
}

#[tokio::test]
async fn malformed_loader_entry_aborts_replay() {
    let (session, transport) = offline_session(queuing_options());
    let _a = queue(&session, "a");
    session.set_queue_loader(Some(Arc::new(|| {
        vec![loaded("ok", "loader"), QueryRequest::new(Target::new("", "create"), json!({}))]
    })));
    transport.fire(TransportEvent::Reconnected);

    let result = session.replay_queue();

    assert!(matches!(result, Err(Error::InvalidLoaderEntry("controller"))));
    assert!(transport.sent().is_empty());
    assert_eq!(session.queue_len(), 1);
}

#[tokio::test]
async fn expired_entries_are_discarded_before_replay() {
    let clock = MockClock::new(1_000);
    let transport = MockTransport::new();
    let options = SessionOptions { queue_ttl_ms: 500, ..queuing_options() };
    let session = Session::builder(options)
        .transport(transport.clone())
        .clock(clock.clone())
        .build()
        .unwrap();
    let _ = session.connect().unwrap();
    transport.fire(TransportEvent::Connected);
    transport.fire(TransportEvent::Disconnected);

    let old = queue(&session, "old");
    clock.advance(400);
    let _fresh = queue(&session, "fresh");
    clock.advance(200);
    transport.fire(TransportEvent::Reconnected);
    transport.clear_sent();

    session.replay_queue().unwrap().await;

    assert!(matches!(old.await, Err(Error::Discarded(DiscardReason::Expired))));
    assert_eq!(sent_ids(&transport), vec!["fresh"]);
}

#[tokio::test]
async fn paced_replay_sends_everything() {
    let options = SessionOptions { replay_interval_ms: 5, ..queuing_options() };
    let (session, transport) = offline_session(options);
    let _futures: Vec<_> = ["a", "b", "c"].iter().map(|id| queue(&session, id)).collect();
    transport.fire(TransportEvent::Reconnected);

    let first = session.replay_queue().unwrap();
    let second = session.replay_queue().unwrap();

    assert_eq!(second.await, 0);
    assert_eq!(first.await, 3);
    assert_eq!(sent_ids(&transport), vec!["a", "b", "c"]);
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn failed_emit_puts_request_back_at_the_front() {
    let (session, transport) = offline_session(queuing_options());
    let _a = queue(&session, "a");
    let _b = queue(&session, "b");
    transport.fire(TransportEvent::Reconnected);
    transport.set_fail_emit(true);

    let sent = session.replay_queue().unwrap().await;

    assert_eq!(sent, 0);
    let queued: Vec<_> = session.queued_requests().into_iter().map(|r| r.request_id).collect();
    assert_eq!(queued, vec!["a", "b"]);
}
