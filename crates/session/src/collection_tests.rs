// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use serde_json::json;

use crate::config::QueryOptions;
use crate::error::Error;
use crate::room::RoomOptions;
use crate::test_helpers::{accept_subscription, connected_session, test_options};

#[tokio::test]
async fn query_targets_the_collection() {
    let (session, transport) = connected_session(test_options());
    let collection = session.collection("items", Some("shop")).unwrap();

    let future = collection
        .query("document", "get", json!({ "_id": "42" }), QueryOptions::new())
        .unwrap();

    let sent = transport.last_sent();
    assert_eq!(sent.target, collection.target("document", "get"));
    assert_eq!(sent.target.index.as_deref(), Some("shop"));
    assert_eq!(sent.target.collection.as_deref(), Some("items"));
    transport.respond(&sent.request_id, json!({ "_id": "42" }));
    assert_eq!(future.await.unwrap().result()["_id"], "42");
}

#[tokio::test]
async fn subscribe_uses_the_collection() {
    let (session, transport) = connected_session(test_options());
    session.set_default_index("shop");
    let collection = session.collection("items", None).unwrap();

    let room = collection.subscribe(json!({}), RoomOptions::default()).unwrap();

    let request = transport.last_sent_for("subscribe", "on");
    assert_eq!(request.target.index.as_deref(), Some("shop"));
    assert_eq!(request.target.collection.as_deref(), Some("items"));
    accept_subscription(&transport, "room-1", "channel-1");
    assert_eq!(room.room_id().as_deref(), Some("room-1"));
}

#[tokio::test]
async fn handle_outliving_its_session_fails() {
    let (session, _transport) = connected_session(test_options());
    let collection = session.collection("items", Some("shop")).unwrap();
    drop(session);

    let result = collection.query("document", "get", json!({}), QueryOptions::new());

    assert!(matches!(result, Err(Error::InvalidState(_))));
    assert_eq!(collection.name(), "items");
}
