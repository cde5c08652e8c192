// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether - Client-side session engine for a realtime document backend.
//!
//! A [`Session`] keeps one duplex connection to the backend and turns it into
//! a request/response API with realtime subscriptions on top.
//!
//! # Main Components
//!
//! - [`Session`] - Connection state machine, authentication and entry point
//! - [`Transport`] - Pluggable duplex channel; [`WebSocketTransport`] by default
//! - [`OfflineQueue`] - Requests held while the connection is down, replayed in order
//! - [`Room`] - A realtime subscription, renewed across reconnections
//! - [`EventBus`] - Lifecycle events ([`SessionEvent`])
//!
//! # Usage
//!
//! ```rust,ignore
//! use tether::{QueryOptions, Session, SessionOptions, Target};
//!
//! let session = Session::builder(SessionOptions::default())
//!     .websocket("ws://localhost:7512")
//!     .build()?;
//! session.connect()?.await?;
//!
//! let response = session
//!     .query(Target::new("server", "now"), serde_json::json!({}), QueryOptions::new())?
//!     .await?;
//! ```

mod collection;
mod dispatcher;
mod replay;
mod request;
mod room;
mod session;
mod state;

pub mod config;
pub mod error;
pub mod events;
pub mod queue;
pub mod transport;

pub use collection::Collection;
pub use config::{OfflineMode, QueryOptions, SessionOptions};
pub use dispatcher::SDK_VERSION;
pub use error::{DiscardReason, Error, Result};
pub use events::{EventBus, EventKind, ListenerId, SessionEvent};
pub use queue::{OfflineQueue, OfflineQueueLoader, QueueFilter};
pub use replay::ReplayHandle;
pub use request::{QueryRequest, RequestHistory, ResponseFuture};
pub use room::{Room, RoomEvent, RoomOptions};
pub use session::{ConnectHandle, Session, SessionBuilder};
pub use state::SharedSessionState;
pub use transport::{
    EventSink, Transport, TransportError, TransportEvent, TransportResult, WebSocketConfig,
    WebSocketTransport,
};

pub use tether_core::{
    ClockSource, Notification, Presence, Response, ServerError, SessionState, SystemClock,
    Target, TokenValidity,
};

#[cfg(test)]
mod test_helpers;
