// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use tether_core::ServerError;
use thiserror::Error;

use crate::transport::TransportError;

/// Why a request left the offline queue without being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscardReason {
    /// Rejected by the queue filter at enqueue time.
    Filtered,
    /// Pushed out by newer requests once the queue was full.
    Evicted,
    /// Older than the queue TTL.
    Expired,
    /// Dropped by an explicit flush.
    Flushed,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiscardReason::Filtered => "filtered",
            DiscardReason::Evicted => "evicted",
            DiscardReason::Expired => "expired",
            DiscardReason::Flushed => "flushed",
        })
    }
}

/// All possible errors that can occur in a tether session.
///
/// Variants returned synchronously from a call (`Disconnected`,
/// `InvalidState`, `InvalidLoaderEntry`, `NoRuntime`) are caller bugs.
/// Everything else reaches the caller through a response future, a room
/// event or the session event bus.
#[derive(Debug, Error)]
pub enum Error {
    #[error("session is disconnected\n  hint: bind a transport and call connect() first")]
    Disconnected,

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("not connected")]
    NotConnected,

    #[error("request discarded from the offline queue ({0})")]
    Discarded(DiscardReason),

    #[error("connection lost before a response arrived")]
    Abandoned,

    #[error("authentication token expired")]
    TokenExpired,

    #[error("server error: {0}")]
    Server(ServerError),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid offline queue loader entry: missing '{0}'")]
    InvalidLoaderEntry(&'static str),

    #[error("no tokio runtime\n  hint: build the session from within a tokio runtime")]
    NoRuntime,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("config error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] tether_core::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for tether operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
