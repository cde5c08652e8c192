// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Session connection states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// State of a session's connection to the backend.
///
/// Exactly one state is active at a time. `Disconnected` is entered only by
/// an explicit disconnect and rejects every query; `Offline` is the transient
/// state of a lost connection, during which requests may be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Built, never connected.
    Ready,
    /// Waiting for the transport to report a connection.
    Connecting,
    /// Connected; requests are sent immediately.
    Connected,
    /// Connection lost, automatic reconnection in progress.
    Offline,
    /// Manually disconnected; the session must be rebound before reuse.
    Disconnected,
    /// Logged out; requires `reset` before connecting again.
    LoggedOut,
    /// The last connection attempt failed.
    Error,
}

impl SessionState {
    /// All states, in declaration order.
    pub const ALL: [SessionState; 7] = [
        SessionState::Ready,
        SessionState::Connecting,
        SessionState::Connected,
        SessionState::Offline,
        SessionState::Disconnected,
        SessionState::LoggedOut,
        SessionState::Error,
    ];

    /// Returns the state's compact encoding, used for atomic storage.
    pub fn as_u8(self) -> u8 {
        match self {
            SessionState::Ready => 0,
            SessionState::Connecting => 1,
            SessionState::Connected => 2,
            SessionState::Offline => 3,
            SessionState::Disconnected => 4,
            SessionState::LoggedOut => 5,
            SessionState::Error => 6,
        }
    }

    /// Decodes a value produced by [`SessionState::as_u8`].
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Returns true if a connection attempt may start from this state.
    pub fn can_connect(self) -> bool {
        matches!(
            self,
            SessionState::Ready
                | SessionState::Disconnected
                | SessionState::Offline
                | SessionState::Error
        )
    }

    /// Returns true if requests issued in this state may wait in the
    /// offline queue without the queuing flag being raised.
    pub fn queues_implicitly(self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Connecting)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Ready => "ready",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Offline => "offline",
            SessionState::Disconnected => "disconnected",
            SessionState::LoggedOut => "logged_out",
            SessionState::Error => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| Error::InvalidState(s.to_string()))
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
