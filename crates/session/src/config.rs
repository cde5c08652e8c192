// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Session configuration.
//!
//! [`SessionOptions`] configures a whole session and can be loaded from a
//! TOML file; every field has a default so a partial file is valid.
//! [`QueryOptions`] tunes a single call.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// How the session behaves when connectivity is lost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfflineMode {
    /// The `auto_*` flags apply as configured.
    #[default]
    Manual,
    /// Forces queuing, reconnection, replay and resubscription on.
    Auto,
}

/// Session-wide options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Queue queuable requests automatically while offline.
    #[serde(default)]
    pub auto_queue: bool,
    /// Let the transport reconnect after an unexpected disconnect.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    /// Replay the offline queue automatically after a reconnect.
    #[serde(default)]
    pub auto_replay: bool,
    /// Renew active subscriptions automatically after a reconnect.
    #[serde(default = "default_true")]
    pub auto_resubscribe: bool,
    /// Maximum number of queued requests (0 = unbounded).
    #[serde(default = "default_queue_max_size")]
    pub queue_max_size: usize,
    /// Maximum age of a queued request in milliseconds (0 = no limit).
    #[serde(default = "default_queue_ttl_ms")]
    pub queue_ttl_ms: u64,
    /// Delay between two replayed requests in milliseconds.
    #[serde(default = "default_replay_interval_ms")]
    pub replay_interval_ms: u64,
    /// Initial delay before a reconnection attempt in milliseconds.
    #[serde(default = "default_reconnection_delay_ms")]
    pub reconnection_delay_ms: u64,
    /// Cap for the exponential reconnection backoff in seconds.
    #[serde(default = "default_max_reconnect_delay_secs")]
    pub max_reconnect_delay_secs: u64,
    /// Reconnection attempts before giving up (0 = unlimited).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// How long an emitted request id is remembered, in milliseconds.
    #[serde(default = "default_request_history_ttl_ms")]
    pub request_history_ttl_ms: u64,
    /// Headers merged at the top level of every request.
    #[serde(default)]
    pub headers: Map<String, Value>,
    /// Volatile data attached to every request.
    #[serde(default)]
    pub volatile: Map<String, Value>,
    /// Index used by collections created without an explicit one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_index: Option<String>,
    #[serde(default)]
    pub offline_mode: OfflineMode,
}

fn default_true() -> bool {
    true
}

fn default_queue_max_size() -> usize {
    500
}

fn default_queue_ttl_ms() -> u64 {
    120_000
}

fn default_replay_interval_ms() -> u64 {
    10
}

fn default_reconnection_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_delay_secs() -> u64 {
    30
}

fn default_request_history_ttl_ms() -> u64 {
    10_000
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            auto_queue: false,
            auto_reconnect: true,
            auto_replay: false,
            auto_resubscribe: true,
            queue_max_size: default_queue_max_size(),
            queue_ttl_ms: default_queue_ttl_ms(),
            replay_interval_ms: default_replay_interval_ms(),
            reconnection_delay_ms: default_reconnection_delay_ms(),
            max_reconnect_delay_secs: default_max_reconnect_delay_secs(),
            max_reconnect_attempts: 0,
            request_history_ttl_ms: default_request_history_ttl_ms(),
            headers: Map::new(),
            volatile: Map::new(),
            default_index: None,
            offline_mode: OfflineMode::Manual,
        }
    }
}

impl SessionOptions {
    /// Loads options from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;
        let options: SessionOptions = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        Ok(options.normalized())
    }

    /// Applies [`OfflineMode::Auto`], which overrides the four `auto_*` flags.
    pub fn normalized(mut self) -> Self {
        if self.offline_mode == OfflineMode::Auto {
            self.auto_queue = true;
            self.auto_reconnect = true;
            self.auto_replay = true;
            self.auto_resubscribe = true;
        }
        self
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_millis(self.replay_interval_ms)
    }
}

/// Per-call options.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Whether the request may wait in the offline queue.
    pub queuable: bool,
    /// Volatile data for this call; wins over session-wide keys.
    pub volatile: Map<String, Value>,
    /// Refresh directive forwarded to the server.
    pub refresh: Option<String>,
    /// Correlation id; generated when absent.
    pub request_id: Option<String>,
    /// Extra top-level arguments (`from`, `size`, `strategy`, ...).
    pub args: Map<String, Value>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            queuable: true,
            volatile: Map::new(),
            refresh: None,
            request_id: None,
            args: Map::new(),
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the call as non-queuable: it fails with `NotConnected` when
    /// issued while not connected.
    pub fn not_queuable(mut self) -> Self {
        self.queuable = false;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_refresh(mut self, refresh: impl Into<String>) -> Self {
        self.refresh = Some(refresh.into());
        self
    }

    pub fn with_volatile(mut self, key: impl Into<String>, value: Value) -> Self {
        self.volatile.insert(key.into(), value);
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
