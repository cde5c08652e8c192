// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol messages for client-server communication.
//!
//! The protocol is simple:
//! - Client sends flat request envelopes, each carrying a `requestId`
//! - Server answers with a response envelope echoing that `requestId`
//! - Server publishes notifications on subscription channels; a notification
//!   frame always carries the channel in its `room` field
//!
//! Inbound frames are decoded once, at the transport boundary, into
//! [`InboundMessage`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Error message the server uses when the session token has expired.
pub const TOKEN_EXPIRED_MESSAGE: &str = "Token expired";

/// Notification action published when a session token expires mid-subscription.
pub const TOKEN_EXPIRED_ACTION: &str = "jwtTokenExpired";

/// Notification type published when a session token expires mid-subscription.
pub const TOKEN_EXPIRED_TYPE: &str = "TokenExpired";

/// The API route a request is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub controller: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl Target {
    /// Creates a target with no index or collection.
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Target {
            controller: controller.into(),
            action: action.into(),
            index: None,
            collection: None,
        }
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Returns true if this target is `controller/action`.
    pub fn is(&self, controller: &str, action: &str) -> bool {
        self.controller == controller && self.action == action
    }
}

/// A request as it travels on the wire.
///
/// Default headers and extra arguments (`from`, `size`, ...) are merged at the
/// top level through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    #[serde(flatten)]
    pub target: Target,
    #[serde(default)]
    pub body: Value,
    pub request_id: String,
    #[serde(default)]
    pub volatile: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RequestEnvelope {
    /// Serializes the envelope to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes an envelope from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Error payload of a response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ServerError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Any other field the server attached (stack, error id, ...).
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ServerError {
    pub fn new(message: impl Into<String>) -> Self {
        ServerError {
            message: message.into(),
            status: None,
            details: Map::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Returns true if the server rejected the request because the token expired.
    pub fn is_token_expired(&self) -> bool {
        self.message == TOKEN_EXPIRED_MESSAGE
    }
}

fn default_status() -> u16 {
    200
}

/// A response to a request, correlated by `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub request_id: String,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServerError>,
}

impl Response {
    /// Creates a successful response.
    pub fn success(request_id: impl Into<String>, result: Value) -> Self {
        Response {
            request_id: request_id.into(),
            status: 200,
            controller: None,
            action: None,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    pub fn failure(request_id: impl Into<String>, error: ServerError) -> Self {
        Response {
            request_id: request_id.into(),
            status: error.status.unwrap_or(500),
            controller: None,
            action: None,
            result: None,
            error: Some(error),
        }
    }

    /// Returns the `result` field, or `Null` when absent.
    pub fn result(&self) -> &Value {
        self.result.as_ref().unwrap_or(&Value::Null)
    }
}

/// User presence change carried by a subscription notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Another client subscribed to the room.
    Joined,
    /// Another client left the room.
    Left,
}

/// A realtime notification published on a subscription channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Channel the notification was published on.
    pub room: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default)]
    pub controller: String,
    #[serde(default)]
    pub action: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub volatile: Map<String, Value>,
    #[serde(default)]
    pub result: Value,
    /// Set when the server reports a failure on the channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServerError>,
}

impl Notification {
    /// Creates a document notification on the given channel.
    pub fn new(room: impl Into<String>, controller: impl Into<String>, action: impl Into<String>) -> Self {
        Notification {
            room: room.into(),
            request_id: None,
            status: 200,
            index: None,
            collection: None,
            controller: controller.into(),
            action: action.into(),
            kind: None,
            state: None,
            scope: None,
            user: None,
            volatile: Map::new(),
            result: Value::Null,
            error: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Returns true if this notification signals an expired session token.
    pub fn is_token_expiry(&self) -> bool {
        self.action == TOKEN_EXPIRED_ACTION || self.kind.as_deref() == Some(TOKEN_EXPIRED_TYPE)
    }

    /// Returns the presence change this notification describes, if any.
    pub fn presence(&self) -> Option<Presence> {
        if self.controller != "subscribe" {
            return None;
        }
        match self.action.as_str() {
            "on" => Some(Presence::Joined),
            "off" => Some(Presence::Left),
            _ => None,
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Answer to a request.
    Response(Response),
    /// Realtime notification for a subscription channel.
    Notification(Notification),
}

impl InboundMessage {
    /// Decodes a JSON text frame.
    ///
    /// Frames carrying a `room` field are notifications; frames carrying a
    /// `requestId` otherwise are responses. Anything else is rejected.
    pub fn from_json(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)?;
        let Some(object) = value.as_object() else {
            return Err(Error::InvalidFrame("expected a JSON object".to_string()));
        };

        if object.contains_key("room") {
            Ok(InboundMessage::Notification(serde_json::from_value(value)?))
        } else if object.contains_key("requestId") {
            Ok(InboundMessage::Response(serde_json::from_value(value)?))
        } else {
            Err(Error::InvalidFrame("missing both 'room' and 'requestId'".to_string()))
        }
    }

    /// Serializes the message back to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        match self {
            InboundMessage::Response(r) => serde_json::to_string(r),
            InboundMessage::Notification(n) => serde_json::to_string(n),
        }
    }
}

/// Result of an `auth/checkToken` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenValidity {
    pub valid: bool,
    /// Why the token is invalid, when it is.
    pub state: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenValidity {
    /// Reads a `checkToken` result object.
    pub fn from_result(result: &Value) -> Result<Self> {
        let valid = result
            .get("valid")
            .and_then(Value::as_bool)
            .ok_or_else(|| Error::InvalidFrame("checkToken result lacks 'valid'".to_string()))?;
        let state = result.get("state").and_then(Value::as_str).map(str::to_string);
        let expires_at = result
            .get("expiresAt")
            .and_then(Value::as_i64)
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        Ok(TokenValidity { valid, state, expires_at })
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
