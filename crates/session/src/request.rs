// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Requests, their completions and the recent request history.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use dashmap::DashMap;
use serde_json::{Map, Value};
use tether_core::clock::is_expired;
use tether_core::{RequestEnvelope, Response, Target};
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Keys of the envelope that default headers may never override.
const RESERVED_KEYS: [&str; 9] = [
    "controller",
    "action",
    "index",
    "collection",
    "body",
    "requestId",
    "volatile",
    "jwt",
    "refresh",
];

/// A request, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub request_id: String,
    pub target: Target,
    pub body: Value,
    pub volatile: Map<String, Value>,
    /// Token to send; the session's token is used when absent.
    pub jwt: Option<String>,
    pub refresh: Option<String>,
    /// Extra top-level arguments, default headers included.
    pub args: Map<String, Value>,
    /// Creation time, in milliseconds since the Unix epoch.
    pub created_at_ms: u64,
}

impl QueryRequest {
    /// Creates a request with a fresh correlation id.
    pub fn new(target: Target, body: Value) -> Self {
        QueryRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            target,
            body,
            volatile: Map::new(),
            jwt: None,
            refresh: None,
            args: Map::new(),
            created_at_ms: 0,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Checks the fields a replayed request cannot do without.
    pub fn validate(&self) -> Result<()> {
        if self.target.controller.is_empty() {
            return Err(Error::InvalidLoaderEntry("controller"));
        }
        if self.target.action.is_empty() {
            return Err(Error::InvalidLoaderEntry("action"));
        }
        if self.request_id.is_empty() {
            return Err(Error::InvalidLoaderEntry("requestId"));
        }
        Ok(())
    }

    /// Merges default headers at the top level, never overriding a key the
    /// request already carries.
    pub(crate) fn merge_headers(&mut self, headers: &Map<String, Value>) {
        for (key, value) in headers {
            if RESERVED_KEYS.contains(&key.as_str()) || self.args.contains_key(key) {
                continue;
            }
            self.args.insert(key.clone(), value.clone());
        }
    }

    /// Builds the wire envelope, using `session_jwt` when the request has no
    /// token of its own. The token-check action never carries one.
    pub(crate) fn to_envelope(&self, session_jwt: Option<&str>) -> RequestEnvelope {
        let jwt = if self.target.is("auth", "checkToken") {
            None
        } else {
            self.jwt.clone().or_else(|| session_jwt.map(str::to_string))
        };

        RequestEnvelope {
            target: self.target.clone(),
            body: self.body.clone(),
            request_id: self.request_id.clone(),
            volatile: self.volatile.clone(),
            jwt,
            refresh: self.refresh.clone(),
            extra: self.args.clone(),
        }
    }
}

/// How a request is resolved, exactly once.
pub(crate) enum Completion {
    /// A caller awaiting a [`ResponseFuture`].
    Caller(oneshot::Sender<Result<Response>>),
    /// An internal continuation (token check, subscription handshake, login).
    Internal(Box<dyn FnOnce(Result<Response>) + Send + Sync>),
    /// Nobody is waiting (loader-provided requests).
    None,
}

impl Completion {
    pub(crate) fn internal(f: impl FnOnce(Result<Response>) + Send + Sync + 'static) -> Self {
        Completion::Internal(Box::new(f))
    }

    pub(crate) fn resolve(self, result: Result<Response>) {
        match self {
            Completion::Caller(tx) => {
                let _ = tx.send(result);
            }
            Completion::Internal(f) => f(result),
            Completion::None => {}
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Completion::Caller(_) => "Completion::Caller",
            Completion::Internal(_) => "Completion::Internal",
            Completion::None => "Completion::None",
        })
    }
}

/// Resolves with the outcome of a request.
///
/// Dropping the future does not cancel the request.
#[derive(Debug)]
pub struct ResponseFuture {
    rx: oneshot::Receiver<Result<Response>>,
}

impl ResponseFuture {
    /// Creates a future and the completion that resolves it.
    pub(crate) fn channel() -> (Completion, Self) {
        let (tx, rx) = oneshot::channel();
        (Completion::Caller(tx), ResponseFuture { rx })
    }

    /// Creates a future whose completion runs `hook` on the outcome first.
    pub(crate) fn with_hook<F>(hook: F) -> (Completion, Self)
    where
        F: FnOnce(&Result<Response>) + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let completion = Completion::internal(move |result| {
            hook(&result);
            let _ = tx.send(result);
        });
        (completion, ResponseFuture { rx })
    }

    /// Creates an already-resolved future.
    pub(crate) fn ready(result: Result<Response>) -> Self {
        let (completion, future) = Self::channel();
        completion.resolve(result);
        future
    }
}

impl Future for ResponseFuture {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Recently emitted request ids with their emit time.
///
/// Used to recognize self-originated notifications and to drop loader
/// entries that were already sent.
pub struct RequestHistory {
    entries: DashMap<String, u64>,
    ttl_ms: u64,
}

impl RequestHistory {
    pub fn new(ttl_ms: u64) -> Self {
        RequestHistory { entries: DashMap::new(), ttl_ms }
    }

    /// Records an id and prunes entries older than the TTL.
    pub fn record(&self, request_id: &str, now_ms: u64) {
        let ttl_ms = self.ttl_ms;
        self.entries.retain(|_, emitted| !is_expired(now_ms, *emitted, ttl_ms));
        self.entries.insert(request_id.to_string(), now_ms);
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.entries.contains_key(request_id)
    }

    /// Forgets an id; returns true if it was present.
    pub fn remove(&self, request_id: &str) -> bool {
        self.entries.remove(request_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
