// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Request dispatch: send now, queue, or refuse; then correlate responses.

use serde_json::{json, Value};
use tether_core::{Response, SessionState, Target};
use tracing::{debug, warn};

use crate::config::QueryOptions;
use crate::error::{Error, Result};
use crate::events::SessionEvent;
use crate::queue::{Discarded, QueueEntry};
use crate::request::{Completion, QueryRequest, ResponseFuture};
use crate::session::Shared;

/// Version reported in every request's volatile data.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A request waiting for its response.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub target: Target,
    pub completion: Completion,
}

impl Shared {
    /// Fails if no request may be issued in the current state.
    pub(crate) fn check_can_query(&self) -> Result<()> {
        match self.state.get() {
            SessionState::Disconnected => Err(Error::Disconnected),
            SessionState::LoggedOut => Err(Error::InvalidState(
                "logged out\n  hint: call reset() and connect again".to_string(),
            )),
            _ if self.transport.read().is_none() => {
                Err(Error::InvalidState("no transport bound".to_string()))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn query(
        &self,
        target: Target,
        body: Value,
        options: QueryOptions,
    ) -> Result<ResponseFuture> {
        self.check_can_query()?;
        let (completion, future) = ResponseFuture::channel();
        self.dispatch(target, body, options, completion);
        Ok(future)
    }

    /// Issues a request whose outcome, errors included, goes to `completion`.
    pub(crate) fn dispatch(
        &self,
        target: Target,
        body: Value,
        options: QueryOptions,
        completion: Completion,
    ) {
        if let Err(e) = self.check_can_query() {
            completion.resolve(Err(e));
            return;
        }
        let queuable = options.queuable;
        let request = self.build_request(target, body, options);
        self.submit(request, completion, queuable);
    }

    pub(crate) fn build_request(
        &self,
        target: Target,
        body: Value,
        options: QueryOptions,
    ) -> QueryRequest {
        let mut volatile = self.volatile.read().clone();
        volatile.extend(options.volatile);
        volatile.insert("sdkVersion".to_string(), json!(SDK_VERSION));

        let mut request = QueryRequest {
            request_id: options.request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            target,
            body,
            volatile,
            jwt: None,
            refresh: options.refresh,
            args: options.args,
            created_at_ms: self.clock.now_ms(),
        };
        request.merge_headers(&self.headers.read());
        request
    }

    /// Sends the request when connected, otherwise queues or refuses it.
    fn submit(&self, request: QueryRequest, completion: Completion, queuable: bool) {
        let (request, completion) = if self.state.is_connected() {
            match self.send_now(request, completion) {
                Ok(()) => return,
                Err(unsent) => unsent,
            }
        } else {
            (request, completion)
        };

        if queuable && self.state.accepts_queued() {
            self.enqueue(request, completion);
        } else {
            debug!(request_id = %request.request_id, state = %self.state.get(), "refusing request while not connected");
            completion.resolve(Err(Error::NotConnected));
        }
    }

    /// Emits a request through the transport.
    ///
    /// Gives the request back if the transport refused it.
    pub(crate) fn send_now(
        &self,
        request: QueryRequest,
        completion: Completion,
    ) -> std::result::Result<(), (QueryRequest, Completion)> {
        let transport = self.transport.read().clone();
        let Some(transport) = transport else {
            return Err((request, completion));
        };

        let envelope = request.to_envelope(self.jwt().as_deref());
        let id = request.request_id.clone();
        // Registered before emitting: a response may arrive before emit returns.
        self.pending
            .insert(id.clone(), PendingRequest { target: request.target.clone(), completion });
        self.history.record(&id, self.clock.now_ms());

        match transport.emit(&envelope) {
            Ok(()) => {
                debug!(
                    request_id = %id,
                    controller = %request.target.controller,
                    action = %request.target.action,
                    "request sent"
                );
                Ok(())
            }
            Err(e) => {
                warn!(request_id = %id, error = %e, "transport refused request");
                self.history.remove(&id);
                match self.pending.remove(&id) {
                    Some((_, pending)) => Err((request, pending.completion)),
                    None => Ok(()),
                }
            }
        }
    }

    fn enqueue(&self, request: QueryRequest, completion: Completion) {
        let now_ms = self.clock.now_ms();
        let queued = request.clone();
        let outcome = self.queue.enqueue(QueueEntry { request, completion, enqueued_at_ms: now_ms }, now_ms);
        self.discard(outcome.discarded);

        if outcome.accepted {
            debug!(request_id = %queued.request_id, queued = self.queue.len(), "request queued");
            self.events.trigger(&SessionEvent::OfflineQueuePush { request: queued });
        }
    }

    /// Resolves the completions of requests that left the queue unsent.
    pub(crate) fn discard(&self, discarded: Vec<Discarded>) {
        for Discarded { entry, reason } in discarded {
            warn!(request_id = %entry.request.request_id, %reason, "discarding queued request");
            entry.completion.resolve(Err(Error::Discarded(reason)));
        }
    }

    pub(crate) fn on_response(&self, response: Response) {
        let Some((_, pending)) = self.pending.remove(&response.request_id) else {
            debug!(request_id = %response.request_id, "response for unknown request");
            return;
        };

        let result = match &response.error {
            Some(error) if error.is_token_expired() => {
                self.expire_token();
                if pending.target.is("auth", "logout") {
                    Ok(response)
                } else {
                    Err(Error::TokenExpired)
                }
            }
            Some(error) => Err(Error::Server(error.clone())),
            None => Ok(response),
        };
        pending.completion.resolve(result);
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
