// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Session: connection state machine and public entry point.
//!
//! A [`Session`] is a cheap handle around shared state. Transports, rooms and
//! collections only hold weak references to that state, so dropping the last
//! `Session` tears everything down.
//!
//! Lifecycle:
//! - `connect()` asks the transport to connect; the outcome arrives through
//!   the [`EventSink`]
//! - on the first connection: token check, replay, pending subscriptions,
//!   `Connected` event
//! - on a lost connection: in-flight requests are abandoned and the session
//!   goes `Offline` (or `Disconnected` without auto-reconnect)
//! - on reconnection: token check, then replay and resubscription when
//!   enabled, then a single `Reconnected` event

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tether_core::{ClockSource, SessionState, SystemClock, Target, TokenValidity};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::collection::Collection;
use crate::config::{QueryOptions, SessionOptions};
use crate::dispatcher::PendingRequest;
use crate::error::{Error, Result};
use crate::events::{EventBus, EventKind, ListenerId, SessionEvent};
use crate::queue::{OfflineQueue, OfflineQueueLoader, QueueFilter};
use crate::replay::ReplayHandle;
use crate::request::{Completion, QueryRequest, RequestHistory, ResponseFuture};
use crate::room::{Room, RoomOptions, RoomRegistry};
use crate::state::SharedSessionState;
use crate::transport::{EventSink, Transport, TransportEvent, WebSocketConfig, WebSocketTransport};

/// State shared by a session and everything that acts on its behalf.
pub(crate) struct Shared {
    pub(crate) me: Weak<Shared>,
    pub(crate) options: SessionOptions,
    pub(crate) state: SharedSessionState,
    pub(crate) transport: RwLock<Option<Arc<dyn Transport>>>,
    pub(crate) jwt: RwLock<Option<String>>,
    pub(crate) headers: RwLock<Map<String, Value>>,
    pub(crate) volatile: RwLock<Map<String, Value>>,
    pub(crate) default_index: RwLock<Option<String>>,
    /// Completions of emitted requests, by request id.
    pub(crate) pending: DashMap<String, PendingRequest>,
    pub(crate) history: RequestHistory,
    pub(crate) queue: OfflineQueue,
    pub(crate) rooms: RoomRegistry,
    pub(crate) events: EventBus,
    pub(crate) clock: Arc<dyn ClockSource>,
    /// Runtime timers are spawned on.
    pub(crate) runtime: Handle,
    pub(crate) replaying: AtomicBool,
    connect_waiter: Mutex<Option<oneshot::Sender<Result<()>>>>,
}

/// Upgrades a weak session reference held by a room or collection.
pub(crate) fn upgrade(session: &Weak<Shared>) -> Result<Arc<Shared>> {
    session.upgrade().ok_or_else(|| Error::InvalidState("session dropped".to_string()))
}

impl Shared {
    pub(crate) fn jwt(&self) -> Option<String> {
        self.jwt.read().clone()
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().clone()
    }

    /// True once the session let go of its transport on purpose.
    fn is_released(&self) -> bool {
        matches!(self.state.get(), SessionState::Disconnected | SessionState::LoggedOut)
    }

    pub(crate) fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Response(response) => self.on_response(response),
            TransportEvent::Notification(notification) => self.deliver_notification(notification),
            lifecycle if self.is_released() => {
                debug!(event = ?lifecycle, state = %self.state.get(), "ignoring transport event");
            }
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::ConnectError(message) => self.on_connect_error(message),
            TransportEvent::Disconnected => self.on_disconnected(),
            TransportEvent::Reconnected => self.on_reconnected(),
        }
    }

    fn on_connected(&self) {
        let previous = self.state.set(SessionState::Connected);
        info!(from = %previous, "session connected");
        self.validate_token_then(Shared::finish_connect);
    }

    /// Post-connection steps of the first connection.
    fn finish_connect(&self) {
        // Whatever was queued before the first connection goes out now.
        if let Err(e) = self.replay() {
            self.report_error(&e);
        }
        self.renew_rooms(false);
        self.events.trigger(&SessionEvent::Connected);
        if let Some(waiter) = self.connect_waiter.lock().take() {
            let _ = waiter.send(Ok(()));
        }
    }

    fn on_connect_error(&self, message: String) {
        let previous = self.state.set(SessionState::Error);
        error!(from = %previous, error = %message, "connection failed");
        self.events.trigger(&SessionEvent::Error { message: message.clone() });
        if let Some(waiter) = self.connect_waiter.lock().take() {
            let _ = waiter.send(Err(Error::Connect(message)));
        }
    }

    fn on_disconnected(&self) {
        self.abandon_pending();
        if self.options.auto_reconnect {
            let previous = self.state.set(SessionState::Offline);
            if self.options.auto_queue {
                self.state.set_queuing(true);
            }
            warn!(from = %previous, queuing = self.state.is_queuing(), "connection lost");
        } else {
            warn!("connection lost, auto-reconnect disabled");
            self.disconnect();
        }
        self.events.trigger(&SessionEvent::Disconnected);
    }

    fn on_reconnected(&self) {
        let previous = self.state.set(SessionState::Connected);
        info!(from = %previous, "session reconnected");

        // The first connection was lost before its token check answered.
        if self.connect_waiter.lock().is_some() {
            self.validate_token_then(Shared::finish_connect);
        } else {
            self.validate_token_then(Shared::finish_reconnect);
        }
    }

    fn finish_reconnect(&self) {
        if self.options.auto_replay {
            if let Err(e) = self.replay() {
                self.report_error(&e);
            }
        }
        if self.options.auto_resubscribe {
            self.renew_rooms(false);
        }
        self.events.trigger(&SessionEvent::Reconnected);
    }

    /// Checks the stored token, if any, then runs `next`.
    ///
    /// A rejected token, or a failed check, invalidates the token first. A
    /// check cut short by a lost connection changes nothing and skips `next`:
    /// the following reconnection starts over.
    fn validate_token_then<F>(&self, next: F)
    where
        F: FnOnce(&Shared) + Send + Sync + 'static,
    {
        let Some(token) = self.jwt() else {
            next(self);
            return;
        };

        let me = self.me.clone();
        let completion = Completion::internal(move |result| {
            let Some(shared) = me.upgrade() else {
                return;
            };
            let validity = result
                .and_then(|response| Ok(TokenValidity::from_result(response.result())?));
            match validity {
                Ok(validity) if validity.valid => {}
                Ok(validity) => {
                    warn!(reason = ?validity.state, "stored token rejected");
                    shared.invalidate_token();
                }
                Err(Error::Abandoned | Error::NotConnected | Error::Disconnected) => {
                    debug!("token check interrupted by a lost connection");
                    return;
                }
                Err(Error::TokenExpired) => {
                    // The response already cleared the token.
                    shared.unsubscribe_all_rooms();
                }
                Err(e) => {
                    warn!(error = %e, "token check failed");
                    shared.invalidate_token();
                }
            }
            next(&shared);
        });

        self.dispatch(
            Target::new("auth", "checkToken"),
            json!({ "token": token }),
            QueryOptions::new().not_queuable(),
            completion,
        );
    }

    /// Clears the token after the server reported it expired.
    pub(crate) fn expire_token(&self) {
        *self.jwt.write() = None;
        warn!("authentication token expired");
        self.events.trigger(&SessionEvent::TokenExpired);
    }

    /// Clears a rejected token and tears down every active room.
    fn invalidate_token(&self) {
        self.expire_token();
        self.unsubscribe_all_rooms();
    }

    pub(crate) fn set_jwt(&self, token: String) {
        *self.jwt.write() = Some(token);
        self.renew_rooms(true);
        self.events.trigger(&SessionEvent::LoginAttempt { success: true, error: None });
    }

    pub(crate) fn unset_jwt(&self) {
        *self.jwt.write() = None;
        self.unsubscribe_all_rooms();
    }

    fn on_login_result(&self, result: &Result<tether_core::Response>) {
        match result {
            Ok(response) => match response.result().get("jwt").and_then(Value::as_str) {
                Some(token) => self.set_jwt(token.to_string()),
                None => self.events.trigger(&SessionEvent::LoginAttempt {
                    success: false,
                    error: Some("login response carries no token".to_string()),
                }),
            },
            Err(e) => self.events.trigger(&SessionEvent::LoginAttempt {
                success: false,
                error: Some(e.to_string()),
            }),
        }
    }

    /// Resolves every in-flight request with `Abandoned`.
    fn abandon_pending(&self) {
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        if !ids.is_empty() {
            warn!(count = ids.len(), "abandoning in-flight requests");
        }
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                pending.completion.resolve(Err(Error::Abandoned));
            }
        }
    }

    fn release_transport(&self) {
        let transport = self.transport.write().take();
        if let Some(transport) = transport {
            transport.disconnect();
        }
    }

    pub(crate) fn disconnect(&self) {
        self.release_transport();
        let previous = self.state.set(SessionState::Disconnected);
        self.state.set_queuing(false);
        self.connect_waiter.lock().take();
        self.abandon_pending();
        info!(from = %previous, "session disconnected");
    }

    pub(crate) fn report_error(&self, e: &Error) {
        error!(error = %e, "session error");
        self.events.trigger(&SessionEvent::Error { message: e.to_string() });
    }
}

/// Resolves once the first connection attempt succeeds or fails.
#[derive(Debug)]
pub struct ConnectHandle {
    rx: Option<oneshot::Receiver<Result<()>>>,
}

impl Future for ConnectHandle {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => {
                Poll::Ready(Err(Error::Connect("connection attempt abandoned".to_string())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    options: SessionOptions,
    transport: Option<Arc<dyn Transport>>,
    clock: Arc<dyn ClockSource>,
    filter: Option<Arc<dyn QueueFilter>>,
    loader: Option<Arc<dyn OfflineQueueLoader>>,
}

impl SessionBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses a [`WebSocketTransport`] for `url`, configured from the options.
    pub fn websocket(self, url: impl Into<String>) -> Self {
        let config = WebSocketConfig::from_options(url, &self.options);
        self.transport(Arc::new(WebSocketTransport::new(config)))
    }

    pub fn clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn queue_filter(mut self, filter: impl QueueFilter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn queue_loader(mut self, loader: impl OfflineQueueLoader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Builds the session. Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Session> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let options = self.options;

        let shared = Arc::new_cyclic(|me| Shared {
            me: me.clone(),
            state: SharedSessionState::new(SessionState::Ready),
            transport: RwLock::new(self.transport),
            jwt: RwLock::new(None),
            headers: RwLock::new(options.headers.clone()),
            volatile: RwLock::new(options.volatile.clone()),
            default_index: RwLock::new(options.default_index.clone()),
            pending: DashMap::new(),
            history: RequestHistory::new(options.request_history_ttl_ms),
            queue: OfflineQueue::new(options.queue_max_size, options.queue_ttl_ms),
            rooms: RoomRegistry::new(),
            events: EventBus::new(),
            clock: self.clock,
            runtime,
            replaying: AtomicBool::new(false),
            connect_waiter: Mutex::new(None),
            options,
        });
        shared.queue.set_filter(self.filter);
        shared.queue.set_loader(self.loader);

        Ok(Session { shared })
    }
}

/// A client session with the realtime backend.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    pub fn builder(options: SessionOptions) -> SessionBuilder {
        SessionBuilder {
            options: options.normalized(),
            transport: None,
            clock: Arc::new(SystemClock),
            filter: None,
            loader: None,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.shared.options
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.get()
    }

    /// Returns false if the session is logged out or has no transport.
    pub fn is_valid_state(&self) -> bool {
        self.shared.state.get() != SessionState::LoggedOut && self.shared.transport().is_some()
    }

    /// Returns true if queuable requests issued now would be queued.
    pub fn is_queuing(&self) -> bool {
        self.shared.state.accepts_queued()
    }

    /// Binds a transport, replacing the previous one.
    pub fn bind_transport(&self, transport: Arc<dyn Transport>) -> Result<()> {
        let state = self.state();
        if matches!(state, SessionState::Connected | SessionState::Connecting) {
            return Err(Error::InvalidState(format!("cannot rebind a transport while {}", state)));
        }
        *self.shared.transport.write() = Some(transport);
        Ok(())
    }

    /// Starts connecting.
    ///
    /// The returned handle resolves once the connection is established and
    /// the post-connection steps ran, or with `Error::Connect`.
    pub fn connect(&self) -> Result<ConnectHandle> {
        let shared = &self.shared;
        let state = shared.state.get();
        if state == SessionState::LoggedOut {
            return Err(Error::InvalidState(
                "logged out\n  hint: call reset() before connecting again".to_string(),
            ));
        }
        let transport = shared
            .transport()
            .ok_or_else(|| Error::InvalidState("no transport bound".to_string()))?;
        if !state.can_connect() {
            return Ok(ConnectHandle { rx: None });
        }

        let (tx, rx) = oneshot::channel();
        *shared.connect_waiter.lock() = Some(tx);
        let previous = shared.state.set(SessionState::Connecting);
        info!(from = %previous, "connecting");

        if let Err(e) = transport.connect(EventSink::new(shared.me.clone())) {
            shared.on_connect_error(e.to_string());
        }
        Ok(ConnectHandle { rx: Some(rx) })
    }

    /// Releases the transport and enters `Disconnected`.
    ///
    /// Rooms are kept, inert, until unsubscribed; a new transport must be
    /// bound before connecting again.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Leaves `LoggedOut`.
    pub fn reset(&self) -> Result<()> {
        let state = self.state();
        if state != SessionState::LoggedOut {
            return Err(Error::InvalidState(format!("cannot reset while {}", state)));
        }
        self.shared.release_transport();
        self.shared.state.set(SessionState::Ready);
        Ok(())
    }

    /// Issues a request.
    ///
    /// Fails synchronously with `Disconnected` or `InvalidState`; every other
    /// outcome resolves the returned future.
    pub fn query(&self, target: Target, body: Value, options: QueryOptions) -> Result<ResponseFuture> {
        self.shared.query(target, body, options)
    }

    /// Asks the server whether `token` is valid.
    pub async fn check_token(&self, token: &str) -> Result<TokenValidity> {
        let future = self.query(
            Target::new("auth", "checkToken"),
            json!({ "token": token }),
            QueryOptions::new().not_queuable(),
        )?;
        let response = future.await?;
        Ok(TokenValidity::from_result(response.result())?)
    }

    /// Logs in; on success the returned token becomes the session token.
    pub fn login(
        &self,
        strategy: &str,
        credentials: Value,
        expires_in: Option<&str>,
    ) -> Result<ResponseFuture> {
        self.shared.check_can_query()?;
        let mut options = QueryOptions::new().not_queuable().with_arg("strategy", json!(strategy));
        if let Some(expires_in) = expires_in {
            options = options.with_arg("expiresIn", json!(expires_in));
        }

        let me = self.shared.me.clone();
        let (completion, future) = ResponseFuture::with_hook(move |result| {
            if let Some(shared) = me.upgrade() {
                shared.on_login_result(result);
            }
        });
        self.shared.dispatch(Target::new("auth", "login"), credentials, options, completion);
        Ok(future)
    }

    /// Logs out: clears the token, destroys every room and enters
    /// `LoggedOut`. The transport is released once the server answers.
    pub fn logout(&self) -> ResponseFuture {
        let shared = &self.shared;
        let future = match shared.check_can_query() {
            Ok(()) => {
                let me = shared.me.clone();
                let (completion, future) = ResponseFuture::with_hook(move |_| {
                    if let Some(shared) = me.upgrade() {
                        shared.release_transport();
                    }
                });
                shared.dispatch(
                    Target::new("auth", "logout"),
                    json!({}),
                    QueryOptions::new().not_queuable(),
                    completion,
                );
                future
            }
            Err(e) => {
                shared.release_transport();
                ResponseFuture::ready(Err(e))
            }
        };

        *shared.jwt.write() = None;
        shared.destroy_rooms();
        let previous = shared.state.set(SessionState::LoggedOut);
        shared.state.set_queuing(false);
        info!(from = %previous, "logged out");
        future
    }

    pub fn jwt(&self) -> Option<String> {
        self.shared.jwt()
    }

    /// Sets the token and renews every subscription under it.
    pub fn set_jwt(&self, token: impl Into<String>) {
        self.shared.set_jwt(token.into());
    }

    /// Clears the token and unsubscribes every active room.
    pub fn unset_jwt(&self) {
        self.shared.unset_jwt();
    }

    /// Merges `content` into the default headers, or replaces them.
    pub fn set_headers(&self, content: Map<String, Value>, replace: bool) {
        let mut headers = self.shared.headers.write();
        if replace {
            *headers = content;
        } else {
            headers.extend(content);
        }
    }

    pub fn headers(&self) -> Map<String, Value> {
        self.shared.headers.read().clone()
    }

    pub fn set_volatile(&self, volatile: Map<String, Value>) {
        *self.shared.volatile.write() = volatile;
    }

    pub fn volatile(&self) -> Map<String, Value> {
        self.shared.volatile.read().clone()
    }

    pub fn default_index(&self) -> Option<String> {
        self.shared.default_index.read().clone()
    }

    pub fn set_default_index(&self, index: impl Into<String>) {
        *self.shared.default_index.write() = Some(index.into());
    }

    /// Raises the queuing flag. Only effective while offline without
    /// auto-queue.
    pub fn start_queuing(&self) {
        if self.state() == SessionState::Offline && !self.shared.options.auto_queue {
            self.shared.state.set_queuing(true);
        }
    }

    /// Lowers the queuing flag. Only effective while offline without
    /// auto-queue.
    pub fn stop_queuing(&self) {
        if self.state() == SessionState::Offline && !self.shared.options.auto_queue {
            self.shared.state.set_queuing(false);
        }
    }

    /// Sends the offline queue, merged with the loader's requests.
    pub fn replay_queue(&self) -> Result<ReplayHandle> {
        self.shared.replay()
    }

    /// Drops every queued request without sending it.
    pub fn flush_queue(&self) {
        let discarded = self.shared.queue.flush();
        self.shared.discard(discarded);
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Copies of the queued requests, front to back.
    pub fn queued_requests(&self) -> Vec<QueryRequest> {
        self.shared.queue.requests()
    }

    pub fn set_queue_filter(&self, filter: Option<Arc<dyn QueueFilter>>) {
        self.shared.queue.set_filter(filter);
    }

    pub fn set_queue_loader(&self, loader: Option<Arc<dyn OfflineQueueLoader>>) {
        self.shared.queue.set_loader(loader);
    }

    pub fn add_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.shared.events.add_listener(kind, listener)
    }

    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.shared.events.remove_listener(kind, id)
    }

    pub fn remove_all_listeners(&self, kind: Option<EventKind>) {
        self.shared.events.remove_all_listeners(kind)
    }

    /// Returns a handle on `collection`, in `index` or the default index.
    pub fn collection(&self, collection: &str, index: Option<&str>) -> Result<Collection> {
        let index = match index {
            Some(index) => index.to_string(),
            None => self.default_index().ok_or_else(|| {
                Error::InvalidState(
                    "no index given\n  hint: pass an index or set a default index".to_string(),
                )
            })?,
        };
        Ok(Collection::new(self.shared.me.clone(), index, collection.to_string()))
    }

    /// Subscribes to changes in `collection` matching `filters`.
    pub fn subscribe(
        &self,
        index: &str,
        collection: &str,
        filters: Value,
        options: RoomOptions,
    ) -> Result<Room> {
        self.shared.subscribe(index, collection, filters, options)
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
