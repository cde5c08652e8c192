// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime subscriptions (rooms).
//!
//! A room starts pending, keyed by a local id. The subscribe handshake
//! assigns it a server room id and a notification channel, which move it
//! into the active index keyed by `(collection, room_id)`. Several local
//! rooms may share one server room; the server is only told to drop a room
//! once no local room uses it.
//!
//! Calls made on a room during its handshake are deferred and replayed, in
//! order, once the handshake resolves.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tether_core::{Notification, Presence, Response, SessionState, Target};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::QueryOptions;
use crate::error::{Error, Result};
use crate::events::SessionEvent;
use crate::request::{Completion, ResponseFuture};
use crate::session::{upgrade, Shared};

/// Delay before retrying an unsubscription blocked by a handshake.
const UNSUBSCRIBE_RETRY: Duration = Duration::from_millis(100);

/// Subscription options.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomOptions {
    /// Deliver notifications caused by this session's own requests.
    pub subscribe_to_self: bool,
    /// Volatile data sent with the subscribe request.
    pub volatile: Map<String, Value>,
    /// Document scope: `in`, `out`, `all` or `none`.
    pub scope: String,
    /// Document state: `pending`, `done` or `all`.
    pub state: String,
    /// User presence notifications: `in`, `out`, `all` or `none`.
    pub users: String,
}

impl Default for RoomOptions {
    fn default() -> Self {
        RoomOptions {
            subscribe_to_self: true,
            volatile: Map::new(),
            scope: "all".to_string(),
            state: "done".to_string(),
            users: "none".to_string(),
        }
    }
}

impl RoomOptions {
    pub fn subscribe_to_self(mut self, enabled: bool) -> Self {
        self.subscribe_to_self = enabled;
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    pub fn users(mut self, users: impl Into<String>) -> Self {
        self.users = users.into();
        self
    }

    pub fn volatile(mut self, volatile: Map<String, Value>) -> Self {
        self.volatile = volatile;
        self
    }
}

/// Something that happened to a room.
#[derive(Debug)]
pub enum RoomEvent {
    /// The subscribe handshake succeeded.
    Subscribed { room_id: String, channel: String },
    /// A notification arrived on the room's channel.
    Notification(Notification),
    /// The subscribe handshake failed, deferred calls being dropped, or the
    /// server reported an error on the room's channel.
    Failed(Error),
}

/// A call made during a handshake, run once it resolves.
enum DeferredCall {
    Renew { filters: Option<Value>, send_off: bool },
    Unsubscribe,
    Count(Completion),
}

pub(crate) struct RoomEntry {
    index: String,
    collection: String,
    filters: Value,
    options: RoomOptions,
    room_id: Option<String>,
    channel: Option<String>,
    subscribing: bool,
    deferred: VecDeque<DeferredCall>,
    events: mpsc::UnboundedSender<RoomEvent>,
}

impl RoomEntry {
    fn unsubscribe_deferred(&self) -> bool {
        self.deferred.iter().any(|call| matches!(call, DeferredCall::Unsubscribe))
    }
}

type RoomRef = Arc<Mutex<RoomEntry>>;

/// Every room of a session.
///
/// Lock order: a room entry before the active index. Nothing locks a room
/// while holding the index.
pub(crate) struct RoomRegistry {
    rooms: DashMap<String, RoomRef>,
    /// Local ids of rooms without a server room.
    pending: DashSet<String>,
    /// Local ids by `(collection, room_id)`.
    active: RwLock<BTreeMap<(String, String), Vec<String>>>,
    /// Local ids by notification channel.
    channels: DashMap<String, Vec<String>>,
}

impl RoomRegistry {
    pub(crate) fn new() -> Self {
        RoomRegistry {
            rooms: DashMap::new(),
            pending: DashSet::new(),
            active: RwLock::new(BTreeMap::new()),
            channels: DashMap::new(),
        }
    }

    fn get(&self, id: &str) -> Option<RoomRef> {
        self.rooms.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn insert(&self, id: String, entry: RoomEntry) {
        self.pending.insert(id.clone());
        self.rooms.insert(id, Arc::new(Mutex::new(entry)));
    }

    fn remove(&self, id: &str) {
        self.rooms.remove(id);
        self.pending.remove(id);
    }

    fn mark_pending(&self, id: &str) {
        if self.rooms.contains_key(id) {
            self.pending.insert(id.to_string());
        }
    }

    fn activate(&self, id: &str, collection: &str, room_id: &str, channel: &str) {
        self.pending.remove(id);
        self.active
            .write()
            .entry((collection.to_string(), room_id.to_string()))
            .or_default()
            .push(id.to_string());
        self.channels.entry(channel.to_string()).or_default().push(id.to_string());
    }

    /// Drops a room from the active index and channel routes.
    ///
    /// Returns true if no other local room uses the server room.
    fn deactivate(&self, id: &str, collection: &str, room_id: &str, channel: &str) -> bool {
        let key = (collection.to_string(), room_id.to_string());
        let last = {
            let mut active = self.active.write();
            match active.get_mut(&key) {
                Some(ids) => {
                    ids.retain(|local| local != id);
                    let empty = ids.is_empty();
                    if empty {
                        active.remove(&key);
                    }
                    empty
                }
                None => true,
            }
        };

        let drained = match self.channels.get_mut(channel) {
            Some(mut ids) => {
                ids.retain(|local| local != id);
                ids.is_empty()
            }
            None => false,
        };
        if drained {
            self.channels.remove_if(channel, |_, ids| ids.is_empty());
        }
        last
    }

    /// Local ids of active rooms, in `(collection, room_id)` order.
    pub(crate) fn active_ids(&self) -> Vec<String> {
        self.active.read().values().flatten().cloned().collect()
    }

    /// Local ids of every room, active ones first.
    pub(crate) fn ids(&self) -> Vec<String> {
        let mut ids = self.active_ids();
        for entry in self.rooms.iter() {
            if !ids.contains(entry.key()) {
                ids.push(entry.key().clone());
            }
        }
        ids
    }

    pub(crate) fn pending_ids(&self) -> Vec<String> {
        self.pending.iter().map(|id| id.key().clone()).collect()
    }

    fn routes(&self, channel: &str) -> Vec<String> {
        self.channels.get(channel).map(|ids| ids.clone()).unwrap_or_default()
    }

    /// Returns true if a room other than `except` awaits its handshake.
    fn handshake_in_flight(&self, except: Option<&str>) -> bool {
        let rooms: Vec<RoomRef> = self
            .rooms
            .iter()
            .filter(|e| Some(e.key().as_str()) != except)
            .map(|e| Arc::clone(e.value()))
            .collect();
        rooms.iter().any(|room| room.lock().subscribing)
    }

    pub(crate) fn len(&self) -> usize {
        self.rooms.len()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active.read().values().map(Vec::len).sum()
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Handle on a subscription.
///
/// Holds the session weakly; operations fail with `InvalidState` once the
/// session is dropped. Dropping the handle does not unsubscribe.
pub struct Room {
    id: String,
    session: Weak<Shared>,
    events: mpsc::UnboundedReceiver<RoomEvent>,
}

impl Room {
    /// Local id, stable across renewals.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the next room event.
    ///
    /// Returns `None` once the room is unsubscribed.
    pub async fn next_event(&mut self) -> Option<RoomEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<RoomEvent> {
        self.events.try_recv().ok()
    }

    /// Subscribes again, with new filters if given.
    pub fn renew(&self, filters: Option<Value>) -> Result<()> {
        upgrade(&self.session)?.renew_room(&self.id, filters, true);
        Ok(())
    }

    pub fn unsubscribe(&self) -> Result<()> {
        upgrade(&self.session)?.unsubscribe_room(&self.id);
        Ok(())
    }

    /// Asks the server how many clients listen to this room.
    pub fn count(&self) -> Result<ResponseFuture> {
        let shared = upgrade(&self.session)?;
        let (completion, future) = ResponseFuture::channel();
        shared.count_room(&self.id, completion);
        Ok(future)
    }

    /// Server room id, once subscribed.
    pub fn room_id(&self) -> Option<String> {
        self.read(|room| room.room_id.clone()).flatten()
    }

    pub fn channel(&self) -> Option<String> {
        self.read(|room| room.channel.clone()).flatten()
    }

    pub fn filters(&self) -> Option<Value> {
        self.read(|room| room.filters.clone())
    }

    pub fn is_subscribing(&self) -> bool {
        self.read(|room| room.subscribing).unwrap_or(false)
    }

    fn read<T>(&self, f: impl FnOnce(&RoomEntry) -> T) -> Option<T> {
        let shared = self.session.upgrade()?;
        let entry = shared.rooms.get(&self.id)?;
        let room = entry.lock();
        Some(f(&room))
    }
}

impl Shared {
    pub(crate) fn subscribe(
        &self,
        index: &str,
        collection: &str,
        filters: Value,
        options: RoomOptions,
    ) -> Result<Room> {
        if self.state.get() == SessionState::LoggedOut {
            return Err(Error::InvalidState("cannot subscribe while logged out".to_string()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.rooms.insert(
            id.clone(),
            RoomEntry {
                index: index.to_string(),
                collection: collection.to_string(),
                filters,
                options,
                room_id: None,
                channel: None,
                subscribing: false,
                deferred: VecDeque::new(),
                events: tx,
            },
        );
        self.renew_room(&id, None, true);

        Ok(Room { id, session: self.me.clone(), events: rx })
    }

    /// Starts a subscribe handshake for a room.
    ///
    /// An active room is detached first; `send_off` controls whether the
    /// server is told to drop the old room.
    pub(crate) fn renew_room(&self, id: &str, filters: Option<Value>, send_off: bool) {
        let Some(entry) = self.rooms.get(id) else {
            return;
        };
        let mut room = entry.lock();
        if room.subscribing {
            debug!(room = %id, "deferring renew until handshake completes");
            room.deferred.push_back(DeferredCall::Renew { filters, send_off });
            return;
        }
        if let Some(filters) = filters {
            room.filters = filters;
        }
        if !self.state.is_connected() {
            drop(room);
            debug!(room = %id, "room waits for a connection");
            self.rooms.mark_pending(id);
            return;
        }

        let detached = room.room_id.take().zip(room.channel.take());
        room.subscribing = true;
        let collection = room.collection.clone();
        let target = Target::new("subscribe", "on")
            .with_index(room.index.clone())
            .with_collection(collection.clone());
        let body = json!({
            "body": room.filters,
            "scope": room.options.scope,
            "state": room.options.state,
            "users": room.options.users,
        });
        let mut options = QueryOptions::new().not_queuable();
        options.volatile = room.options.volatile.clone();
        drop(room);

        if let Some((room_id, channel)) = detached {
            self.detach_room(id, &collection, &room_id, &channel, send_off);
        }

        let me = self.me.clone();
        let key = id.to_string();
        let completion = Completion::internal(move |result| {
            if let Some(shared) = me.upgrade() {
                shared.complete_handshake(&key, result);
            }
        });
        self.dispatch(target, body, options, completion);
    }

    fn complete_handshake(&self, id: &str, result: Result<Response>) {
        let Some(entry) = self.rooms.get(id) else {
            return;
        };
        let mut room = entry.lock();
        room.subscribing = false;

        let response = match result {
            Ok(response) => response,
            Err(_) if room.unsubscribe_deferred() => {
                let deferred: Vec<DeferredCall> = room.deferred.drain(..).collect();
                drop(room);
                self.drop_unsubscribed(id, deferred);
                return;
            }
            Err(Error::Abandoned | Error::NotConnected) => {
                drop(room);
                debug!(room = %id, "handshake interrupted, room back to pending");
                self.rooms.mark_pending(id);
                return;
            }
            Err(e) => {
                warn!(room = %id, error = %e, "subscription failed");
                room.deferred.clear();
                let _ = room.events.send(RoomEvent::Failed(e));
                return;
            }
        };

        let result = response.result();
        let ids = result
            .get("roomId")
            .and_then(Value::as_str)
            .zip(result.get("channel").and_then(Value::as_str));
        let Some((room_id, channel)) = ids else {
            room.deferred.clear();
            let error = tether_core::Error::InvalidFrame(
                "subscribe response lacks roomId or channel".to_string(),
            );
            let _ = room.events.send(RoomEvent::Failed(error.into()));
            return;
        };

        // Logging out drops the server rooms along with the connection.
        if self.state.get() == SessionState::LoggedOut {
            let deferred: Vec<DeferredCall> = room.deferred.drain(..).collect();
            drop(room);
            self.drop_unsubscribed(id, deferred);
            return;
        }

        room.room_id = Some(room_id.to_string());
        room.channel = Some(channel.to_string());
        self.rooms.activate(id, &room.collection, room_id, channel);
        let _ = room.events.send(RoomEvent::Subscribed {
            room_id: room_id.to_string(),
            channel: channel.to_string(),
        });
        info!(room = %id, room_id, channel, "subscribed");

        let deferred: Vec<DeferredCall> = room.deferred.drain(..).collect();
        drop(room);
        for call in deferred {
            match call {
                DeferredCall::Renew { filters, send_off } => self.renew_room(id, filters, send_off),
                DeferredCall::Unsubscribe => self.unsubscribe_room(id),
                DeferredCall::Count(completion) => self.count_room(id, completion),
            }
        }
    }

    /// Forgets a room whose handshake resolved after it was torn down.
    fn drop_unsubscribed(&self, id: &str, deferred: Vec<DeferredCall>) {
        self.rooms.remove(id);
        for call in deferred {
            if let DeferredCall::Count(completion) = call {
                completion.resolve(Err(Error::InvalidState("room is unsubscribed".to_string())));
            }
        }
        debug!(room = %id, "room dropped after handshake");
    }

    pub(crate) fn unsubscribe_room(&self, id: &str) {
        let Some(entry) = self.rooms.get(id) else {
            return;
        };
        let mut room = entry.lock();
        if room.subscribing {
            debug!(room = %id, "deferring unsubscribe until handshake completes");
            room.deferred.push_back(DeferredCall::Unsubscribe);
            return;
        }
        let detached = room.room_id.take().zip(room.channel.take());
        let collection = room.collection.clone();
        drop(room);

        self.rooms.remove(id);
        match detached {
            Some((room_id, channel)) => {
                self.detach_room(id, &collection, &room_id, &channel, true);
                info!(room = %id, room_id = %room_id, "unsubscribed");
            }
            None => debug!(room = %id, "pending room dropped"),
        }
    }

    /// Unsubscribes every active room. Rooms mid-handshake are unsubscribed
    /// once it completes; rooms waiting for a connection are kept.
    pub(crate) fn unsubscribe_all_rooms(&self) {
        for id in self.rooms.ids() {
            let waiting = self.rooms.get(&id).is_some_and(|entry| {
                let room = entry.lock();
                room.room_id.is_none() && !room.subscribing
            });
            if !waiting {
                self.unsubscribe_room(&id);
            }
        }
    }

    /// Drops every room, pending ones included.
    pub(crate) fn destroy_rooms(&self) {
        for id in self.rooms.ids() {
            self.unsubscribe_room(&id);
        }
    }

    /// Renews every active room, then rooms still waiting for a connection.
    pub(crate) fn renew_rooms(&self, send_off: bool) {
        let mut ids = self.rooms.active_ids();
        for id in self.rooms.pending_ids() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        debug!(
            rooms = self.rooms.len(),
            active = self.rooms.active_count(),
            pending = self.rooms.pending_count(),
            "renewing subscriptions"
        );
        for id in ids {
            self.renew_room(&id, None, send_off);
        }
    }

    fn detach_room(&self, id: &str, collection: &str, room_id: &str, channel: &str, send_off: bool) {
        let last = self.rooms.deactivate(id, collection, room_id, channel);
        if last && send_off {
            self.send_unsubscribe(room_id.to_string(), id.to_string());
        }
    }

    /// Tells the server to drop a room once no other room is subscribing.
    ///
    /// The handshake of `origin` itself never blocks: its subscribe request
    /// goes out after this one.
    fn send_unsubscribe(&self, room_id: String, origin: String) {
        if self.rooms.handshake_in_flight(Some(&origin)) {
            debug!(room_id = %room_id, "handshake in flight, retrying unsubscribe later");
            let me = self.me.clone();
            self.runtime.spawn(async move {
                tokio::time::sleep(UNSUBSCRIBE_RETRY).await;
                if let Some(shared) = me.upgrade() {
                    shared.send_unsubscribe(room_id, origin);
                }
            });
            return;
        }

        let completion = Completion::internal(|result| {
            if let Err(e) = result {
                debug!(error = %e, "unsubscribe request failed");
            }
        });
        self.dispatch(
            Target::new("subscribe", "off"),
            json!({ "roomId": room_id }),
            QueryOptions::new(),
            completion,
        );
    }

    pub(crate) fn count_room(&self, id: &str, completion: Completion) {
        let Some(entry) = self.rooms.get(id) else {
            completion.resolve(Err(Error::InvalidState("room is unsubscribed".to_string())));
            return;
        };
        let mut room = entry.lock();
        if room.subscribing {
            room.deferred.push_back(DeferredCall::Count(completion));
            return;
        }
        let Some(room_id) = room.room_id.clone() else {
            drop(room);
            completion.resolve(Err(Error::InvalidState("room is not subscribed yet".to_string())));
            return;
        };
        drop(room);

        self.dispatch(
            Target::new("subscribe", "count"),
            json!({ "roomId": room_id }),
            QueryOptions::new(),
            completion,
        );
    }

    /// Routes a notification to the rooms listening on its channel.
    pub(crate) fn deliver_notification(&self, notification: Notification) {
        if notification.is_token_expiry() {
            self.expire_token();
            return;
        }

        if let Some(error) = &notification.error {
            warn!(channel = %notification.room, error = %error, "error notification");
            for id in self.rooms.routes(&notification.room) {
                if let Some(entry) = self.rooms.get(&id) {
                    let _ = entry.lock().events.send(RoomEvent::Failed(Error::Server(error.clone())));
                }
            }
            return;
        }

        match notification.presence() {
            Some(Presence::Joined) => {
                self.events.trigger(&SessionEvent::Subscribed { notification: notification.clone() })
            }
            Some(Presence::Left) => {
                self.events.trigger(&SessionEvent::Unsubscribed { notification: notification.clone() })
            }
            None => {}
        }

        let own_request = notification
            .request_id
            .as_deref()
            .filter(|request_id| self.history.contains(request_id));

        let routes = self.rooms.routes(&notification.room);
        if routes.is_empty() {
            debug!(channel = %notification.room, "notification for unknown channel");
        }
        for id in routes {
            let Some(entry) = self.rooms.get(&id) else {
                continue;
            };
            let room = entry.lock();
            if own_request.is_some() && !room.options.subscribe_to_self {
                continue;
            }
            let _ = room.events.send(RoomEvent::Notification(notification.clone()));
        }

        if let Some(request_id) = own_request {
            self.history.remove(request_id);
        }
    }
}

#[cfg(test)]
#[path = "room_tests.rs"]
mod tests;
