// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle events and their listeners.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tether_core::Notification;

use crate::request::QueryRequest;

/// Kind of lifecycle event, used to register listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    Reconnected,
    TokenExpired,
    Error,
    LoginAttempt,
    OfflineQueuePush,
    OfflineQueuePop,
    Subscribed,
    Unsubscribed,
}

/// A lifecycle event.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    Reconnected,
    /// The stored token was rejected and has been cleared.
    TokenExpired,
    /// A connection attempt failed.
    Error { message: String },
    LoginAttempt { success: bool, error: Option<String> },
    /// A request entered the offline queue.
    OfflineQueuePush { request: QueryRequest },
    /// A queued request was sent by a replay.
    OfflineQueuePop { request: QueryRequest },
    /// Another user joined a room this session listens to.
    Subscribed { notification: Notification },
    /// Another user left a room this session listens to.
    Unsubscribed { notification: Notification },
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Connected => EventKind::Connected,
            SessionEvent::Disconnected => EventKind::Disconnected,
            SessionEvent::Reconnected => EventKind::Reconnected,
            SessionEvent::TokenExpired => EventKind::TokenExpired,
            SessionEvent::Error { .. } => EventKind::Error,
            SessionEvent::LoginAttempt { .. } => EventKind::LoginAttempt,
            SessionEvent::OfflineQueuePush { .. } => EventKind::OfflineQueuePush,
            SessionEvent::OfflineQueuePop { .. } => EventKind::OfflineQueuePop,
            SessionEvent::Subscribed { .. } => EventKind::Subscribed,
            SessionEvent::Unsubscribed { .. } => EventKind::Unsubscribed,
        }
    }
}

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Listener lists keyed by event kind.
pub struct EventBus {
    listeners: DashMap<EventKind, Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus { listeners: DashMap::new(), next_id: AtomicU64::new(1) }
    }

    /// Registers a listener; listeners run in registration order.
    pub fn add_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.entry(kind).or_default().push((id, Arc::new(listener)));
        id
    }

    /// Removes one listener; returns true if it was registered.
    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        let Some(mut listeners) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Removes every listener of `kind`, or every listener when `None`.
    pub fn remove_all_listeners(&self, kind: Option<EventKind>) {
        match kind {
            Some(kind) => {
                self.listeners.remove(&kind);
            }
            None => self.listeners.clear(),
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map(|l| l.len()).unwrap_or(0)
    }

    /// Calls every listener registered for the event's kind.
    pub fn trigger(&self, event: &SessionEvent) {
        // Listeners may register or remove listeners: call them unlocked.
        let listeners: Vec<Listener> = match self.listeners.get(&event.kind()) {
            Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return,
        };
        for listener in listeners {
            listener(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
