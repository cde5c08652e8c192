// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Lock-free session state cell.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tether_core::SessionState;

/// Session state visible to caller threads and transport callbacks alike.
///
/// Uses atomic fields for lock-free reads.
pub struct SharedSessionState {
    /// Current state, encoded with [`SessionState::as_u8`].
    state: AtomicU8,
    /// Whether requests are queued while not connected.
    queuing: AtomicBool,
}

impl SharedSessionState {
    pub fn new(initial: SessionState) -> Self {
        Self {
            state: AtomicU8::new(initial.as_u8()),
            queuing: AtomicBool::new(false),
        }
    }

    /// Get the current state.
    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(SessionState::Error)
    }

    /// Set the state, returning the previous one.
    pub fn set(&self, state: SessionState) -> SessionState {
        let previous = self.state.swap(state.as_u8(), Ordering::AcqRel);
        SessionState::from_u8(previous).unwrap_or(SessionState::Error)
    }

    pub fn is_connected(&self) -> bool {
        self.get() == SessionState::Connected
    }

    /// Returns true if the queuing flag is raised.
    pub fn is_queuing(&self) -> bool {
        self.queuing.load(Ordering::Acquire)
    }

    pub fn set_queuing(&self, queuing: bool) {
        self.queuing.store(queuing, Ordering::Release);
    }

    /// Returns true if a queuable request issued now would be queued.
    pub fn accepts_queued(&self) -> bool {
        self.is_queuing() || self.get().queues_implicitly()
    }
}

impl Default for SharedSessionState {
    fn default() -> Self {
        Self::new(SessionState::Ready)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
