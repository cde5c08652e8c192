// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wall clock abstraction.
//!
//! Queue TTLs and the request history are measured in milliseconds since the
//! Unix epoch. Going through [`ClockSource`] lets tests drive time by hand.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Trait for getting the current wall clock time.
///
/// This allows injecting a mock clock for testing.
pub trait ClockSource: Send + Sync {
    /// Returns the current time in milliseconds since Unix epoch.
    fn now_ms(&self) -> u64;
}

/// System clock implementation using `std::time::SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
    }
}

impl<C: ClockSource> ClockSource for &C {
    fn now_ms(&self) -> u64 {
        (*self).now_ms()
    }
}

impl<C: ClockSource + ?Sized> ClockSource for Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Returns true if `then_ms` is more than `ttl_ms` in the past.
///
/// A zero TTL never expires anything.
pub fn is_expired(now_ms: u64, then_ms: u64, ttl_ms: u64) -> bool {
    ttl_ms > 0 && now_ms.saturating_sub(then_ms) > ttl_ms
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
