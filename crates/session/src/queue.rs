// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory offline queue.
//!
//! Requests issued while not connected wait here, in FIFO order, until a
//! replay sends them. The queue is bounded by size (oldest evicted first)
//! and by age. Entries leaving the queue unsent are handed back to the
//! caller as [`Discarded`] so their completions resolve outside the lock.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tether_core::clock::is_expired;

use crate::error::DiscardReason;
use crate::request::{Completion, QueryRequest};

/// Admission filter: returning false keeps a request out of the queue.
pub trait QueueFilter: Send + Sync {
    fn filter(&self, request: &QueryRequest) -> bool;
}

impl<F> QueueFilter for F
where
    F: Fn(&QueryRequest) -> bool + Send + Sync,
{
    fn filter(&self, request: &QueryRequest) -> bool {
        self(request)
    }
}

/// External source of requests merged into the queue before a replay.
///
/// Every loaded request must carry a controller, an action and a request id.
pub trait OfflineQueueLoader: Send + Sync {
    fn load(&self) -> Vec<QueryRequest>;
}

impl<F> OfflineQueueLoader for F
where
    F: Fn() -> Vec<QueryRequest> + Send + Sync,
{
    fn load(&self) -> Vec<QueryRequest> {
        self()
    }
}

/// A queued request.
#[derive(Debug)]
pub(crate) struct QueueEntry {
    pub request: QueryRequest,
    pub completion: Completion,
    pub enqueued_at_ms: u64,
}

/// An entry that left the queue without being sent.
#[derive(Debug)]
pub(crate) struct Discarded {
    pub entry: QueueEntry,
    pub reason: DiscardReason,
}

/// Result of an enqueue.
#[derive(Debug)]
pub(crate) struct Enqueued {
    pub accepted: bool,
    pub discarded: Vec<Discarded>,
}

/// Bounded FIFO of requests waiting for a connection.
pub struct OfflineQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    /// Maximum entries kept (0 = unbounded).
    max_size: usize,
    /// Maximum entry age in milliseconds (0 = no limit).
    ttl_ms: u64,
    filter: RwLock<Option<Arc<dyn QueueFilter>>>,
    loader: RwLock<Option<Arc<dyn OfflineQueueLoader>>>,
}

impl OfflineQueue {
    pub fn new(max_size: usize, ttl_ms: u64) -> Self {
        OfflineQueue {
            entries: Mutex::new(VecDeque::new()),
            max_size,
            ttl_ms,
            filter: RwLock::new(None),
            loader: RwLock::new(None),
        }
    }

    pub fn set_filter(&self, filter: Option<Arc<dyn QueueFilter>>) {
        *self.filter.write() = filter;
    }

    pub fn set_loader(&self, loader: Option<Arc<dyn OfflineQueueLoader>>) {
        *self.loader.write() = loader;
    }

    pub(crate) fn loader(&self) -> Option<Arc<dyn OfflineQueueLoader>> {
        self.loader.read().clone()
    }

    /// Appends an entry after pruning expired ones and running the filter.
    pub(crate) fn enqueue(&self, entry: QueueEntry, now_ms: u64) -> Enqueued {
        let mut discarded = self.prune_expired(now_ms);

        // The filter is caller code: run it without holding the queue lock.
        let filter = self.filter.read().clone();
        if let Some(filter) = filter {
            if !filter.filter(&entry.request) {
                discarded.push(Discarded { entry, reason: DiscardReason::Filtered });
                return Enqueued { accepted: false, discarded };
            }
        }

        let mut entries = self.entries.lock();
        entries.push_back(entry);
        if self.max_size > 0 {
            while entries.len() > self.max_size {
                if let Some(evicted) = entries.pop_front() {
                    discarded.push(Discarded { entry: evicted, reason: DiscardReason::Evicted });
                }
            }
        }

        Enqueued { accepted: true, discarded }
    }

    /// Appends an entry without filtering, for loader-provided requests.
    pub(crate) fn push_back(&self, entry: QueueEntry) {
        self.entries.lock().push_back(entry);
    }

    /// Puts an entry back at the head, for a replay that could not send it.
    pub(crate) fn push_front(&self, entry: QueueEntry) {
        self.entries.lock().push_front(entry);
    }

    pub(crate) fn pop_front(&self) -> Option<QueueEntry> {
        self.entries.lock().pop_front()
    }

    /// Removes entries older than the TTL.
    pub(crate) fn prune_expired(&self, now_ms: u64) -> Vec<Discarded> {
        if self.ttl_ms == 0 {
            return Vec::new();
        }

        let mut entries = self.entries.lock();
        let mut discarded = Vec::new();
        let mut kept = VecDeque::with_capacity(entries.len());
        for entry in entries.drain(..) {
            if is_expired(now_ms, entry.enqueued_at_ms, self.ttl_ms) {
                discarded.push(Discarded { entry, reason: DiscardReason::Expired });
            } else {
                kept.push_back(entry);
            }
        }
        *entries = kept;
        discarded
    }

    /// Removes every entry.
    pub(crate) fn flush(&self) -> Vec<Discarded> {
        self.entries
            .lock()
            .drain(..)
            .map(|entry| Discarded { entry, reason: DiscardReason::Flushed })
            .collect()
    }

    /// Ids of the queued requests, front to back.
    pub fn request_ids(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.request.request_id.clone()).collect()
    }

    /// Copies of the queued requests, front to back.
    pub fn requests(&self) -> Vec<QueryRequest> {
        self.entries.lock().iter().map(|e| e.request.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
