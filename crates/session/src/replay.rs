// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline queue replay.
//!
//! A replay prunes expired entries, merges the loader's requests, then sends
//! the queue front to back through the dispatcher, one request per replay
//! interval. Sending stops as soon as the session is not connected; the
//! remaining entries stay queued for the next replay.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::Result;
use crate::events::SessionEvent;
use crate::queue::QueueEntry;
use crate::request::Completion;
use crate::session::Shared;

/// Resolves with the number of requests a replay sent.
///
/// A replay requested while another one runs only merges the loader's
/// requests; its handle resolves at once with 0.
#[derive(Debug)]
pub struct ReplayHandle {
    rx: Option<oneshot::Receiver<usize>>,
}

impl Future for ReplayHandle {
    type Output = usize;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<usize> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(0);
        };
        Pin::new(rx).poll(cx).map(|sent| sent.unwrap_or(0))
    }
}

impl Shared {
    /// Starts a replay.
    ///
    /// Fails with `InvalidLoaderEntry`, before sending anything, if a loaded
    /// request lacks a controller, an action or a request id.
    pub(crate) fn replay(&self) -> Result<ReplayHandle> {
        let now_ms = self.clock.now_ms();
        let expired = self.queue.prune_expired(now_ms);
        self.discard(expired);
        self.merge_loader(now_ms)?;

        if self.replaying.swap(true, Ordering::AcqRel) {
            debug!("replay already running");
            return Ok(ReplayHandle { rx: None });
        }

        let (tx, rx) = oneshot::channel();
        let interval = self.options.replay_interval();

        if interval.is_zero() {
            let mut sent = 0;
            while self.replay_next() {
                sent += 1;
            }
            self.finish_replay(sent);
            let _ = tx.send(sent);
        } else {
            let me = self.me.clone();
            self.runtime.spawn(async move {
                let mut sent = 0;
                while let Some(shared) = me.upgrade() {
                    if !shared.replay_next() {
                        shared.finish_replay(sent);
                        break;
                    }
                    sent += 1;
                    drop(shared);
                    tokio::time::sleep(interval).await;
                }
                let _ = tx.send(sent);
            });
        }

        Ok(ReplayHandle { rx: Some(rx) })
    }

    /// Appends the loader's requests, skipping ids already queued or sent.
    fn merge_loader(&self, now_ms: u64) -> Result<()> {
        let Some(loader) = self.queue.loader() else {
            return Ok(());
        };
        let loaded = loader.load();
        for request in &loaded {
            request.validate()?;
        }

        let mut seen: HashSet<String> = self.queue.request_ids().into_iter().collect();
        let mut merged = 0;
        for request in loaded {
            if self.history.contains(&request.request_id) || !seen.insert(request.request_id.clone())
            {
                debug!(request_id = %request.request_id, "dropping duplicate loader request");
                continue;
            }
            self.queue.push_back(QueueEntry {
                request,
                completion: Completion::None,
                enqueued_at_ms: now_ms,
            });
            merged += 1;
        }
        if merged > 0 {
            debug!(merged, "merged loader requests");
        }
        Ok(())
    }

    /// Sends the head of the queue. Returns false when nothing was sent.
    fn replay_next(&self) -> bool {
        if !self.state.is_connected() {
            return false;
        }
        let Some(entry) = self.queue.pop_front() else {
            return false;
        };

        let enqueued_at_ms = entry.enqueued_at_ms;
        let popped = entry.request.clone();
        match self.send_now(entry.request, entry.completion) {
            Ok(()) => {
                self.events.trigger(&SessionEvent::OfflineQueuePop { request: popped });
                true
            }
            Err((request, completion)) => {
                self.queue.push_front(QueueEntry { request, completion, enqueued_at_ms });
                false
            }
        }
    }

    fn finish_replay(&self, sent: usize) {
        self.replaying.store(false, Ordering::Release);
        let remaining = self.queue.len();
        if remaining == 0 && self.state.is_connected() {
            self.state.set_queuing(false);
        }
        info!(sent, remaining, "offline queue replayed");
    }
}

#[cfg(test)]
#[path = "replay_tests.rs"]
mod tests;
