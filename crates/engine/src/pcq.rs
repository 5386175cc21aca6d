// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component E: the per-conversation queue. One chainable FIFO per
//! conversation key with a monotonic epoch counter for preemption.
//!
//! Modeled the way the teacher serializes its single-writer save chain: a
//! `tokio::sync::Mutex` per key owns the "current tail" future, and every
//! submission attaches its work after the previous submission's completion.
//! `/ask` must never touch this queue (§4.E's critical contract) — it is
//! handled entirely outside `Pcq`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// One conversation's epoch counter plus its serialization lock. The lock
/// being a `tokio::sync::Mutex` (not `parking_lot`) is what lets a queued
/// item `.await` the previous item's completion without blocking a thread.
struct Lane {
    epoch: AtomicU64,
    chain: AsyncMutex<()>,
}

impl Lane {
    fn new() -> Self {
        Self { epoch: AtomicU64::new(0), chain: AsyncMutex::new(()) }
    }
}

/// A per-conversation chainable queue with epoch-based preemption.
#[derive(Default)]
pub struct Pcq {
    lanes: Mutex<HashMap<String, Arc<Lane>>>,
}

/// Why a submitted item did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skipped {
    /// The conversation's epoch advanced past this item's submission epoch
    /// before it reached the front of the queue (`/inject` preemption).
    Preempted,
}

impl Pcq {
    pub fn new() -> Self {
        Self::default()
    }

    fn lane(&self, conversation_key: &str) -> Arc<Lane> {
        self.lanes.lock().entry(conversation_key.to_string()).or_insert_with(|| Arc::new(Lane::new())).clone()
    }

    /// The current epoch for `conversation_key`; new submissions should
    /// capture this at submission time.
    pub fn current_epoch(&self, conversation_key: &str) -> u64 {
        self.lane(conversation_key).epoch.load(Ordering::SeqCst)
    }

    /// Bumps the epoch, preempting every item already queued with an older
    /// submission epoch. This is the entire implementation of
    /// `preemptConversationQueue()` (§4.E): the queue itself never inspects
    /// item identity, only the epoch number.
    pub fn preempt(&self, conversation_key: &str) -> u64 {
        self.lane(conversation_key).epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Submits `work` to run after every item already chained onto this
    /// conversation's lane, honoring epoch preemption: if the current epoch
    /// no longer matches `submission_epoch` by the time this item reaches
    /// the front of the queue, `work` never runs and [`Skipped::Preempted`]
    /// is returned instead.
    ///
    /// The serialization itself comes from holding the lane's async mutex
    /// across the whole call — the next `submit` on the same conversation
    /// blocks until this one's `work` future resolves, giving FIFO order
    /// without a literal linked list of futures.
    pub async fn submit<F, Fut, T>(&self, conversation_key: &str, submission_epoch: u64, work: F) -> Result<T, Skipped>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lane = self.lane(conversation_key);
        let _guard = lane.chain.lock().await;
        if lane.epoch.load(Ordering::SeqCst) != submission_epoch {
            return Err(Skipped::Preempted);
        }
        Ok(work().await)
    }
}

#[cfg(test)]
#[path = "pcq_tests.rs"]
mod tests;
