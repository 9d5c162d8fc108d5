// Copyright The ParcelMQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Point-to-point queue internals.
//!
//! Each queue owns one bounded MPMC channel and a shared record of atomic
//! counters. The broker keeps the send side; competing consumers drain the
//! receive side through the broker's pull operations. The counter record is
//! additionally registered in the broker-wide metrics mirror, so both views
//! observe the same atomics.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::message::Message;

/// Atomic per-queue counters, shared between the queue and the metrics
/// mirror.
///
/// `depth` and `consumers` are gauges; everything else is monotonic.
#[derive(Debug, Default)]
pub(crate) struct QueueStats {
    pub(crate) depth: AtomicI64,
    pub(crate) consumers: AtomicI64,
    pub(crate) enqueued: AtomicU64,
    pub(crate) dequeued: AtomicU64,
    pub(crate) dead_lettered: AtomicU64,
    pub(crate) purged: AtomicU64,
}

impl QueueStats {
    /// Copies the counters into a value-typed snapshot.
    pub(crate) fn snapshot(&self, name: &str) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            name: name.to_owned(),
            depth: self.depth.load(Ordering::Relaxed),
            consumers: self.consumers.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
        }
    }
}

/// Value-typed copy of one queue's counters at a point in time.
///
/// Counters inside the copy do not track later mutation; observers wanting
/// fresh values take another snapshot.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueueStatsSnapshot {
    /// Queue name.
    pub name: String,
    /// Messages currently sitting in the bounded buffer.
    pub depth: i64,
    /// Callers currently suspended in a timed pull on this queue.
    pub consumers: i64,
    /// Cumulative successful admissions.
    pub enqueued: u64,
    /// Cumulative deliveries out of the buffer.
    pub dequeued: u64,
    /// Cumulative dead-letter admissions charged to this queue.
    pub dead_lettered: u64,
    /// Cumulative messages discarded by purge.
    pub purged: u64,
}

/// Outcome of a non-blocking admission attempt.
pub(crate) enum EnqueueResult {
    /// The message was deposited in the buffer.
    Enqueued,
    /// The buffer is full; the message is handed back for diversion.
    Full(Message),
    /// The buffer was closed by broker shutdown.
    Closed,
}

/// One point-to-point queue: a bounded buffer plus its counters.
pub(crate) struct QueueState {
    tx: async_channel::Sender<Message>,
    rx: async_channel::Receiver<Message>,
    pub(crate) stats: Arc<QueueStats>,
}

impl QueueState {
    /// Builds a queue with a pre-allocated bounded buffer.
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Attempts a non-blocking admission, updating depth and the enqueued
    /// total on success.
    pub(crate) fn try_enqueue(&self, msg: Message) -> EnqueueResult {
        match self.tx.try_send(msg) {
            Ok(()) => {
                let _ = self.stats.depth.fetch_add(1, Ordering::Relaxed);
                let _ = self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                EnqueueResult::Enqueued
            }
            Err(async_channel::TrySendError::Full(msg)) => EnqueueResult::Full(msg),
            Err(async_channel::TrySendError::Closed(_)) => EnqueueResult::Closed,
        }
    }

    /// Non-blocking receive. `None` when the buffer is empty or closed.
    pub(crate) fn try_dequeue(&self) -> Option<Message> {
        let msg = self.rx.try_recv().ok()?;
        self.record_dequeue();
        Some(msg)
    }

    /// Suspends until a message arrives. `None` once the buffer is closed
    /// and drained.
    pub(crate) async fn dequeue(&self) -> Option<Message> {
        let msg = self.rx.recv().await.ok()?;
        self.record_dequeue();
        Some(msg)
    }

    /// Drains the buffer without blocking, counting each discarded message
    /// as purged. Cumulative enqueued/dequeued totals are untouched.
    pub(crate) fn purge(&self) -> u64 {
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            let _ = self.stats.depth.fetch_sub(1, Ordering::Relaxed);
            let _ = self.stats.purged.fetch_add(1, Ordering::Relaxed);
            discarded += 1;
        }
        discarded
    }

    /// Closes the buffer. Buffered messages stay in place (unreachable once
    /// the broker refuses pulls); blocked receivers wake with `None`.
    pub(crate) fn close(&self) {
        let _ = self.tx.close();
    }

    /// Registers a consumer for the duration of a timed pull. The gauge is
    /// restored on drop, including when the pull future is cancelled.
    pub(crate) fn consumer_guard(&self) -> ConsumerGuard {
        let _ = self.stats.consumers.fetch_add(1, Ordering::Relaxed);
        ConsumerGuard {
            stats: Arc::clone(&self.stats),
        }
    }

    fn record_dequeue(&self) {
        let _ = self.stats.depth.fetch_sub(1, Ordering::Relaxed);
        let _ = self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
    }
}

/// Decrements the consumer gauge when a timed pull ends, however it ends.
pub(crate) struct ConsumerGuard {
    stats: Arc<QueueStats>,
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        let _ = self.stats.consumers.fetch_sub(1, Ordering::Relaxed);
    }
}
