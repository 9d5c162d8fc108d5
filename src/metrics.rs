// Copyright The ParcelMQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Broker-wide metrics.
//!
//! Global counters are plain atomics mutated at the admit/deliver sites, so
//! any observer reads them without touching the registry locks. The
//! per-queue map shares each queue's own counter record; the queue and the
//! mirror always agree because they are the same atomics.
//!
//! Totals are incremented right where the admission or delivery happens, so
//! a reader may observe them slightly ahead of the depths they caused.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::queue::{QueueStats, QueueStatsSnapshot};

pub(crate) struct BrokerMetrics {
    total_messages: AtomicU64,
    processed_messages: AtomicU64,
    failed_messages: AtomicU64,
    active_queues: AtomicI64,
    active_subscribers: AtomicI64,
    started_at: DateTime<Utc>,
    started_instant: Instant,
    per_queue: RwLock<HashMap<String, Arc<QueueStats>>>,
}

impl BrokerMetrics {
    pub(crate) fn new() -> Self {
        Self {
            total_messages: AtomicU64::new(0),
            processed_messages: AtomicU64::new(0),
            failed_messages: AtomicU64::new(0),
            active_queues: AtomicI64::new(0),
            active_subscribers: AtomicI64::new(0),
            started_at: Utc::now(),
            started_instant: Instant::now(),
            per_queue: RwLock::new(HashMap::new()),
        }
    }

    /// One message admitted (queue push or topic publish).
    pub(crate) fn record_admission(&self) {
        let _ = self.total_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// One message delivered out of a queue.
    pub(crate) fn record_processed(&self) {
        let _ = self.processed_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// One message admitted to the dead-letter store.
    pub(crate) fn record_failure(&self) {
        let _ = self.failed_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Mirrors a newly created queue's counter record.
    pub(crate) fn register_queue(&self, name: &str, stats: Arc<QueueStats>) {
        let mut per_queue = self.per_queue.write();
        let _ = per_queue.insert(name.to_owned(), stats);
        drop(per_queue);
        let _ = self.active_queues.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn subscriber_added(&self) {
        let _ = self.active_subscribers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn subscriber_removed(&self) {
        let _ = self.active_subscribers.fetch_sub(1, Ordering::Relaxed);
    }

    /// Copies the global counters and every queue's stats into a value-typed
    /// summary. The per-queue map is copied under the shared read lock;
    /// individual counter reads inside the copy are atomic.
    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        let queues = {
            let per_queue = self.per_queue.read();
            per_queue
                .iter()
                .map(|(name, stats)| (name.clone(), stats.snapshot(name)))
                .collect()
        };
        MetricsSnapshot {
            total_messages: self.total_messages.load(Ordering::Relaxed),
            processed_messages: self.processed_messages.load(Ordering::Relaxed),
            failed_messages: self.failed_messages.load(Ordering::Relaxed),
            active_queues: self.active_queues.load(Ordering::Relaxed),
            active_subscribers: self.active_subscribers.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_seconds: self.started_instant.elapsed().as_secs_f64(),
            queues,
        }
    }
}

/// Value-typed copy of the broker's counters at a point in time.
///
/// Does not track later mutation; take another snapshot for fresh values.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Total messages admitted (pushes and publishes).
    pub total_messages: u64,
    /// Messages delivered out of queues.
    pub processed_messages: u64,
    /// Messages admitted to the dead-letter store.
    pub failed_messages: u64,
    /// Queues created since startup.
    pub active_queues: i64,
    /// Currently registered subscriber endpoints.
    pub active_subscribers: i64,
    /// Wall-clock start time of the broker.
    pub started_at: DateTime<Utc>,
    /// Seconds since the broker was created.
    pub uptime_seconds: f64,
    /// Per-queue counter copies, keyed by queue name.
    pub queues: HashMap<String, QueueStatsSnapshot>,
}

impl MetricsSnapshot {
    /// Renders the global counters in Prometheus text exposition format,
    /// one `# HELP`/`# TYPE`/value triple per counter, the body the host
    /// serves from its `/metrics` endpoint.
    #[must_use]
    pub fn prometheus_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# HELP messages_total Total messages admitted");
        let _ = writeln!(out, "# TYPE messages_total counter");
        let _ = writeln!(out, "messages_total {}", self.total_messages);
        let _ = writeln!(
            out,
            "# HELP messages_processed_total Total messages delivered out of queues"
        );
        let _ = writeln!(out, "# TYPE messages_processed_total counter");
        let _ = writeln!(out, "messages_processed_total {}", self.processed_messages);
        let _ = writeln!(
            out,
            "# HELP messages_failed_total Total messages dead-lettered"
        );
        let _ = writeln!(out, "# TYPE messages_failed_total counter");
        let _ = writeln!(out, "messages_failed_total {}", self.failed_messages);
        let _ = writeln!(out, "# HELP active_queues Number of active queues");
        let _ = writeln!(out, "# TYPE active_queues gauge");
        let _ = writeln!(out, "active_queues {}", self.active_queues);
        let _ = writeln!(out, "# HELP uptime_seconds Uptime in seconds");
        let _ = writeln!(out, "# TYPE uptime_seconds counter");
        let _ = writeln!(out, "uptime_seconds {:.2}", self.uptime_seconds);
        out
    }
}
