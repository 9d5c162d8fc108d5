// Copyright The ParcelMQ Authors
// SPDX-License-Identifier: Apache-2.0

//! The broker: registries, admission paths, and lifecycle.
//!
//! # Registries
//!
//! Queues, topics, and dead letters live in separate `RwLock<HashMap>`
//! registries. Lazy creation takes the write lock briefly; every other
//! access goes through the read side. Queue and topic records are never
//! destroyed while the broker is open.
//!
//! # Admission
//!
//! `push` never exerts back-pressure on the caller: a full queue buffer
//! diverts the message to the dead-letter store and the push still reports
//! success. Overflow is visible only through metrics and DLQ inspection.
//!
//! # Lifecycle
//!
//! A single `closed` flag gates the admission and delivery paths: push,
//! pull, timed pull, publish, and subscribe. The first `close` wins a
//! compare-and-set, fires the shutdown signal (waking any suspended timed
//! pull), closes the queue buffers, and closes every subscriber endpoint
//! under its topic's exclusive lock. The administrative operations
//! (unsubscribe, dead-letter moves and reprocessing, purge) and the
//! introspection reads stay available afterwards so the host can keep
//! tearing down and render its final state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::BrokerConfig;
use crate::dlq::DeadLetterStore;
use crate::error::Error;
use crate::message::Message;
use crate::metrics::{BrokerMetrics, MetricsSnapshot};
use crate::queue::{EnqueueResult, QueueState, QueueStatsSnapshot};
use crate::topic::{Subscription, TopicState};

/// The broker capability surface.
///
/// Defined as a trait so an alternative backend (persistent, replicated)
/// can substitute transparently; [`InMemoryBroker`] is the process-local
/// implementation. Only the timed pull suspends; every other operation
/// completes without blocking on user-visible state.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Admits a message to a queue, creating the queue on first use.
    /// Overflow diverts to the dead-letter store and still succeeds.
    fn push(&self, queue: &str, msg: Message) -> Result<(), Error>;

    /// Non-blocking pull. `Ok(None)` when the queue is empty; queues are
    /// never created on the pull side.
    fn pull(&self, queue: &str) -> Result<Option<Message>, Error>;

    /// Pull with a deadline. A zero timeout behaves as [`Broker::pull`];
    /// a positive timeout suspends until a message arrives, the deadline
    /// passes, or the broker closes, whichever comes first.
    async fn pull_with_timeout(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Message>, Error>;

    /// Broadcasts a message to every current subscriber of the topic.
    /// Full endpoints are skipped; a missing topic is a counted no-op.
    fn publish(&self, topic: &str, msg: Message) -> Result<(), Error>;

    /// Registers a fresh subscriber endpoint on the topic, creating the
    /// topic on first use.
    fn subscribe(&self, topic: &str) -> Result<Subscription, Error>;

    /// Removes and closes the subscription's endpoint. An endpoint unknown
    /// under an existing topic is a no-op.
    fn unsubscribe(&self, topic: &str, subscription: &Subscription) -> Result<(), Error>;

    /// Administratively diverts a message to the queue's dead letters.
    fn move_to_dlq(&self, queue: &str, msg: Message) -> Result<(), Error>;

    /// Snapshot of the queue's dead letters; empty if none were ever
    /// recorded.
    fn dead_letters(&self, queue: &str) -> Vec<Message>;

    /// Removes the identified dead letter, resets its attempts, and
    /// re-admits it to the originating queue via [`Broker::push`].
    fn reprocess_dead_letter(&self, queue: &str, id: &str) -> Result<(), Error>;

    /// Discards everything currently buffered in the queue.
    fn purge(&self, queue: &str) -> Result<(), Error>;

    /// Value-typed copy of the queue's counters.
    fn queue_stats(&self, queue: &str) -> Result<QueueStatsSnapshot, Error>;

    /// Names of every queue created so far, in no particular order.
    fn all_queues(&self) -> Vec<String>;

    /// Value-typed summary of the global counters and per-queue stats.
    fn snapshot(&self) -> MetricsSnapshot;

    /// Whether the broker is still open.
    fn is_healthy(&self) -> bool;

    /// Closes the broker: refuses further admissions and deliveries, wakes
    /// suspended pulls, and closes every subscriber endpoint exactly once.
    fn close(&self) -> Result<(), Error>;
}

/// Process-local, volatile broker. All state lives in memory and is lost
/// on shutdown; restarts begin with empty registries.
///
/// Instantiable multiple times in one process; instances share nothing.
pub struct InMemoryBroker {
    config: BrokerConfig,
    queues: RwLock<HashMap<String, Arc<QueueState>>>,
    topics: RwLock<HashMap<String, Arc<TopicState>>>,
    dlq: DeadLetterStore,
    metrics: BrokerMetrics,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl InMemoryBroker {
    /// Builds a broker with the default buffer capacities.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Builds a broker with explicit buffer capacities.
    #[must_use]
    pub fn with_config(config: BrokerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            queues: RwLock::new(HashMap::new()),
            topics: RwLock::new(HashMap::new()),
            dlq: DeadLetterStore::new(),
            metrics: BrokerMetrics::new(),
            closed: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Admits a message to a queue. See [`Broker::push`].
    pub fn push(&self, queue: &str, mut msg: Message) -> Result<(), Error> {
        self.ensure_open()?;
        msg.queue = queue.to_owned();
        msg.timestamp = Utc::now();
        let state = self.queue_or_create(queue);
        match state.try_enqueue(msg) {
            EnqueueResult::Enqueued => {
                self.metrics.record_admission();
                Ok(())
            }
            EnqueueResult::Full(msg) => {
                debug!(queue, id = %msg.id, "queue full, diverting to dead letters");
                self.divert_to_dlq(queue, msg);
                Ok(())
            }
            EnqueueResult::Closed => Err(Error::BrokerClosed),
        }
    }

    /// Non-blocking pull. See [`Broker::pull`].
    pub fn pull(&self, queue: &str) -> Result<Option<Message>, Error> {
        self.ensure_open()?;
        let state = self.queue(queue)?;
        match state.try_dequeue() {
            Some(msg) => {
                self.metrics.record_processed();
                Ok(Some(msg))
            }
            None => Ok(None),
        }
    }

    /// Pull with a deadline. See [`Broker::pull_with_timeout`].
    pub async fn pull_with_timeout(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Message>, Error> {
        if timeout.is_zero() {
            return self.pull(queue);
        }
        self.ensure_open()?;
        let state = self.queue(queue)?;
        let _consumer = state.consumer_guard();
        let mut shutdown = self.shutdown.subscribe();
        let wait = tokio::time::timeout(timeout, async {
            tokio::select! {
                msg = state.dequeue() => msg,
                _ = shutdown.wait_for(|closed| *closed) => None,
            }
        });
        match wait.await {
            Ok(Some(msg)) => {
                self.metrics.record_processed();
                Ok(Some(msg))
            }
            Ok(None) => Err(Error::BrokerClosed),
            Err(_elapsed) => Err(Error::PullTimeout {
                queue: queue.to_owned(),
            }),
        }
    }

    /// Broadcasts to the topic's current subscribers. See
    /// [`Broker::publish`].
    pub fn publish(&self, topic: &str, mut msg: Message) -> Result<(), Error> {
        self.ensure_open()?;
        msg.timestamp = Utc::now();
        self.metrics.record_admission();
        let Some(state) = self.topics.read().get(topic).cloned() else {
            return Ok(());
        };
        let _ = state.fan_out(&msg);
        Ok(())
    }

    /// Registers a subscriber endpoint. See [`Broker::subscribe`].
    pub fn subscribe(&self, topic: &str) -> Result<Subscription, Error> {
        self.ensure_open()?;
        let state = self.topic_or_create(topic);
        let subscription = state.subscribe(topic, self.config.subscriber_capacity);
        // Re-check after registration: a close racing this call must not
        // leave behind an endpoint it never saw.
        if self.closed.load(Ordering::SeqCst) {
            let _ = state.unsubscribe(subscription.id());
            return Err(Error::BrokerClosed);
        }
        self.metrics.subscriber_added();
        Ok(subscription)
    }

    /// Removes a subscriber endpoint. See [`Broker::unsubscribe`].
    pub fn unsubscribe(&self, topic: &str, subscription: &Subscription) -> Result<(), Error> {
        let state =
            self.topics
                .read()
                .get(topic)
                .cloned()
                .ok_or_else(|| Error::UnknownTopic {
                    topic: topic.to_owned(),
                })?;
        // Endpoint ids are per-topic; a handle from another topic is an
        // unknown endpoint here, which is a no-op.
        if subscription.topic() != topic {
            return Ok(());
        }
        if state.unsubscribe(subscription.id()) {
            self.metrics.subscriber_removed();
        }
        Ok(())
    }

    /// Administrative dead-letter admission. See [`Broker::move_to_dlq`].
    pub fn move_to_dlq(&self, queue: &str, msg: Message) -> Result<(), Error> {
        self.divert_to_dlq(queue, msg);
        Ok(())
    }

    /// Dead-letter snapshot. See [`Broker::dead_letters`].
    pub fn dead_letters(&self, queue: &str) -> Vec<Message> {
        self.dlq.snapshot(queue)
    }

    /// Reprocesses one dead letter. See [`Broker::reprocess_dead_letter`].
    pub fn reprocess_dead_letter(&self, queue: &str, id: &str) -> Result<(), Error> {
        let mut msg = self.dlq.take(queue, id)?;
        msg.attempts = 0;
        // Re-admission goes through the ordinary push path; a full queue
        // round-trips the message back into the dead letters with one
        // fresh attempt counted.
        self.push(queue, msg)
    }

    /// Discards everything buffered in the queue. See [`Broker::purge`].
    pub fn purge(&self, queue: &str) -> Result<(), Error> {
        let state = self.queue(queue)?;
        let discarded = state.purge();
        debug!(queue, discarded, "purged queue");
        Ok(())
    }

    /// Copies one queue's counters. See [`Broker::queue_stats`].
    pub fn queue_stats(&self, queue: &str) -> Result<QueueStatsSnapshot, Error> {
        let state = self.queue(queue)?;
        Ok(state.stats.snapshot(queue))
    }

    /// Names of every queue created so far.
    pub fn all_queues(&self) -> Vec<String> {
        self.queues.read().keys().cloned().collect()
    }

    /// Global counter summary. See [`Broker::snapshot`].
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Whether the broker is still open.
    pub fn is_healthy(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Closes the broker. See [`Broker::close`].
    pub fn close(&self) -> Result<(), Error> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyClosed);
        }
        // Wake every suspended timed pull before touching the registries.
        let _ = self.shutdown.send(true);
        for state in self.queues.read().values() {
            state.close();
        }
        for state in self.topics.read().values() {
            state.close_all();
        }
        info!("broker closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::BrokerClosed);
        }
        Ok(())
    }

    fn queue(&self, name: &str) -> Result<Arc<QueueState>, Error> {
        self.queues
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownQueue {
                queue: name.to_owned(),
            })
    }

    fn queue_or_create(&self, name: &str) -> Arc<QueueState> {
        if let Some(state) = self.queues.read().get(name) {
            return Arc::clone(state);
        }
        let mut queues = self.queues.write();
        Arc::clone(queues.entry(name.to_owned()).or_insert_with(|| {
            debug!(queue = name, capacity = self.config.queue_capacity, "created queue");
            let state = Arc::new(QueueState::new(self.config.queue_capacity));
            self.metrics.register_queue(name, Arc::clone(&state.stats));
            state
        }))
    }

    fn topic_or_create(&self, name: &str) -> Arc<TopicState> {
        if let Some(state) = self.topics.read().get(name) {
            return Arc::clone(state);
        }
        let mut topics = self.topics.write();
        Arc::clone(topics.entry(name.to_owned()).or_insert_with(|| {
            debug!(topic = name, "created topic");
            Arc::new(TopicState::new())
        }))
    }

    /// Shared diversion path for push overflow and administrative moves.
    /// Admission to the store cannot fail.
    fn divert_to_dlq(&self, queue: &str, mut msg: Message) {
        msg.attempts += 1;
        if let Some(state) = self.queues.read().get(queue) {
            let _ = state
                .stats
                .dead_lettered
                .fetch_add(1, Ordering::Relaxed);
        }
        self.dlq.append(queue, msg);
        self.metrics.record_failure();
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    fn push(&self, queue: &str, msg: Message) -> Result<(), Error> {
        Self::push(self, queue, msg)
    }

    fn pull(&self, queue: &str) -> Result<Option<Message>, Error> {
        Self::pull(self, queue)
    }

    async fn pull_with_timeout(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Message>, Error> {
        Self::pull_with_timeout(self, queue, timeout).await
    }

    fn publish(&self, topic: &str, msg: Message) -> Result<(), Error> {
        Self::publish(self, topic, msg)
    }

    fn subscribe(&self, topic: &str) -> Result<Subscription, Error> {
        Self::subscribe(self, topic)
    }

    fn unsubscribe(&self, topic: &str, subscription: &Subscription) -> Result<(), Error> {
        Self::unsubscribe(self, topic, subscription)
    }

    fn move_to_dlq(&self, queue: &str, msg: Message) -> Result<(), Error> {
        Self::move_to_dlq(self, queue, msg)
    }

    fn dead_letters(&self, queue: &str) -> Vec<Message> {
        Self::dead_letters(self, queue)
    }

    fn reprocess_dead_letter(&self, queue: &str, id: &str) -> Result<(), Error> {
        Self::reprocess_dead_letter(self, queue, id)
    }

    fn purge(&self, queue: &str) -> Result<(), Error> {
        Self::purge(self, queue)
    }

    fn queue_stats(&self, queue: &str) -> Result<QueueStatsSnapshot, Error> {
        Self::queue_stats(self, queue)
    }

    fn all_queues(&self) -> Vec<String> {
        Self::all_queues(self)
    }

    fn snapshot(&self) -> MetricsSnapshot {
        Self::snapshot(self)
    }

    fn is_healthy(&self) -> bool {
        Self::is_healthy(self)
    }

    fn close(&self) -> Result<(), Error> {
        Self::close(self)
    }
}
