// Copyright The ParcelMQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Broadcast topic internals and the subscriber receive handle.
//!
//! A topic holds an ordered list of subscriber endpoints behind a
//! read/write lock: publish takes the read side to snapshot the senders and
//! delivers after releasing the guard; subscribe and unsubscribe take the
//! write side. Each endpoint is a bounded channel: the broker keeps the
//! send side in the list, the subscriber holds the receive side inside its
//! [`Subscription`].
//!
//! Endpoint identity is a per-topic monotonic id carried in the
//! subscription handle; unsubscribe matches on it rather than on channel
//! equality.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::message::Message;

struct SubscriberEntry {
    id: u64,
    tx: async_channel::Sender<Message>,
}

/// One topic: its current subscriber endpoints.
pub(crate) struct TopicState {
    next_subscriber_id: AtomicU64,
    subscribers: RwLock<Vec<SubscriberEntry>>,
}

impl TopicState {
    pub(crate) fn new() -> Self {
        Self {
            next_subscriber_id: AtomicU64::new(0),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Creates a fresh bounded endpoint and appends it to the subscriber
    /// list.
    pub(crate) fn subscribe(&self, topic: impl Into<String>, capacity: usize) -> Subscription {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push(SubscriberEntry { id, tx });
        Subscription {
            topic: topic.into(),
            id,
            rx,
        }
    }

    /// Removes and closes the endpoint with the given id. Returns whether
    /// it was present; a missing id is a no-op.
    pub(crate) fn unsubscribe(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.write();
        let Some(pos) = subscribers.iter().position(|entry| entry.id == id) else {
            return false;
        };
        let entry = subscribers.remove(pos);
        drop(subscribers);
        let _ = entry.tx.close();
        true
    }

    /// Delivers a message to every current endpoint, non-blockingly.
    ///
    /// The sender list is snapshotted under the read lock and the sends run
    /// after the guard is released. Full endpoints are skipped; a slow
    /// subscriber loses the message rather than penalizing the fast ones.
    /// Returns how many endpoints accepted the delivery.
    pub(crate) fn fan_out(&self, msg: &Message) -> usize {
        let senders: Vec<_> = {
            let subscribers = self.subscribers.read();
            subscribers.iter().map(|entry| entry.tx.clone()).collect()
        };
        let mut delivered = 0;
        for tx in &senders {
            if tx.try_send(msg.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Closes every endpoint under the exclusive lock. Entries stay in the
    /// list; the broker is shutting down and the registry goes with it.
    pub(crate) fn close_all(&self) {
        let subscribers = self.subscribers.write();
        for entry in subscribers.iter() {
            let _ = entry.tx.close();
        }
    }
}

/// A subscriber's receive handle on one topic endpoint.
///
/// The handle produces messages until the subscriber is removed via
/// unsubscribe or the broker closes; after that (and once buffered
/// deliveries are drained) receives observe end-of-stream.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    id: u64,
    rx: async_channel::Receiver<Message>,
}

impl Subscription {
    /// Topic this subscription was created on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Receives the next delivery, suspending until one arrives. `None`
    /// once the endpoint is closed and drained.
    pub async fn recv(&self) -> Option<Message> {
        self.rx.recv().await.ok()
    }

    /// Non-blocking receive. `None` when no delivery is pending (or the
    /// endpoint is closed and drained).
    pub fn try_recv(&self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}
