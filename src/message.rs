// Copyright The ParcelMQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Message definitions for the broker.
//!
//! `Message` is the envelope admitted to queues and topics. The caller owns
//! the id and payload; the broker owns the routing metadata:
//!
//! - `timestamp` is stamped by the broker on every admission, never by the
//!   caller.
//! - `queue` records the last queue the message was routed to and is
//!   rewritten on every push.
//! - `attempts` counts dead-letter admissions and is only ever touched by
//!   the dead-letter engine (incremented on admission, reset on reprocess).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dead-letter reprocessing ceiling stamped on messages built by
/// [`Message::new`].
pub const DEFAULT_MAX_RETRY: u32 = 3;

/// A message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Caller-assigned identifier, intended unique within a queue.
    pub id: String,
    /// Opaque payload.
    pub body: Vec<u8>,
    /// Optional header map.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Admission time, stamped by the broker.
    pub timestamp: DateTime<Utc>,
    /// Number of times the message has been dead-lettered.
    pub attempts: u32,
    /// Reprocessing ceiling advertised to the host.
    pub max_retry: u32,
    /// Last queue the broker routed the message to.
    pub queue: String,
}

impl Message {
    /// Builds a fresh message: zero attempts, default retry ceiling, empty
    /// headers, timestamp now.
    pub fn new(id: impl Into<String>, body: impl Into<Vec<u8>>, queue: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            headers: HashMap::new(),
            timestamp: Utc::now(),
            attempts: 0,
            max_retry: DEFAULT_MAX_RETRY,
            queue: queue.into(),
        }
    }

    /// Adds one header, consuming and returning the message for chaining.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.headers.insert(name.into(), value.into());
        self
    }
}
