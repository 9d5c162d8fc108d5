// Copyright The ParcelMQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Dead-letter store.
//!
//! Per queue name, an append-only sequence of messages that overflowed
//! their queue or were diverted administratively. Sequences are created
//! lazily on first admission and never removed. An emptied sequence still
//! marks that dead letters once existed for the queue, which is what
//! separates [`Error::MessageNotFound`] from [`Error::NoDeadLetters`].
//!
//! The store is unbounded. Hosts that cannot tolerate unbounded growth
//! must drain it through reprocessing or inspection followed by
//! out-of-band discard.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::Error;
use crate::message::Message;

pub(crate) struct DeadLetterStore {
    entries: RwLock<HashMap<String, Vec<Message>>>,
}

impl DeadLetterStore {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Appends a message to the queue's sequence, creating it on first use.
    /// Admission cannot fail.
    pub(crate) fn append(&self, queue: &str, msg: Message) {
        let mut entries = self.entries.write();
        entries.entry(queue.to_owned()).or_default().push(msg);
    }

    /// Snapshot copy of the queue's sequence; empty if none was ever
    /// created. Safe to read while producers keep appending.
    pub(crate) fn snapshot(&self, queue: &str) -> Vec<Message> {
        let entries = self.entries.read();
        entries.get(queue).cloned().unwrap_or_default()
    }

    /// Removes the first entry whose id matches, under one lock
    /// acquisition so concurrent reprocess calls cannot double-take.
    pub(crate) fn take(&self, queue: &str, id: &str) -> Result<Message, Error> {
        let mut entries = self.entries.write();
        let Some(sequence) = entries.get_mut(queue) else {
            return Err(Error::NoDeadLetters {
                queue: queue.to_owned(),
            });
        };
        let Some(pos) = sequence.iter().position(|msg| msg.id == id) else {
            return Err(Error::MessageNotFound {
                queue: queue.to_owned(),
                id: id.to_owned(),
            });
        };
        Ok(sequence.remove(pos))
    }
}
