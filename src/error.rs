// Copyright The ParcelMQ Authors
// SPDX-License-Identifier: Apache-2.0

/// Errors produced by broker operations.
///
/// These are operational outcomes returned to the caller; the broker never
/// panics on them. Buffer overflow on `push` is deliberately absent: an
/// overflowing admission is diverted to the dead-letter store and reported
/// as success.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The broker has been closed; the operation was refused.
    #[error("broker is closed")]
    BrokerClosed,
    /// `close` was called on a broker that is already closed.
    #[error("broker is already closed")]
    AlreadyClosed,
    /// The queue was never created. Pull-side operations do not create
    /// queues, so this distinguishes "no queue" from "empty queue".
    #[error("queue `{queue}` does not exist")]
    UnknownQueue {
        /// Name of the missing queue.
        queue: String,
    },
    /// The topic was never created.
    #[error("topic `{topic}` does not exist")]
    UnknownTopic {
        /// Name of the missing topic.
        topic: String,
    },
    /// No dead letters were ever recorded for the queue.
    #[error("no dead letters for queue `{queue}`")]
    NoDeadLetters {
        /// Queue whose dead-letter sequence was never created.
        queue: String,
    },
    /// The message id is not present in the queue's dead letters.
    #[error("message `{id}` not found in dead letters for queue `{queue}`")]
    MessageNotFound {
        /// Queue whose dead letters were searched.
        queue: String,
        /// The id that was not found.
        id: String,
    },
    /// A blocking pull reached its deadline without receiving a message.
    #[error("timed out waiting for a message from queue `{queue}`")]
    PullTimeout {
        /// Queue the pull was waiting on.
        queue: String,
    },
}
