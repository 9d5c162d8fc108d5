// Copyright The ParcelMQ Authors
// SPDX-License-Identifier: Apache-2.0

//! An embeddable, in-process message broker.
//!
//! Two delivery disciplines live side by side:
//!
//! - **Queue mode** (point-to-point): producers push into named queues with
//!   bounded buffers; competing consumers pull, each message delivered to at
//!   most one of them. Overflowing admissions are diverted to a per-queue
//!   dead-letter sideline instead of back-pressuring the producer.
//! - **Pub/sub mode** (broadcast): publishers fan a message out to every
//!   current subscriber of a topic; slow subscribers with full delivery
//!   buffers are skipped so they never penalize the fast ones.
//!
//! The broker is volatile and process-local: messages live only while it is
//! open, and a restarted broker begins with empty registries. All
//! operations admit arbitrary concurrent callers; the only one that
//! suspends is the timed pull.
//!
//! # Example
//!
//! ```
//! use parcelmq::{InMemoryBroker, Message};
//!
//! let broker = InMemoryBroker::new();
//! broker.push("blocks", Message::new("m1", b"payload".to_vec(), "blocks"))?;
//! let msg = broker.pull("blocks")?.expect("one message pending");
//! assert_eq!(msg.id, "m1");
//! broker.close()?;
//! # Ok::<(), parcelmq::Error>(())
//! ```

mod broker;
mod config;
mod dlq;
mod error;
mod message;
mod metrics;
mod queue;
mod topic;


pub use broker::{Broker, InMemoryBroker};
pub use config::BrokerConfig;
pub use error::Error;
pub use message::{Message, DEFAULT_MAX_RETRY};
pub use metrics::MetricsSnapshot;
pub use queue::QueueStatsSnapshot;
pub use topic::Subscription;
