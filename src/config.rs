// Copyright The ParcelMQ Authors
// SPDX-License-Identifier: Apache-2.0

//! Broker configuration.

use serde::{Deserialize, Serialize};

/// Buffer sizing for a broker instance.
///
/// Values are fixed at construction time; queues and subscriber endpoints
/// created later all use them. Zero capacities are clamped to 1 at the
/// creation site. The dead-letter store is unbounded: hosts that cannot
/// tolerate unbounded growth must drain it through reprocessing or
/// inspection; a cap would be a future addition here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// Capacity of each queue's bounded buffer.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Capacity of each subscriber endpoint's delivery buffer.
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_subscriber_capacity() -> usize {
    100
}
