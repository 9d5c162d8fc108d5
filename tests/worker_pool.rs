// Copyright The ParcelMQ Authors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end exercise of the broker as a host would embed it: a producer
//! feeds JSON block envelopes into a queue, a pool of workers consumes them
//! with timed pulls, interesting entries are re-routed to a second queue,
//! and shutdown unblocks the whole pool.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use parcelmq::{Error, InMemoryBroker, Message};

const BLOCK_QUEUE: &str = "blocks";
const TX_QUEUE: &str = "transactions";
const TARGET_ADDRESS: &str = "0x7af963cf6d228e564e2a0aa0ddbf06210b38615d";

#[derive(Debug, Serialize, Deserialize)]
struct BlockEnvelope {
    block_number: u64,
    block_hash: String,
    transactions: Vec<TransactionInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransactionInfo {
    hash: String,
    to: String,
}

fn block(number: u64, with_target_tx: bool) -> BlockEnvelope {
    let mut transactions = vec![TransactionInfo {
        hash: format!("0xaaa{number}"),
        to: "0x0000000000000000000000000000000000000000".to_owned(),
    }];
    if with_target_tx {
        transactions.push(TransactionInfo {
            hash: format!("0xbbb{number}"),
            to: TARGET_ADDRESS.to_owned(),
        });
    }
    BlockEnvelope {
        block_number: number,
        block_hash: format!("0xhash{number}"),
        transactions,
    }
}

// Twenty blocks flow through the block queue into four competing workers;
// the eight blocks carrying a matching transaction each produce one entry
// on the transaction queue; closing the broker releases every worker.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_pool_consumes_block_stream() {
    let broker = Arc::new(InMemoryBroker::new());

    // Producer side: serialize and push all envelopes up front, the way the
    // listener pushes without back-pressure as headers arrive.
    let total_blocks = 20u64;
    let target_blocks: HashSet<u64> = (0..total_blocks).filter(|n| n % 5 < 2).collect();
    for number in 0..total_blocks {
        let envelope = block(number, target_blocks.contains(&number));
        let body = serde_json::to_vec(&envelope).unwrap();
        broker
            .push(BLOCK_QUEUE, Message::new(format!("blk-{number}"), body, BLOCK_QUEUE))
            .unwrap();
    }

    // Worker pool: pull with a timeout, parse, re-route matching
    // transactions, and exit when the broker shuts down.
    let mut workers = Vec::new();
    for _ in 0..4 {
        let b = Arc::clone(&broker);
        workers.push(tokio::spawn(async move {
            let mut handled = 0u64;
            loop {
                match b.pull_with_timeout(BLOCK_QUEUE, Duration::from_millis(200)).await {
                    Ok(Some(delivered)) => {
                        let envelope: BlockEnvelope =
                            serde_json::from_slice(&delivered.body).unwrap();
                        for tx in &envelope.transactions {
                            if tx.to.eq_ignore_ascii_case(TARGET_ADDRESS) {
                                let body = serde_json::to_vec(tx).unwrap();
                                b.push(TX_QUEUE, Message::new(tx.hash.clone(), body, TX_QUEUE))
                                    .unwrap();
                            }
                        }
                        handled += 1;
                    }
                    Ok(None) => {}
                    Err(Error::PullTimeout { .. }) => {}
                    Err(Error::BrokerClosed) => break,
                    Err(other) => panic!("unexpected worker error: {other:?}"),
                }
            }
            handled
        }));
    }

    // Wait until every matching transaction has been re-routed.
    let expected_txs = target_blocks.len() as u64;
    let mut settled = false;
    for _ in 0..200 {
        if broker
            .queue_stats(TX_QUEUE)
            .map(|stats| stats.enqueued == expected_txs)
            .unwrap_or(false)
            && broker.queue_stats(BLOCK_QUEUE).unwrap().depth == 0
        {
            settled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(settled, "workers did not drain the block queue in time");

    // Shutdown releases every blocked worker promptly.
    broker.close().unwrap();
    let mut handled_total = 0;
    for worker in workers {
        handled_total += tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("worker failed to stop after close")
            .unwrap();
    }
    assert_eq!(handled_total, total_blocks);

    // Final accounting: all blocks consumed, one transaction per matching
    // block admitted, nothing dead-lettered.
    let blocks = broker.queue_stats(BLOCK_QUEUE).unwrap();
    assert_eq!(blocks.enqueued, total_blocks);
    assert_eq!(blocks.dequeued, total_blocks);
    assert_eq!(blocks.depth, 0);

    let txs = broker.queue_stats(TX_QUEUE).unwrap();
    assert_eq!(txs.enqueued, expected_txs);
    assert_eq!(txs.depth, expected_txs as i64);

    assert!(broker.dead_letters(BLOCK_QUEUE).is_empty());
    assert_eq!(broker.snapshot().failed_messages, 0);
    assert_eq!(
        broker.snapshot().processed_messages,
        total_blocks
    );
}
