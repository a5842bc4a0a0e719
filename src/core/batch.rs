//! Deposit batching with recipient-based partitioning
//!
//! Workers pull queued deposits into an in-memory batch and flush it when it
//! reaches `max_batch_size` or when `batch_timeout` has passed since the last
//! flush, whichever comes first.
//!
//! # Flush
//!
//! A flushed batch is partitioned by recipient. For each recipient the amounts
//! are summed and the balance is written once, under that user's lock; the
//! groups themselves run concurrently. Every transaction in a group then ends
//! `completed`, or every one ends `failed` if the group's write failed.
//!
//! # Guarantees
//!
//! - Each queued transaction reaches a terminal status exactly once
//! - A group never partially succeeds for one account
//! - When the queue closes, each worker flushes what it holds before exiting

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep_until;
use tracing::{debug, info, instrument, warn};

use super::processor::TransactionProcessor;
use crate::types::{Amount, LedgerError, Movement, Transaction, TransactionStatus, UserId};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WORKER_COUNT: usize = 3;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Configuration for the deposit worker pool
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Deposits held by one worker before it flushes
    pub max_batch_size: usize,

    /// Longest time a worker waits between flushes
    pub batch_timeout: Duration,

    /// Number of workers pulling from the queue
    pub worker_count: usize,

    /// Bounded queue size; a full queue sends deposits down the inline path
    pub queue_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl BatchConfig {
    /// Create a BatchConfig, replacing zero values with defaults
    ///
    /// # Arguments
    ///
    /// * `max_batch_size` - Deposits per flush
    /// * `batch_timeout` - Longest wait between flushes
    /// * `worker_count` - Number of workers
    /// * `queue_capacity` - Bounded queue size
    ///
    /// # Returns
    ///
    /// A `BatchConfig` in which every field is non-zero. Each replaced value
    /// is logged as a warning.
    pub fn new(
        max_batch_size: usize,
        batch_timeout: Duration,
        worker_count: usize,
        queue_capacity: usize,
    ) -> Self {
        let default = Self::default();

        Self {
            max_batch_size: non_zero("max_batch_size", max_batch_size, default.max_batch_size),
            batch_timeout: if batch_timeout.is_zero() {
                warn!(default = ?default.batch_timeout, "invalid batch_timeout (0), using default");
                default.batch_timeout
            } else {
                batch_timeout
            },
            worker_count: non_zero("worker_count", worker_count, default.worker_count),
            queue_capacity: non_zero("queue_capacity", queue_capacity, default.queue_capacity),
        }
    }
}

fn non_zero(field: &'static str, value: usize, default: usize) -> usize {
    if value == 0 {
        warn!(field, default, "invalid value (0), using default");
        default
    } else {
        value
    }
}

enum Event {
    Received(Transaction),
    Tick,
    Closed,
}

/// Worker loop: accumulate deposits from the shared queue and flush them
///
/// Exits once the queue is closed and drained, after flushing its partial
/// batch. A flush is never interrupted.
#[instrument(skip(queue, processor))]
pub(crate) async fn run_worker(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<Transaction>>>,
    processor: TransactionProcessor,
) {
    let config = processor.config().clone();
    let mut batch = Vec::with_capacity(config.max_batch_size);
    let mut deadline = tokio::time::Instant::now() + config.batch_timeout;
    debug!(worker_id, "worker started");

    loop {
        // recv is cancel-safe, so losing the race to the timer drops nothing
        let event = tokio::select! {
            received = async { queue.lock().await.recv().await } => match received {
                Some(tx) => Event::Received(tx),
                None => Event::Closed,
            },
            _ = sleep_until(deadline) => Event::Tick,
        };

        match event {
            Event::Received(tx) => {
                batch.push(tx);
                if batch.len() >= config.max_batch_size {
                    flush_batch(&processor, std::mem::take(&mut batch)).await;
                    deadline = tokio::time::Instant::now() + config.batch_timeout;
                }
            }
            Event::Tick => {
                if !batch.is_empty() {
                    flush_batch(&processor, std::mem::take(&mut batch)).await;
                }
                deadline = tokio::time::Instant::now() + config.batch_timeout;
            }
            Event::Closed => {
                if !batch.is_empty() {
                    flush_batch(&processor, std::mem::take(&mut batch)).await;
                }
                break;
            }
        }
    }
    debug!(worker_id, "worker stopped");
}

/// Split a batch into per-recipient deposit groups and everything else
///
/// Groups are keyed in ascending user-ID order and keep arrival order within
/// a group. Anything that is not a valid pending deposit lands in the second
/// vector, to be processed one at a time.
pub fn partition_by_recipient(
    batch: Vec<Transaction>,
) -> (BTreeMap<UserId, Vec<Transaction>>, Vec<Transaction>) {
    let mut groups: BTreeMap<UserId, Vec<Transaction>> = BTreeMap::new();
    let mut others = Vec::new();

    for tx in batch {
        match tx.movement() {
            Ok(Movement::Deposit { to, .. }) if tx.status == TransactionStatus::Pending => {
                groups.entry(to).or_default().push(tx);
            }
            _ => others.push(tx),
        }
    }

    (groups, others)
}

/// Apply a batch: one balance write per recipient, groups in parallel
pub async fn flush_batch(processor: &TransactionProcessor, batch: Vec<Transaction>) {
    let size = batch.len();
    processor.metrics().observe_batch(size);
    let (groups, others) = partition_by_recipient(batch);
    info!(size, recipients = groups.len(), "flushing deposit batch");

    for tx in others {
        let tx_id = tx.id;
        // failures are already persisted and logged by the processor
        if let Err(e) = processor.process_transaction(tx).await {
            debug!(tx_id, error = %e, "batched transaction not applied");
        }
    }

    join_all(
        groups
            .into_iter()
            .map(|(user_id, group)| apply_deposit_group(processor, user_id, group)),
    )
    .await;
}

async fn apply_deposit_group(
    processor: &TransactionProcessor,
    user_id: UserId,
    group: Vec<Transaction>,
) {
    let started = Instant::now();
    let total = group
        .iter()
        .try_fold(Amount::ZERO, |sum, tx| sum.checked_add(tx.amount))
        .ok_or_else(|| LedgerError::arithmetic_overflow("batch deposit", user_id));

    let result = match total {
        Ok(total) => processor.apply_deposit(user_id, total).await,
        Err(e) => Err(e),
    };
    match &result {
        Ok(()) => debug!(user_id, count = group.len(), "deposit group applied"),
        Err(e) => warn!(user_id, count = group.len(), error = %e, "deposit group failed"),
    }

    for tx in group {
        let tx_id = tx.id;
        if let Err(e) = processor.settle(tx, result.clone(), started).await {
            debug!(tx_id, error = %e, "batched deposit failed");
        }
    }
}
