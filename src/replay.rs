//! Replay driver: feed a CSV of ledger commands through the service
//!
//! # Architecture
//!
//! ```text
//! Replayer
//!     ├── CommandReader (streaming CSV rows)
//!     ├── LedgerService
//!     │     ├── BalanceLedger ── MemoryBalanceStore, MemoryAuditSink, MemoryCache
//!     │     └── TransactionProcessor ── MemoryTransactionStore
//!     └── write_balances_csv (final balances)
//! ```
//!
//! # Modes
//!
//! - **inline**: every command is applied on the replay task; the worker
//!   pool is never started.
//! - **batched**: credits are queued for the worker pool. Before a debit or
//!   transfer that follows queued credits, the pool is drained and restarted,
//!   so the output matches inline mode for the same input.
//!
//! Malformed rows and rejected commands are logged and skipped; only I/O and
//! runtime failures abort the replay.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{CliArgs, ReplayMode};
use crate::config::LedgerConfig;
use crate::core::{BalanceLedger, InMemoryMetrics, LedgerService};
use crate::io::{write_balances_csv, Command, CommandReader};
use crate::store::{MemoryAuditSink, MemoryBalanceStore, MemoryCache, MemoryTransactionStore};
use crate::types::{ErrorKind, LedgerError, Transaction, TransactionStatus};

/// Outcome counts for one replay
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Commands applied on the replay task
    pub completed: usize,

    /// Credits handed to the worker pool
    pub queued: usize,

    /// Declined by a business rule (insufficient funds)
    pub declined: usize,

    /// Invalid commands (bad amount, same-account transfer, ...)
    pub rejected: usize,

    /// Infrastructure failures
    pub failed: usize,

    /// Rows that could not be parsed
    pub malformed: usize,
}

impl ReplaySummary {
    fn record(&mut self, result: &Result<Transaction, LedgerError>) {
        match result {
            Ok(tx) if tx.status == TransactionStatus::Pending => self.queued += 1,
            Ok(_) => self.completed += 1,
            Err(e) => match e.kind() {
                ErrorKind::Declined => self.declined += 1,
                ErrorKind::Validation | ErrorKind::NotFound => self.rejected += 1,
                ErrorKind::Infrastructure => self.failed += 1,
            },
        }
    }
}

/// Replays a command file against a fresh in-memory ledger
#[derive(Debug, Clone)]
pub struct Replayer {
    mode: ReplayMode,
    config: LedgerConfig,
    worker_threads: usize,
}

impl Replayer {
    pub fn new(mode: ReplayMode, config: LedgerConfig) -> Self {
        Self {
            mode,
            config,
            worker_threads: num_cpus::get(),
        }
    }

    pub fn from_args(args: &CliArgs) -> Self {
        Self::new(args.mode, args.to_ledger_config())
    }

    /// Replay `input_path` and write final balances to `output`
    ///
    /// # Returns
    ///
    /// * `Ok(ReplaySummary)` once every row has been handled
    /// * `Err(String)` if the runtime, the input file or the output failed
    pub fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<ReplaySummary, String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.worker_threads)
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(self.replay_file(input_path, output))
    }

    async fn replay_file(
        &self,
        input_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ReplaySummary, String> {
        let reader = CommandReader::new(input_path)?;

        let balances = Arc::new(MemoryBalanceStore::new());
        let metrics = Arc::new(InMemoryMetrics::new());
        let ledger = BalanceLedger::new(
            balances.clone(),
            Arc::new(MemoryAuditSink::new()),
            metrics.clone(),
            self.config.clone(),
        )
        .with_cache(Arc::new(MemoryCache::new()));
        let service = LedgerService::new(Arc::new(ledger), Arc::new(MemoryTransactionStore::new()));

        let batched = self.mode == ReplayMode::Batched;
        let token = CancellationToken::new();
        if batched {
            service.start(token.clone()).await;
        }

        let mut summary = ReplaySummary::default();
        let mut credits_in_flight = false;
        for row in reader {
            let command = match row {
                Ok(command) => command,
                Err(e) => {
                    warn!(error = %e, "skipping malformed row");
                    summary.malformed += 1;
                    continue;
                }
            };

            if credits_in_flight && !matches!(command, Command::Credit { .. }) {
                service.stop().await;
                service.start(token.clone()).await;
                credits_in_flight = false;
            }

            let result = apply(&service, command).await;
            if let Err(e) = &result {
                warn!(error = %e, "command not applied");
            }
            summary.record(&result);
            credits_in_flight |= batched
                && matches!(&result, Ok(tx) if tx.status == TransactionStatus::Pending);
        }

        if batched {
            service.stop().await;
        }

        write_balances_csv(&balances.all_balances(), output)?;

        let (batches, batched_items) = metrics.batches();
        let (balance_writes, balance_write_time) = metrics.timing("balance_update");
        info!(
            balance_writes,
            balance_write_time = ?balance_write_time,
            failed_writes = metrics.count("balance_update", "error"),
            queue_full = metrics.count("queue", "full"),
            completed = summary.completed,
            queued = summary.queued,
            declined = summary.declined,
            rejected = summary.rejected,
            failed = summary.failed,
            malformed = summary.malformed,
            batches,
            batched_items,
            "replay finished"
        );
        Ok(summary)
    }
}

async fn apply(service: &LedgerService, command: Command) -> Result<Transaction, LedgerError> {
    match command {
        Command::Credit {
            user_id,
            amount,
            notes,
        } => service.credit(user_id, amount, &notes).await,
        Command::Debit {
            user_id,
            amount,
            notes,
        } => service.debit(user_id, amount, &notes).await,
        Command::Transfer {
            from,
            to,
            amount,
            notes,
        } => service.transfer(from, to, amount, &notes).await,
    }
}
