use crate::config::LedgerConfig;
use crate::core::batch::BatchConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Replay credit, debit and transfer commands through the ledger
#[derive(Parser, Debug)]
#[command(name = "ledger-link")]
#[command(about = "Replay ledger commands from a CSV file and print final balances", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing ledger commands
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// How deposits are applied
    #[arg(
        long = "mode",
        value_name = "MODE",
        default_value = "inline",
        help = "Processing mode: 'inline' applies every command on the caller, 'batched' queues deposits for the worker pool"
    )]
    pub mode: ReplayMode,

    /// Number of deposit workers (batched mode only)
    #[arg(
        long = "workers",
        value_name = "COUNT",
        help = "Number of deposit workers (default: 3)"
    )]
    pub workers: Option<usize>,

    /// Deposits per flush (batched mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Deposits a worker holds before flushing (default: 100)"
    )]
    pub batch_size: Option<usize>,

    /// Longest wait between flushes, in milliseconds (batched mode only)
    #[arg(
        long = "batch-timeout-ms",
        value_name = "MILLIS",
        help = "Longest wait between flushes in milliseconds (default: 5000)"
    )]
    pub batch_timeout_ms: Option<u64>,

    /// Bounded deposit queue size (batched mode only)
    #[arg(
        long = "queue-capacity",
        value_name = "COUNT",
        help = "Deposit queue size; a full queue applies deposits inline (default: 1000)"
    )]
    pub queue_capacity: Option<usize>,

    /// Balance cache TTL in seconds
    #[arg(
        long = "cache-ttl-secs",
        value_name = "SECS",
        help = "How long cached balance reads stay fresh (default: 300)"
    )]
    pub cache_ttl_secs: Option<u64>,

    /// Log filter used when RUST_LOG is not set
    #[arg(
        long = "log-level",
        value_name = "LEVEL",
        default_value = "warn",
        help = "Log level when RUST_LOG is unset: error, warn, info, debug or trace"
    )]
    pub log_level: String,
}

/// Available replay modes
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReplayMode {
    Inline,
    Batched,
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments
    ///
    /// Values not given on the command line fall back to the defaults; zero
    /// values are replaced by `BatchConfig::new` with a warning.
    ///
    /// # Returns
    ///
    /// A `BatchConfig` with values from CLI arguments or defaults.
    pub fn to_batch_config(&self) -> BatchConfig {
        let default = BatchConfig::default();
        BatchConfig::new(
            self.batch_size.unwrap_or(default.max_batch_size),
            self.batch_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default.batch_timeout),
            self.workers.unwrap_or(default.worker_count),
            self.queue_capacity.unwrap_or(default.queue_capacity),
        )
    }

    /// Create the full LedgerConfig from CLI arguments
    pub fn to_ledger_config(&self) -> LedgerConfig {
        let default = LedgerConfig::default();
        LedgerConfig {
            cache_ttl: self
                .cache_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(default.cache_ttl),
            batch: self.to_batch_config(),
            ..default
        }
    }
}
