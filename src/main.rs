//! Ledger replay CLI
//!
//! Replays credit, debit and transfer commands from a CSV file through the
//! ledger and prints the final balances to stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- commands.csv > balances.csv
//! cargo run -- --mode batched commands.csv > balances.csv
//! cargo run -- --mode batched --workers 4 --batch-size 500 --batch-timeout-ms 200 commands.csv
//! RUST_LOG=ledger_link=debug cargo run -- commands.csv
//! ```
//!
//! Logs go to stderr so stdout stays machine-readable.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, file not readable, etc.)

use ledger_link::cli;
use ledger_link::replay::Replayer;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = cli::parse_args();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let replayer = Replayer::from_args(&args);
    let mut output = std::io::stdout();
    if let Err(e) = replayer.process(&args.input_file, &mut output) {
        tracing::error!(error = %e, "replay failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
