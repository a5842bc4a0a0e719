//! CSV format handling for replay commands and balance output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CommandRecord structure for deserialization
//! - Conversion from CSV records to ledger commands
//! - Balance output serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::types::{Amount, Balance, LedgerError, TransactionType, UserId};
use serde::Deserialize;
use std::io::Write;

/// CSV record structure for deserialization
///
/// Matches the input CSV format with columns: type, from, to, amount, notes.
/// `from` is empty for credits and `to` is empty for debits.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CommandRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub from: Option<UserId>,
    pub to: Option<UserId>,
    pub amount: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A ledger operation requested by one CSV row
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Credit {
        user_id: UserId,
        amount: Amount,
        notes: String,
    },
    Debit {
        user_id: UserId,
        amount: Amount,
        notes: String,
    },
    Transfer {
        from: UserId,
        to: UserId,
        amount: Amount,
        notes: String,
    },
}

/// Convert a CommandRecord to a Command
///
/// Accepts `credit` or `deposit`, `debit` or `withdrawal`, and `transfer`
/// (case-insensitive). Only the shape of the row is checked here; amount
/// sign and same-account transfers are left to the ledger.
///
/// # Arguments
///
/// * `record` - The deserialized CSV record
///
/// # Returns
///
/// * `Ok(Command)` - Successfully converted record
/// * `Err(LedgerError)` - Unknown type, unparseable amount or missing user
pub fn convert_command_record(record: CommandRecord) -> Result<Command, LedgerError> {
    let tx_type = match record.kind.trim().to_lowercase().as_str() {
        "credit" => TransactionType::Deposit,
        "debit" => TransactionType::Withdrawal,
        other => other.parse::<TransactionType>()?,
    };
    let amount: Amount = record.amount.parse()?;
    let notes = record.notes.unwrap_or_default();

    match tx_type {
        TransactionType::Deposit => Ok(Command::Credit {
            user_id: record
                .to
                .ok_or_else(|| LedgerError::missing_participant(tx_type, "a recipient"))?,
            amount,
            notes,
        }),
        TransactionType::Withdrawal => Ok(Command::Debit {
            user_id: record
                .from
                .ok_or_else(|| LedgerError::missing_participant(tx_type, "a sender"))?,
            amount,
            notes,
        }),
        TransactionType::Transfer => Ok(Command::Transfer {
            from: record
                .from
                .ok_or_else(|| LedgerError::missing_participant(tx_type, "a sender"))?,
            to: record
                .to
                .ok_or_else(|| LedgerError::missing_participant(tx_type, "a recipient"))?,
            amount,
            notes,
        }),
        TransactionType::Adjustment => Err(LedgerError::invalid_transaction_type(record.kind)),
    }
}

/// Write balances to CSV format
///
/// Writes balances with columns: user, balance. Balances are sorted by user
/// ID for deterministic output and rendered with two decimals.
///
/// # Arguments
///
/// * `balances` - Slice of balances to write
/// * `output` - Mutable reference to a writer for outputting CSV
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_balances_csv(balances: &[Balance], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["user", "balance"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = balances.to_vec();
    sorted.sort_by_key(|balance| balance.user_id);

    for balance in sorted {
        writer
            .write_record(&[balance.user_id.to_string(), balance.amount().to_string()])
            .map_err(|e| format!("Failed to write balance record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
