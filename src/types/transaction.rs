//! Transaction records and their status state machine
//!
//! A [`Transaction`] is created `pending` by the caller-facing service and
//! moved exactly once to a terminal status by the processor. The processor
//! never dispatches on the raw type tag: [`Transaction::movement`] validates
//! the record and yields a [`Movement`], which is matched exhaustively.

use super::error::LedgerError;
use super::money::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User (account) identifier
///
/// Lock ordering is defined over this type's numeric order.
pub type UserId = u64;

/// Transaction identifier, assigned by the transaction store on creation
pub type TransactionId = u64;

/// Kind of money movement a transaction requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Credit funds to `to_user_id`; eligible for batching
    Deposit,

    /// Debit funds from `from_user_id`; needs an up-to-date balance check
    Withdrawal,

    /// Move funds from `from_user_id` to `to_user_id` under both locks
    Transfer,

    /// Administrative correction; not applied by the processor
    Adjustment,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Transfer => "transfer",
            TransactionType::Adjustment => "adjustment",
        }
    }

    /// Whether queued instances may be coalesced into one balance write
    pub fn is_batchable(self) -> bool {
        matches!(self, TransactionType::Deposit)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deposit" => Ok(TransactionType::Deposit),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            "transfer" => Ok(TransactionType::Transfer),
            "adjustment" => Ok(TransactionType::Adjustment),
            _ => Err(LedgerError::invalid_transaction_type(s.trim())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated money movement, one variant per transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Deposit {
        to: UserId,
        amount: Amount,
    },
    Withdrawal {
        from: UserId,
        amount: Amount,
    },
    Transfer {
        from: UserId,
        to: UserId,
        amount: Amount,
    },
    Adjustment {
        user_id: UserId,
        amount: Amount,
    },
}

/// Record of an intended or completed money movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Zero until the transaction store assigns an id
    pub id: TransactionId,

    pub from_user_id: Option<UserId>,
    pub to_user_id: Option<UserId>,
    pub amount: Amount,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub notes: String,

    /// Why the transaction ended `failed`, if it did
    pub failure_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        tx_type: TransactionType,
        from_user_id: Option<UserId>,
        to_user_id: Option<UserId>,
        amount: Amount,
        notes: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Transaction {
            id: 0,
            from_user_id,
            to_user_id,
            amount,
            tx_type,
            status: TransactionStatus::Pending,
            notes: notes.into(),
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn deposit(to: UserId, amount: Amount, notes: impl Into<String>) -> Self {
        Self::new(TransactionType::Deposit, None, Some(to), amount, notes)
    }

    pub fn withdrawal(from: UserId, amount: Amount, notes: impl Into<String>) -> Self {
        Self::new(TransactionType::Withdrawal, Some(from), None, amount, notes)
    }

    pub fn transfer(from: UserId, to: UserId, amount: Amount, notes: impl Into<String>) -> Self {
        Self::new(TransactionType::Transfer, Some(from), Some(to), amount, notes)
    }

    /// Check the record's invariants without classifying it
    pub fn validate(&self) -> Result<(), LedgerError> {
        self.movement().map(|_| ())
    }

    /// Validate the record and classify it into a [`Movement`]
    ///
    /// Runs before any lock is taken: amount must be positive, the sides the
    /// type needs must be set, and a transfer's sides must differ.
    pub fn movement(&self) -> Result<Movement, LedgerError> {
        if !self.amount.is_positive() {
            return Err(LedgerError::invalid_amount(
                self.amount.to_string(),
                "must be greater than zero",
            ));
        }

        let amount = self.amount;
        match self.tx_type {
            TransactionType::Deposit => {
                let to = self.require(self.to_user_id, "a recipient")?;
                Ok(Movement::Deposit { to, amount })
            }
            TransactionType::Withdrawal => {
                let from = self.require(self.from_user_id, "a sender")?;
                Ok(Movement::Withdrawal { from, amount })
            }
            TransactionType::Transfer => {
                let from = self.require(self.from_user_id, "a sender")?;
                let to = self.require(self.to_user_id, "a recipient")?;
                if from == to {
                    return Err(LedgerError::same_account_transfer(from));
                }
                Ok(Movement::Transfer { from, to, amount })
            }
            TransactionType::Adjustment => {
                let user_id = self
                    .to_user_id
                    .or(self.from_user_id)
                    .ok_or_else(|| LedgerError::missing_participant(self.tx_type, "a user"))?;
                Ok(Movement::Adjustment { user_id, amount })
            }
        }
    }

    fn require(&self, side: Option<UserId>, field: &'static str) -> Result<UserId, LedgerError> {
        side.ok_or_else(|| LedgerError::missing_participant(self.tx_type, field))
    }

    /// Whether the user is on either side of this transaction
    pub fn involves(&self, user_id: UserId) -> bool {
        self.from_user_id == Some(user_id) || self.to_user_id == Some(user_id)
    }

    /// The user recorded as having initiated the movement
    pub fn actor(&self) -> UserId {
        self.from_user_id.or(self.to_user_id).unwrap_or_default()
    }

    pub fn complete(&mut self) -> Result<(), LedgerError> {
        self.transition(TransactionStatus::Completed)
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), LedgerError> {
        self.transition(TransactionStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    // pending -> completed | failed; everything else is rejected
    fn transition(&mut self, to: TransactionStatus) -> Result<(), LedgerError> {
        let allowed = self.status == TransactionStatus::Pending
            && matches!(to, TransactionStatus::Completed | TransactionStatus::Failed);
        if !allowed {
            return Err(LedgerError::invalid_status_transition(
                self.id,
                self.status,
                to,
            ));
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}
