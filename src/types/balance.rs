//! Balance and balance-history records
//!
//! A [`Balance`] owns its own validation: `add` and `subtract` reject
//! non-positive amounts and `subtract` declines rather than going below zero.
//! The type is not synchronized on its own; the ledger's per-user lock is
//! what makes a read-modify-write exclusive.

use super::error::LedgerError;
use super::money::Amount;
use super::transaction::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current monetary value held by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: UserId,

    /// Never negative; only changed through the methods below
    amount: Amount,

    pub last_updated_at: DateTime<Utc>,
}

impl Balance {
    /// Zero balance for a freshly registered user
    pub fn new(user_id: UserId) -> Self {
        Balance {
            user_id,
            amount: Amount::ZERO,
            last_updated_at: Utc::now(),
        }
    }

    /// Rebuild a balance from stored parts, rejecting a negative amount
    pub fn from_parts(
        user_id: UserId,
        amount: Amount,
        last_updated_at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        if amount.is_negative() {
            return Err(LedgerError::negative_balance(user_id, amount));
        }
        Ok(Balance {
            user_id,
            amount,
            last_updated_at,
        })
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Read of the current amount, taken before a mutation so it can be undone
    pub fn snapshot(&self) -> Amount {
        self.amount
    }

    pub fn add(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::invalid_amount(
                amount.to_string(),
                "must be greater than zero",
            ));
        }
        let updated = self
            .amount
            .checked_add(amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("credit", self.user_id))?;
        self.apply(updated);
        Ok(())
    }

    pub fn subtract(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::invalid_amount(
                amount.to_string(),
                "must be greater than zero",
            ));
        }
        if self.amount < amount {
            return Err(LedgerError::insufficient_funds(
                self.user_id,
                self.amount,
                amount,
            ));
        }
        let updated = self
            .amount
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("debit", self.user_id))?;
        self.apply(updated);
        Ok(())
    }

    /// Overwrite the amount; used by the ledger's absolute update path
    pub(crate) fn set_amount(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if amount.is_negative() {
            return Err(LedgerError::negative_balance(self.user_id, amount));
        }
        self.apply(amount);
        Ok(())
    }

    fn apply(&mut self, amount: Amount) {
        self.amount = amount;
        self.last_updated_at = Utc::now();
    }
}

/// One row of a balance's audit trail, written once per successful mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceHistory {
    pub user_id: UserId,
    pub old_amount: Amount,
    pub new_amount: Amount,
    pub created_at: DateTime<Utc>,
}

impl BalanceHistory {
    pub fn new(user_id: UserId, old_amount: Amount, new_amount: Amount) -> Self {
        BalanceHistory {
            user_id,
            old_amount,
            new_amount,
            created_at: Utc::now(),
        }
    }
}
