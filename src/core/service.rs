//! Caller-facing ledger API
//!
//! `LedgerService` is what a surrounding layer (an HTTP handler, the replay
//! driver) talks to. It validates requests before anything is persisted,
//! records each transaction as `pending`, and hands it to the processor.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::batch::BatchConfig;
use super::ledger::BalanceLedger;
use super::processor::{SubmitOutcome, TransactionProcessor};
use super::traits::TransactionStore;
use crate::types::{
    Amount, Balance, BalanceHistory, LedgerError, StoreError, Transaction, TransactionId, UserId,
};

#[derive(Clone)]
pub struct LedgerService {
    ledger: Arc<BalanceLedger>,
    processor: TransactionProcessor,
    transactions: Arc<dyn TransactionStore>,
}

impl LedgerService {
    /// Build the service and its processor around an existing ledger
    ///
    /// The worker pool is sized from the ledger's configuration and is not
    /// running until [`start`](Self::start) is called.
    pub fn new(ledger: Arc<BalanceLedger>, transactions: Arc<dyn TransactionStore>) -> Self {
        let batch: BatchConfig = ledger.config().batch.clone();
        let processor = TransactionProcessor::new(Arc::clone(&ledger), Arc::clone(&transactions), batch);
        Self {
            ledger,
            processor,
            transactions,
        }
    }

    pub fn ledger(&self) -> &Arc<BalanceLedger> {
        &self.ledger
    }

    pub fn processor(&self) -> &TransactionProcessor {
        &self.processor
    }

    /// Deposit into a user's balance
    ///
    /// # Returns
    ///
    /// The transaction as it stands when this call returns: `completed` if it
    /// was applied inline, `pending` if it was queued for a worker.
    #[instrument(skip(self, amount, notes), fields(amount = %amount))]
    pub async fn credit(
        &self,
        user_id: UserId,
        amount: Amount,
        notes: &str,
    ) -> Result<Transaction, LedgerError> {
        let tx = self.record(Transaction::deposit(user_id, amount, notes)).await?;
        match self.processor.submit(tx.clone()).await? {
            SubmitOutcome::Queued { .. } => Ok(tx),
            SubmitOutcome::Processed(done) => Ok(done),
        }
    }

    /// Withdraw from a user's balance; always applied inline
    #[instrument(skip(self, amount, notes), fields(amount = %amount))]
    pub async fn debit(
        &self,
        user_id: UserId,
        amount: Amount,
        notes: &str,
    ) -> Result<Transaction, LedgerError> {
        let tx = self
            .record(Transaction::withdrawal(user_id, amount, notes))
            .await?;
        self.processor.process_transaction(tx).await
    }

    /// Move funds between two users; always applied inline
    #[instrument(skip(self, amount, notes), fields(amount = %amount))]
    pub async fn transfer(
        &self,
        from_user_id: UserId,
        to_user_id: UserId,
        amount: Amount,
        notes: &str,
    ) -> Result<Transaction, LedgerError> {
        let tx = self
            .record(Transaction::transfer(from_user_id, to_user_id, amount, notes))
            .await?;
        self.processor.process_transaction(tx).await
    }

    pub async fn get_balance(&self, user_id: UserId) -> Result<Balance, LedgerError> {
        self.ledger.get_balance(user_id).await
    }

    pub async fn get_balance_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<BalanceHistory>, LedgerError> {
        self.ledger.get_balance_history(user_id, limit).await
    }

    pub async fn get_balance_at_time(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<Balance, LedgerError> {
        self.ledger.get_balance_at_time(user_id, at).await
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        self.transactions.get_by_id(id).await.map_err(|e| match e {
            StoreError::NotFound => LedgerError::transaction_not_found(id),
            source => LedgerError::infrastructure(format!("failed to load transaction {id}"), source),
        })
    }

    /// Transactions with the user on either side, newest first
    pub async fn get_user_transactions(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        self.transactions
            .get_by_user_id(user_id)
            .await
            .map_err(|source| {
                LedgerError::infrastructure(
                    format!("failed to load transactions for user {user_id}"),
                    source,
                )
            })
    }

    pub async fn start(&self, token: CancellationToken) {
        self.processor.start(token).await;
    }

    /// Stop the worker pool once every queued deposit has been applied
    pub async fn stop(&self) {
        self.processor.stop().await;
    }

    // Validation runs before anything is written.
    async fn record(&self, mut tx: Transaction) -> Result<Transaction, LedgerError> {
        tx.validate()?;
        tx.id = self.transactions.create(&tx).await.map_err(|source| {
            LedgerError::infrastructure("failed to record transaction", source)
        })?;
        debug!(tx_id = tx.id, tx_type = %tx.tx_type, "transaction recorded");
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::core::metrics::NoopMetrics;
    use crate::store::{MemoryAuditSink, MemoryBalanceStore, MemoryCache, MemoryTransactionStore};
    use crate::types::{ErrorKind, TransactionStatus};

    fn service() -> (LedgerService, Arc<MemoryTransactionStore>) {
        let ledger = BalanceLedger::new(
            Arc::new(MemoryBalanceStore::new()),
            Arc::new(MemoryAuditSink::new()),
            Arc::new(NoopMetrics),
            LedgerConfig::default(),
        )
        .with_cache(Arc::new(MemoryCache::new()));
        let transactions = Arc::new(MemoryTransactionStore::new());
        (
            LedgerService::new(Arc::new(ledger), transactions.clone()),
            transactions,
        )
    }

    fn cents(minor: i64) -> Amount {
        Amount::from_minor(minor)
    }

    #[tokio::test]
    async fn test_worked_example() {
        let (service, _) = service();

        service.credit(1, cents(500), "").await.unwrap();
        assert_eq!(service.get_balance(1).await.unwrap().amount(), cents(500));

        service.transfer(1, 2, cents(200), "").await.unwrap();
        assert_eq!(service.get_balance(1).await.unwrap().amount(), cents(300));
        assert_eq!(service.get_balance(2).await.unwrap().amount(), cents(200));

        let declined = service.debit(2, cents(250), "").await.unwrap_err();
        assert_eq!(declined.kind(), ErrorKind::Declined);
        assert_eq!(service.get_balance(2).await.unwrap().amount(), cents(200));
    }

    #[tokio::test]
    async fn test_validation_failures_are_not_recorded() {
        let (service, transactions) = service();

        let zero = service.credit(1, Amount::ZERO, "").await.unwrap_err();
        let same = service.transfer(3, 3, cents(100), "").await.unwrap_err();

        assert_eq!(zero.kind(), ErrorKind::Validation);
        assert_eq!(same, LedgerError::same_account_transfer(3));
        assert!(transactions.is_empty());
    }

    #[tokio::test]
    async fn test_failed_debit_is_persisted_as_failed() {
        let (service, _) = service();
        service.debit(4, cents(1), "").await.unwrap_err();

        let history = service.get_user_transactions(4).await.unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TransactionStatus::Failed);
        let fetched = service.get_transaction(history[0].id).await.unwrap();
        assert_eq!(fetched.status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_transaction_is_not_found() {
        let (service, _) = service();
        assert_eq!(
            service.get_transaction(99).await,
            Err(LedgerError::transaction_not_found(99))
        );
    }

    #[tokio::test]
    async fn test_queued_credit_is_returned_pending() {
        let (service, _) = service();
        service.start(CancellationToken::new()).await;

        let tx = service.credit(5, cents(100), "").await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);

        service.stop().await;
        assert_eq!(
            service.get_transaction(tx.id).await.unwrap().status,
            TransactionStatus::Completed
        );
        assert_eq!(service.get_balance(5).await.unwrap().amount(), cents(100));
    }
}
