//! Transaction ledger
//!
//! Append-oriented log of platform transactions. A record's `amount`, `fee`,
//! and `tx_type` never change after [`TransactionLedger::open`]; only the
//! status (forward, per [`TransactionStatus::can_transition_to`]) and the
//! terminal timestamps move. The ledger is the single source of truth for
//! why a balance changed.

use crate::{
    error::{Error, Result},
    fees,
    storage::Storage,
    types::{Currency, LedgerTransaction, TransactionStatus, TransactionType, WalletId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Filters for transaction listings
#[derive(Debug, Clone)]
pub struct TransactionFilter {
    /// Restrict to one transaction type
    pub tx_type: Option<TransactionType>,

    /// Restrict to one status
    pub status: Option<TransactionStatus>,

    /// Maximum records returned, newest first
    pub limit: usize,
}

impl Default for TransactionFilter {
    fn default() -> Self {
        Self {
            tx_type: None,
            status: None,
            limit: 20,
        }
    }
}

/// Transaction ledger
pub struct TransactionLedger {
    storage: Arc<Storage>,
}

impl TransactionLedger {
    /// Create new transaction ledger
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Open a transaction in `Pending` status.
    ///
    /// Validates `amount > 0` and `fee <= amount`; `net_amount` is derived
    /// here and never recomputed.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &self,
        tx_type: TransactionType,
        wallet_id: WalletId,
        amount: Decimal,
        fee: Decimal,
        currency: Currency,
        description: impl Into<String>,
        related_transaction_id: Option<Uuid>,
    ) -> Result<LedgerTransaction> {
        if fee < Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "fee must be non-negative, got {}",
                fee
            )));
        }
        let net_amount = fees::net_amount(amount, fee)?;

        let tx = LedgerTransaction {
            id: Uuid::now_v7(),
            wallet_id,
            tx_type,
            amount,
            fee,
            net_amount,
            currency,
            status: TransactionStatus::Pending,
            related_transaction_id,
            description: description.into(),
            failure_reason: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        self.storage.put_transaction(&tx)?;

        tracing::info!(
            transaction_id = %tx.id,
            wallet_id = %tx.wallet_id,
            tx_type = ?tx.tx_type,
            amount = %tx.amount,
            fee = %tx.fee,
            "Transaction opened"
        );

        Ok(tx)
    }

    /// Get transaction by ID
    pub fn get(&self, tx_id: Uuid) -> Result<LedgerTransaction> {
        self.storage.get_transaction(tx_id)
    }

    /// List a wallet's transactions, newest first
    pub fn list_by_wallet(
        &self,
        wallet_id: &WalletId,
        filter: &TransactionFilter,
    ) -> Result<Vec<LedgerTransaction>> {
        let mut txs = self.storage.transactions_for_wallet(wallet_id)?;

        txs.retain(|tx| {
            filter.tx_type.map_or(true, |t| tx.tx_type == t)
                && filter.status.map_or(true, |s| tx.status == s)
        });
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        txs.truncate(filter.limit);

        Ok(txs)
    }

    /// Move a transaction to `Processing`
    pub fn mark_processing(&self, tx_id: Uuid) -> Result<LedgerTransaction> {
        self.transition(tx_id, TransactionStatus::Processing, |_| {})
    }

    /// Move a transaction to `Completed`, stamping `completed_at`
    pub fn mark_completed(
        &self,
        tx_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<LedgerTransaction> {
        self.transition(tx_id, TransactionStatus::Completed, |tx| {
            tx.completed_at = Some(completed_at);
        })
    }

    /// Move a transaction to `Failed`, recording the reason
    pub fn mark_failed(
        &self,
        tx_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<LedgerTransaction> {
        let reason = reason.into();
        self.transition(tx_id, TransactionStatus::Failed, |tx| {
            tx.failure_reason = Some(reason);
        })
    }

    /// Move a transaction to `Cancelled`
    pub fn mark_cancelled(&self, tx_id: Uuid) -> Result<LedgerTransaction> {
        self.transition(tx_id, TransactionStatus::Cancelled, |_| {})
    }

    fn transition(
        &self,
        tx_id: Uuid,
        next: TransactionStatus,
        apply: impl FnOnce(&mut LedgerTransaction),
    ) -> Result<LedgerTransaction> {
        let mut tx = self.storage.get_transaction(tx_id)?;

        if !tx.status.can_transition_to(next) {
            return Err(Error::InvalidTransition(format!(
                "transaction {} cannot move {} -> {}",
                tx.id, tx.status, next
            )));
        }

        tx.status = next;
        apply(&mut tx);
        self.storage.put_transaction(&tx)?;

        tracing::info!(
            transaction_id = %tx.id,
            status = %tx.status,
            "Transaction status updated"
        );

        Ok(tx)
    }
}
