//! Main ledger orchestration layer
//!
//! This module ties together the wallet store, transaction ledger, escrow
//! store, and fee schedule into the public operation surface: deposit,
//! withdraw, create-hold, release, refund.
//!
//! Every money-moving operation follows the same discipline:
//!
//! 1. Validate inputs before any persistent write.
//! 2. Open a ledger transaction recording the intent.
//! 3. Commit the balance change and the completed transaction (and any hold
//!    record) in one atomic storage batch, under the wallet's version check.
//! 4. On failure, mark the open transaction `Failed` and surface the error —
//!    the wallet is never left debited without a completed or clearly
//!    failed record.
//!
//! # Example
//!
//! ```no_run
//! use wallet_ledger::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> wallet_ledger::Result<()> {
//!     let ledger = Ledger::open(Config::default())?;
//!
//!     // let receipt = ledger.deposit(&wallet_id, amount).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    config::Config,
    error::{Error, Result},
    escrow::{CreditTarget, EscrowStore, Resolution},
    fees::FeeSchedule,
    metrics::Metrics,
    storage::Storage,
    transactions::TransactionLedger,
    types::{
        ContractId, Currency, EscrowHold, LedgerTransaction, ProfileId, TransactionStatus,
        TransactionType, Wallet, WalletId,
    },
    wallet::WalletStore,
};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Duration;
use uuid::Uuid;

/// Result of a settled deposit or withdrawal
#[derive(Debug, Clone, Serialize)]
pub struct OperationReceipt {
    /// The transaction that explains the balance change
    pub transaction_id: Uuid,

    /// Gross amount
    pub amount: Decimal,

    /// Fee withheld by the platform
    pub fee: Decimal,

    /// Net amount
    pub net_amount: Decimal,

    /// Final transaction status
    pub status: TransactionStatus,

    /// Wallet balance after settlement
    pub wallet_balance: Decimal,
}

/// Parameters for creating an escrow hold
#[derive(Debug, Clone)]
pub struct CreateHoldRequest {
    /// Contract the hold pays for
    pub contract_id: ContractId,

    /// Milestone within the contract; absent for contract-level holds
    pub milestone_id: Option<String>,

    /// Wallet to debit
    pub funder_wallet_id: WalletId,

    /// Profile credited on release
    pub receiver_profile_id: ProfileId,

    /// Amount to hold
    pub amount: Decimal,

    /// Hold currency; must match the funder wallet
    pub currency: Currency,
}

/// Main ledger interface
pub struct Ledger {
    /// Direct storage access
    storage: Arc<Storage>,

    /// Wallet store
    wallets: WalletStore,

    /// Transaction ledger
    transactions: TransactionLedger,

    /// Escrow hold store
    escrows: EscrowStore,

    /// Fee schedule
    fees: FeeSchedule,

    /// Metrics collector
    metrics: Metrics,

    /// Configuration
    config: Config,

    /// Per-hold locks; duplicate resolutions serialize on the hold id
    resolution_locks: DashMap<Uuid, Arc<tokio::sync::Mutex<()>>>,
}

impl Ledger {
    /// Open ledger with configuration
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let storage = Arc::new(Storage::open(&config)?);
        let wallets = WalletStore::new(storage.clone());
        let transactions = TransactionLedger::new(storage.clone());
        let escrows = EscrowStore::new(storage.clone());
        let fees = FeeSchedule::new(&config.fees);
        let metrics = Metrics::new()
            .map_err(|e| Error::Other(format!("Failed to create metrics: {}", e)))?;

        Ok(Self {
            storage,
            wallets,
            transactions,
            escrows,
            fees,
            metrics,
            config,
            resolution_locks: DashMap::new(),
        })
    }

    /// Wallet store (lifecycle and read operations)
    pub fn wallets(&self) -> &WalletStore {
        &self.wallets
    }

    /// Transaction ledger (read operations and processor-driven transitions)
    pub fn transactions(&self) -> &TransactionLedger {
        &self.transactions
    }

    /// Escrow hold store (read operations)
    pub fn escrows(&self) -> &EscrowStore {
        &self.escrows
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Deposit into a wallet.
    ///
    /// The fee is skimmed at the deposit rate; the wallet is credited the
    /// net amount. Any failure after the transaction is opened leaves it
    /// `Failed` with the wallet untouched.
    pub async fn deposit(&self, wallet_id: &WalletId, amount: Decimal) -> Result<OperationReceipt> {
        let _timer = self.metrics.operation_duration.start_timer();

        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "deposit amount must be positive, got {}",
                amount
            )));
        }

        let wallet = self.wallets.get(wallet_id)?;
        let fee = self.fees.fee_for(
            TransactionType::Deposit,
            amount,
            wallet.currency.minor_units(),
        );

        let tx = self.transactions.open(
            TransactionType::Deposit,
            wallet_id.clone(),
            amount,
            fee,
            wallet.currency,
            "Wallet deposit",
            None,
        )?;

        let net = tx.net_amount;
        let (tx, wallet) = self.settle(wallet_id, tx, net).await?;
        self.metrics.deposits_total.inc();

        tracing::info!(
            transaction_id = %tx.id,
            wallet_id = %wallet_id,
            amount = %amount,
            fee = %fee,
            balance = %wallet.balance,
            "Deposit completed"
        );

        Ok(Self::receipt(&tx, &wallet))
    }

    /// Withdraw from a wallet.
    ///
    /// Checks `InsufficientFunds` before any state change. The wallet is
    /// debited the gross amount; the fee is retained by the platform.
    pub async fn withdraw(
        &self,
        wallet_id: &WalletId,
        amount: Decimal,
    ) -> Result<OperationReceipt> {
        let _timer = self.metrics.operation_duration.start_timer();

        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "withdrawal amount must be positive, got {}",
                amount
            )));
        }

        let wallet = self.wallets.get(wallet_id)?;
        if wallet.balance < amount {
            return Err(Error::InsufficientFunds {
                available: wallet.balance,
                requested: amount,
            });
        }

        let fee = self.fees.fee_for(
            TransactionType::Withdrawal,
            amount,
            wallet.currency.minor_units(),
        );

        let tx = self.transactions.open(
            TransactionType::Withdrawal,
            wallet_id.clone(),
            amount,
            fee,
            wallet.currency,
            "Wallet withdrawal",
            None,
        )?;

        let (tx, wallet) = self.settle(wallet_id, tx, -amount).await?;
        self.metrics.withdrawals_total.inc();

        tracing::info!(
            transaction_id = %tx.id,
            wallet_id = %wallet_id,
            amount = %amount,
            fee = %fee,
            balance = %wallet.balance,
            "Withdrawal completed"
        );

        Ok(Self::receipt(&tx, &wallet))
    }

    /// Create an escrow hold, debiting the funder wallet.
    ///
    /// The funder debit, the completed `EscrowHold` transaction, and the hold
    /// record persist in one atomic batch; on `InsufficientFunds` the opened
    /// transaction is marked `Failed` and no hold exists.
    pub async fn create_hold(&self, request: CreateHoldRequest) -> Result<EscrowHold> {
        let _timer = self.metrics.operation_duration.start_timer();

        if request.amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "escrow amount must be positive, got {}",
                request.amount
            )));
        }

        let funder = self.wallets.get(&request.funder_wallet_id)?;
        if funder.currency != request.currency {
            return Err(Error::CurrencyMismatch {
                wallet: funder.currency,
                operation: request.currency,
            });
        }

        let description = match &request.milestone_id {
            Some(milestone) => format!(
                "Escrow funding for contract #{} milestone #{}",
                request.contract_id, milestone
            ),
            None => format!("Escrow funding for contract #{}", request.contract_id),
        };

        let tx = self.transactions.open(
            TransactionType::EscrowHold,
            request.funder_wallet_id.clone(),
            request.amount,
            Decimal::ZERO,
            request.currency,
            description,
            None,
        )?;

        let hold = self.escrows.build_hold(
            request.contract_id,
            request.milestone_id,
            &funder,
            request.receiver_profile_id,
            request.amount,
            request.currency,
            tx.id,
        )?;

        let completed = tx.clone().into_completed(Utc::now());
        match self
            .commit_with_retry(
                &request.funder_wallet_id,
                -request.amount,
                &[&completed],
                &[&hold],
            )
            .await
        {
            Ok(_) => {
                self.metrics.escrow_holds_total.inc();
                tracing::info!(
                    escrow_id = %hold.id,
                    contract_id = %hold.contract_id,
                    funder_wallet_id = %hold.funder_wallet_id,
                    amount = %hold.amount,
                    "Escrow hold created"
                );
                Ok(hold)
            }
            Err(err) => Err(self.abort(tx.id, err)),
        }
    }

    /// Release a hold, crediting the receiver's wallet.
    ///
    /// If the receiver has no active wallet in the hold's currency, one is
    /// created with zero balance before crediting. Calling this on an
    /// already-resolved hold returns the resolved record without
    /// re-crediting.
    pub async fn release_hold(&self, hold_id: Uuid) -> Result<EscrowHold> {
        self.resolve_hold(hold_id, Resolution::Release).await
    }

    /// Refund a hold, crediting the funder's original wallet.
    ///
    /// Idempotent like [`release_hold`](Self::release_hold).
    pub async fn refund_hold(&self, hold_id: Uuid) -> Result<EscrowHold> {
        self.resolve_hold(hold_id, Resolution::Refund).await
    }

    async fn resolve_hold(&self, hold_id: Uuid, resolution: Resolution) -> Result<EscrowHold> {
        let _timer = self.metrics.operation_duration.start_timer();

        let lock = self
            .resolution_locks
            .entry(hold_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let hold = self.escrows.get(hold_id)?;
        if hold.status.is_terminal() {
            tracing::info!(
                escrow_id = %hold.id,
                status = %hold.status,
                "Duplicate resolution absorbed"
            );
            return Ok(hold);
        }

        let credit_wallet = match self.escrows.credit_target(&hold, resolution) {
            CreditTarget::Wallet(wallet_id) => self.wallets.get(&wallet_id)?,
            CreditTarget::Profile(profile_id) => {
                match self.wallets.get_default(&profile_id, hold.currency)? {
                    Some(wallet) => wallet,
                    None => self.wallets.create(profile_id, hold.currency, false)?,
                }
            }
        };

        let description = match resolution {
            Resolution::Release => {
                format!("Escrow release for contract #{}", hold.contract_id)
            }
            Resolution::Refund => {
                format!("Escrow refund for contract #{}", hold.contract_id)
            }
        };

        let tx = self.transactions.open(
            resolution.tx_type(),
            credit_wallet.id.clone(),
            hold.amount,
            Decimal::ZERO,
            hold.currency,
            description,
            Some(hold.hold_transaction_id),
        )?;

        let now = Utc::now();
        let completed = tx.clone().into_completed(now);
        let resolved = hold
            .clone()
            .into_resolved(resolution.terminal_status(), tx.id, now);

        match self
            .commit_with_retry(&credit_wallet.id, hold.amount, &[&completed], &[&resolved])
            .await
        {
            Ok(_) => {
                match resolution {
                    Resolution::Release => self.metrics.escrow_releases_total.inc(),
                    Resolution::Refund => self.metrics.escrow_refunds_total.inc(),
                }
                tracing::info!(
                    escrow_id = %resolved.id,
                    status = %resolved.status,
                    credit_wallet_id = %credit_wallet.id,
                    amount = %resolved.amount,
                    "Escrow hold resolved"
                );
                Ok(resolved)
            }
            Err(err) => Err(self.abort(tx.id, err)),
        }
    }

    /// Verify a wallet's balance equals the sum of its completed
    /// transactions' signed effects.
    ///
    /// This is the conservation invariant for financial correctness.
    pub fn check_conservation(&self, wallet_id: &WalletId) -> Result<bool> {
        let wallet = self.wallets.get(wallet_id)?;
        let txs = self.storage.transactions_for_wallet(wallet_id)?;

        let expected: Decimal = txs.iter().filter_map(|tx| tx.signed_effect()).sum();

        Ok(wallet.balance == expected)
    }

    // Settle a deposit/withdrawal: commit the balance delta and the completed
    // transaction atomically, marking the transaction failed on any error.
    async fn settle(
        &self,
        wallet_id: &WalletId,
        tx: LedgerTransaction,
        delta: Decimal,
    ) -> Result<(LedgerTransaction, Wallet)> {
        let completed = tx.clone().into_completed(Utc::now());
        match self
            .commit_with_retry(wallet_id, delta, &[&completed], &[])
            .await
        {
            Ok(wallet) => Ok((completed, wallet)),
            Err(err) => Err(self.abort(tx.id, err)),
        }
    }

    // Retry loop around the wallet store's version-checked commit. Each
    // attempt re-reads the wallet so the version stamp is fresh.
    async fn commit_with_retry(
        &self,
        wallet_id: &WalletId,
        delta: Decimal,
        transactions: &[&LedgerTransaction],
        holds: &[&EscrowHold],
    ) -> Result<Wallet> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let wallet = self.wallets.get(wallet_id)?;
            match self.wallets.adjust_balance_atomic(
                wallet_id,
                delta,
                wallet.version,
                transactions,
                holds,
            ) {
                Err(err) if err.is_retryable() && attempt < self.config.retry.max_attempts => {
                    self.metrics.version_conflicts_total.inc();
                    tracing::warn!(
                        wallet_id = %wallet_id,
                        attempt,
                        "Retrying after version conflict"
                    );
                    tokio::time::sleep(Duration::from_millis(
                        self.config.retry.backoff_ms * u64::from(attempt),
                    ))
                    .await;
                }
                other => return other,
            }
        }
    }

    // Mark the in-flight transaction failed and pass the original error on.
    fn abort(&self, tx_id: Uuid, err: Error) -> Error {
        self.metrics.failed_operations_total.inc();

        if let Err(mark_err) = self.transactions.mark_failed(tx_id, err.to_string()) {
            tracing::error!(
                transaction_id = %tx_id,
                error = %mark_err,
                "Failed to mark aborted transaction"
            );
        }

        tracing::warn!(transaction_id = %tx_id, error = %err, "Operation aborted");
        err
    }

    fn receipt(tx: &LedgerTransaction, wallet: &Wallet) -> OperationReceipt {
        OperationReceipt {
            transaction_id: tx.id,
            amount: tx.amount,
            fee: tx.fee,
            net_amount: tx.net_amount,
            status: tx.status,
            wallet_balance: wallet.balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_ledger() -> (Ledger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Ledger::open(config).unwrap(), temp_dir)
    }

    async fn funded_wallet(ledger: &Ledger, owner: &str, amount: Decimal) -> Wallet {
        let wallet = ledger
            .wallets()
            .create(ProfileId::new(owner), Currency::USD, false)
            .unwrap();
        // Prime balance without a fee so tests control exact numbers
        ledger
            .wallets()
            .adjust_balance(&wallet.id, amount, wallet.version)
            .unwrap()
    }

    #[tokio::test]
    async fn test_deposit_skims_fee() {
        let (ledger, _temp) = test_ledger();
        let wallet = funded_wallet(&ledger, "profile-1", dec!(100.00)).await;

        let receipt = ledger.deposit(&wallet.id, dec!(50.00)).await.unwrap();

        assert_eq!(receipt.fee, dec!(1.00));
        assert_eq!(receipt.net_amount, dec!(49.00));
        assert_eq!(receipt.status, TransactionStatus::Completed);
        assert_eq!(receipt.wallet_balance, dec!(149.00));
        assert_eq!(ledger.metrics().deposits_total.get(), 1);
    }

    #[tokio::test]
    async fn test_deposit_rejects_non_positive() {
        let (ledger, _temp) = test_ledger();
        let wallet = funded_wallet(&ledger, "profile-1", dec!(10.00)).await;

        assert!(matches!(
            ledger.deposit(&wallet.id, dec!(0)).await,
            Err(Error::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.deposit(&wallet.id, dec!(-5.00)).await,
            Err(Error::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn test_deposit_unknown_wallet() {
        let (ledger, _temp) = test_ledger();
        let result = ledger.deposit(&WalletId::new("missing"), dec!(10.00)).await;
        assert!(matches!(result, Err(Error::WalletNotFound(_))));
    }

    #[tokio::test]
    async fn test_withdraw_retains_fee() {
        let (ledger, _temp) = test_ledger();
        let wallet = funded_wallet(&ledger, "profile-1", dec!(100.00)).await;

        let receipt = ledger.withdraw(&wallet.id, dec!(40.00)).await.unwrap();

        assert_eq!(receipt.fee, dec!(1.00));
        assert_eq!(receipt.net_amount, dec!(39.00));
        // The wallet is debited the gross amount
        assert_eq!(receipt.wallet_balance, dec!(60.00));
    }

    #[tokio::test]
    async fn test_withdraw_insufficient_funds_is_clean() {
        let (ledger, _temp) = test_ledger();
        let wallet = funded_wallet(&ledger, "profile-1", dec!(30.00)).await;

        let result = ledger.withdraw(&wallet.id, dec!(50.00)).await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));

        // Balance unchanged, no transaction reached completed
        let stored = ledger.wallets().get(&wallet.id).unwrap();
        assert_eq!(stored.balance, dec!(30.00));

        let completed = ledger
            .transactions()
            .list_by_wallet(
                &wallet.id,
                &crate::transactions::TransactionFilter {
                    status: Some(TransactionStatus::Completed),
                    tx_type: Some(TransactionType::Withdrawal),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(completed.is_empty());
    }

    #[tokio::test]
    async fn test_conservation_after_operations() {
        let (ledger, _temp) = test_ledger();
        let wallet = ledger
            .wallets()
            .create(ProfileId::new("profile-1"), Currency::USD, false)
            .unwrap();

        ledger.deposit(&wallet.id, dec!(100.00)).await.unwrap();
        ledger.deposit(&wallet.id, dec!(25.00)).await.unwrap();
        ledger.withdraw(&wallet.id, dec!(30.00)).await.unwrap();

        assert!(ledger.check_conservation(&wallet.id).unwrap());
    }
}
