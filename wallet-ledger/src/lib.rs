//! Paylance Wallet Ledger
//!
//! Wallet balances, deposits, withdrawals, and milestone escrow for the
//! marketplace platform.
//!
//! # Architecture
//!
//! - **Fixed-point money**: `rust_decimal` everywhere, no floats
//! - **Atomic commits**: a balance change and the transaction/hold records
//!   explaining it persist in one storage batch
//! - **Optimistic concurrency**: every balance write compares a version
//!   stamp; stale writers retry with a fresh wallet
//! - **Idempotent escrow resolution**: the hold record's status is the single
//!   authority, so duplicate release/refund calls are absorbed
//!
//! # Invariants
//!
//! - Conservation: balance == Σ(signed effects of completed transactions)
//! - No negative balances, ever
//! - Transaction status only moves forward; terminal states stay terminal
//! - Exactly one resolution (release xor refund) per escrow hold

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod escrow;
pub mod fees;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod transactions;
pub mod types;
pub mod wallet;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::{CreateHoldRequest, Ledger, OperationReceipt};
pub use storage::Storage;
pub use transactions::{TransactionFilter, TransactionLedger};
pub use types::{
    ContractId, Currency, EscrowHold, EscrowStatus, LedgerTransaction, ProfileId,
    TransactionStatus, TransactionType, Wallet, WalletId,
};
pub use wallet::WalletStore;
