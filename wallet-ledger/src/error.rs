//! Error types for the wallet ledger

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Amount failed validation (non-positive, or fee exceeds amount)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Debit would take the balance negative
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Balance at the time of the check
        available: Decimal,
        /// Amount the operation tried to debit
        requested: Decimal,
    },

    /// Wallet not found
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Escrow hold not found
    #[error("Escrow hold not found: {0}")]
    EscrowNotFound(String),

    /// Operation not legal in the entity's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Illegal transaction status transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Version stamp mismatch; caller should reload and retry
    #[error("Concurrent modification of wallet {0}")]
    ConcurrentModification(String),

    /// Caller does not own the referenced wallet
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Operation currency does not match the wallet currency
    #[error("Currency mismatch: wallet is {wallet}, operation is {operation}")]
    CurrencyMismatch {
        /// Wallet currency
        wallet: crate::types::Currency,
        /// Currency requested by the operation
        operation: crate::types::Currency,
    },

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the caller should retry with a freshly loaded wallet
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConcurrentModification(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_concurrent_modification_is_retryable() {
        assert!(Error::ConcurrentModification("w1".to_string()).is_retryable());
        assert!(!Error::InvalidAmount("zero".to_string()).is_retryable());
        assert!(!Error::InsufficientFunds {
            available: Decimal::ZERO,
            requested: Decimal::ONE,
        }
        .is_retryable());
    }
}
