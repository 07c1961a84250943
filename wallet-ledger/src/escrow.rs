//! Escrow hold records
//!
//! State machine: `Held → Released | Refunded`, both terminal. A hold is
//! created atomically with its `EscrowHold` transaction (funder debit) and
//! resolved exactly once; the stored record's status is the single authority
//! consulted before any resolution. Money movement is orchestrated by the
//! [`Ledger`](crate::Ledger) facade — this module owns the records and the
//! transition rules.

use crate::{
    error::{Error, Result},
    storage::Storage,
    types::{
        ContractId, Currency, EscrowHold, EscrowStatus, ProfileId, TransactionType, Wallet,
        WalletId,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// How a held escrow resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Credit the receiver
    Release,
    /// Credit the funder back
    Refund,
}

impl Resolution {
    /// Terminal hold status this resolution produces
    pub fn terminal_status(&self) -> EscrowStatus {
        match self {
            Resolution::Release => EscrowStatus::Released,
            Resolution::Refund => EscrowStatus::Refunded,
        }
    }

    /// Transaction type recorded for this resolution
    pub fn tx_type(&self) -> TransactionType {
        match self {
            Resolution::Release => TransactionType::EscrowRelease,
            Resolution::Refund => TransactionType::EscrowRefund,
        }
    }
}

/// Escrow hold store
pub struct EscrowStore {
    storage: Arc<Storage>,
}

impl EscrowStore {
    /// Create new escrow store
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Build a hold record in `Held` status, linked to its funding
    /// transaction. Not persisted here: the facade commits it in the same
    /// batch as the funder debit.
    #[allow(clippy::too_many_arguments)]
    pub fn build_hold(
        &self,
        contract_id: ContractId,
        milestone_id: Option<String>,
        funder_wallet: &Wallet,
        receiver_profile_id: ProfileId,
        amount: Decimal,
        currency: Currency,
        hold_transaction_id: Uuid,
    ) -> Result<EscrowHold> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "escrow amount must be positive, got {}",
                amount
            )));
        }
        if funder_wallet.currency != currency {
            return Err(Error::CurrencyMismatch {
                wallet: funder_wallet.currency,
                operation: currency,
            });
        }

        Ok(EscrowHold {
            id: Uuid::now_v7(),
            contract_id,
            milestone_id,
            funder_wallet_id: funder_wallet.id.clone(),
            receiver_profile_id,
            amount,
            currency,
            status: EscrowStatus::Held,
            hold_transaction_id,
            resolution_transaction_id: None,
            created_at: Utc::now(),
            resolved_at: None,
        })
    }

    /// Get hold by ID
    pub fn get(&self, hold_id: Uuid) -> Result<EscrowHold> {
        self.storage.get_hold(hold_id)
    }

    /// List all holds for a contract
    pub fn list_by_contract(&self, contract_id: &ContractId) -> Result<Vec<EscrowHold>> {
        self.storage.holds_for_contract(contract_id)
    }

    /// Wallet credited by the given resolution
    pub fn credit_target(&self, hold: &EscrowHold, resolution: Resolution) -> CreditTarget {
        match resolution {
            Resolution::Refund => CreditTarget::Wallet(hold.funder_wallet_id.clone()),
            Resolution::Release => CreditTarget::Profile(hold.receiver_profile_id.clone()),
        }
    }
}

/// Destination of a resolution credit
#[derive(Debug, Clone)]
pub enum CreditTarget {
    /// A concrete wallet (refunds go back where the debit came from)
    Wallet(WalletId),
    /// A profile whose default wallet in the hold currency receives the
    /// credit (created with zero balance if absent)
    Profile(ProfileId),
}
