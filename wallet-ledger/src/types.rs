//! Core types for the wallet ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Wallet identifier (document-store id, opaque and stable)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletId(String);

impl WalletId {
    /// Create new wallet ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh wallet ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Profile identifier (wallet owner / escrow receiver)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(String);

impl ProfileId {
    /// Create new profile ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Contract identifier referenced by escrow holds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId(String);

impl ContractId {
    /// Create new contract ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported currency (fiat and crypto)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound
    GBP,
    /// Japanese Yen
    JPY,
    /// Bitcoin
    BTC,
    /// Ether
    ETH,
    /// Solana
    SOL,
    /// Tether
    USDT,
    /// USD Coin
    USDC,
}

impl Currency {
    /// Currency code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::BTC => "BTC",
            Currency::ETH => "ETH",
            Currency::SOL => "SOL",
            Currency::USDT => "USDT",
            Currency::USDC => "USDC",
        }
    }

    /// Parse from code
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "JPY" => Some(Currency::JPY),
            "BTC" => Some(Currency::BTC),
            "ETH" => Some(Currency::ETH),
            "SOL" => Some(Currency::SOL),
            "USDT" => Some(Currency::USDT),
            "USDC" => Some(Currency::USDC),
            _ => None,
        }
    }

    /// Minor-unit precision (decimal places amounts are rounded to)
    pub fn minor_units(&self) -> u32 {
        match self {
            Currency::USD | Currency::EUR | Currency::GBP => 2,
            Currency::JPY => 0,
            Currency::BTC => 8,
            Currency::ETH => 6,
            Currency::SOL => 4,
            Currency::USDT | Currency::USDC => 2,
        }
    }

    /// Display symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::USD | Currency::USDT | Currency::USDC => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::JPY => "¥",
            Currency::BTC => "₿",
            Currency::ETH => "Ξ",
            Currency::SOL => "◎",
        }
    }

    /// Format an amount with symbol and minor-unit precision
    pub fn format(&self, amount: Decimal) -> String {
        let mut rounded = amount.round_dp(self.minor_units());
        rounded.rescale(self.minor_units());
        format!("{}{}", self.symbol(), rounded)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A per-owner, per-currency balance account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Wallet ID
    pub id: WalletId,

    /// Owning profile
    pub owner_id: ProfileId,

    /// Wallet currency
    pub currency: Currency,

    /// Current balance (never negative)
    pub balance: Decimal,

    /// At most one default wallet per owner+currency
    pub is_default: bool,

    /// Soft-disable flag; disabled wallets reject balance mutations
    pub is_active: bool,

    /// Optimistic-concurrency stamp, bumped on every balance write
    pub version: u64,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a fresh zero-balance wallet
    pub fn new(owner_id: ProfileId, currency: Currency, is_default: bool) -> Self {
        let now = Utc::now();
        Self {
            id: WalletId::generate(),
            owner_id,
            currency,
            balance: Decimal::ZERO,
            is_default,
            is_active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a signed balance delta, producing the next wallet state.
    ///
    /// Fails with `InsufficientFunds` if the result would be negative and
    /// `InvalidState` if the wallet is disabled. Does not persist.
    pub fn apply_delta(&self, delta: Decimal) -> crate::Result<Wallet> {
        if !self.is_active {
            return Err(crate::Error::InvalidState(format!(
                "wallet {} is disabled",
                self.id
            )));
        }

        let new_balance = self.balance + delta;
        if new_balance < Decimal::ZERO {
            return Err(crate::Error::InsufficientFunds {
                available: self.balance,
                requested: -delta,
            });
        }

        let mut next = self.clone();
        next.balance = new_balance;
        next.version += 1;
        next.updated_at = Utc::now();
        Ok(next)
    }
}

/// Transaction type (balance-affecting event kind)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionType {
    /// Funds added to a wallet from outside the platform
    Deposit = 1,
    /// Funds removed from a wallet to outside the platform
    Withdrawal = 2,
    /// Direct payment to another party
    Payment = 3,
    /// Reversal of a prior payment
    Refund = 4,
    /// Platform fee charge
    Fee = 5,
    /// Funds debited into escrow
    EscrowHold = 6,
    /// Escrowed funds credited to the receiver
    EscrowRelease = 7,
    /// Escrowed funds credited back to the funder
    EscrowRefund = 8,
}

impl TransactionType {
    /// Whether this type credits the referenced wallet (vs. debiting it)
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionType::Deposit
                | TransactionType::Refund
                | TransactionType::EscrowRelease
                | TransactionType::EscrowRefund
        )
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "Deposit",
            TransactionType::Withdrawal => "Withdrawal",
            TransactionType::Payment => "Payment",
            TransactionType::Refund => "Refund",
            TransactionType::Fee => "Platform Fee",
            TransactionType::EscrowHold => "Escrow Funding",
            TransactionType::EscrowRelease => "Escrow Release",
            TransactionType::EscrowRefund => "Escrow Refund",
        }
    }
}

/// Transaction status lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Created, not yet handed to a processor
    Pending = 1,
    /// In flight with a processor
    Processing = 2,
    /// Settled; balance effect applied (terminal)
    Completed = 3,
    /// Aborted; no balance effect (terminal)
    Failed = 4,
    /// Withdrawn by the caller before processing (terminal)
    Cancelled = 5,
}

impl TransactionStatus {
    /// Check if this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Cancelled
        )
    }

    /// Status only moves forward: Pending → Processing → terminal
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        match self {
            TransactionStatus::Pending => matches!(
                next,
                TransactionStatus::Processing
                    | TransactionStatus::Completed
                    | TransactionStatus::Failed
                    | TransactionStatus::Cancelled
            ),
            TransactionStatus::Processing => matches!(
                next,
                TransactionStatus::Completed
                    | TransactionStatus::Failed
                    | TransactionStatus::Cancelled
            ),
            _ => false,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// An immutable-once-terminal record of a balance-affecting event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Unique transaction ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Wallet this transaction affects
    pub wallet_id: WalletId,

    /// Transaction type
    pub tx_type: TransactionType,

    /// Gross amount (always positive)
    pub amount: Decimal,

    /// Platform fee withheld
    pub fee: Decimal,

    /// Net amount: amount - fee
    pub net_amount: Decimal,

    /// Currency
    pub currency: Currency,

    /// Current status
    pub status: TransactionStatus,

    /// Links a release/refund back to its originating hold transaction
    pub related_transaction_id: Option<Uuid>,

    /// Description for statements
    pub description: String,

    /// Reason recorded when the transaction failed
    pub failure_reason: Option<String>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Settled timestamp (set exactly once, at completion)
    pub completed_at: Option<DateTime<Utc>>,
}

impl LedgerTransaction {
    /// Signed balance effect of this transaction, if completed.
    ///
    /// Deposits credit the net amount (the fee is skimmed before the wallet
    /// is touched); all other types move the gross amount.
    pub fn signed_effect(&self) -> Option<Decimal> {
        if self.status != TransactionStatus::Completed {
            return None;
        }

        let magnitude = match self.tx_type {
            TransactionType::Deposit => self.net_amount,
            _ => self.amount,
        };

        if self.tx_type.is_credit() {
            Some(magnitude)
        } else {
            Some(-magnitude)
        }
    }

    /// Copy of this transaction in Completed status
    pub fn into_completed(mut self, completed_at: DateTime<Utc>) -> Self {
        self.status = TransactionStatus::Completed;
        self.completed_at = Some(completed_at);
        self
    }
}

/// Escrow hold status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EscrowStatus {
    /// Funds debited from the funder and parked (initial)
    Held = 1,
    /// Funds credited to the receiver (terminal)
    Released = 2,
    /// Funds credited back to the funder (terminal)
    Refunded = 3,
}

impl EscrowStatus {
    /// Check if this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowStatus::Released | EscrowStatus::Refunded)
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EscrowStatus::Held => "held",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
        };
        write!(f, "{}", s)
    }
}

/// Funds debited from a funder and held pending release or refund
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowHold {
    /// Unique hold ID
    pub id: Uuid,

    /// Contract this hold pays for
    pub contract_id: ContractId,

    /// Milestone within the contract; absent for contract-level holds
    pub milestone_id: Option<String>,

    /// Wallet debited at hold time (and credited on refund)
    pub funder_wallet_id: WalletId,

    /// Profile credited on release
    pub receiver_profile_id: ProfileId,

    /// Held amount
    pub amount: Decimal,

    /// Currency
    pub currency: Currency,

    /// Current status
    pub status: EscrowStatus,

    /// The escrow_hold transaction created atomically with this record
    pub hold_transaction_id: Uuid,

    /// The escrow_release/escrow_refund transaction, once resolved
    pub resolution_transaction_id: Option<Uuid>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Resolved timestamp (set exactly once)
    pub resolved_at: Option<DateTime<Utc>>,
}

impl EscrowHold {
    /// Copy of this hold in the given terminal status
    pub fn into_resolved(
        mut self,
        status: EscrowStatus,
        resolution_transaction_id: Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Self {
        self.status = status;
        self.resolution_transaction_id = Some(resolution_transaction_id);
        self.resolved_at = Some(resolved_at);
        self
    }
}
