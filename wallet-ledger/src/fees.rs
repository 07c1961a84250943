//! Fee calculation
//!
//! Pure functions only. Rounding happens here and nowhere else: fees are
//! rounded half-even at the currency's minor-unit precision so repeated
//! operations do not drift.

use crate::config::FeeConfig;
use crate::types::TransactionType;
use rust_decimal::{Decimal, RoundingStrategy};

/// Compute the platform fee for a gross amount.
///
/// `scale` is the currency's minor-unit precision (e.g. 2 for USD).
pub fn compute_fee(amount: Decimal, rate: Decimal, scale: u32) -> Decimal {
    (amount * rate).round_dp_with_strategy(scale, RoundingStrategy::MidpointNearestEven)
}

/// Net amount after the fee is withheld.
///
/// Fails with `InvalidAmount` if `amount <= 0` or the fee exceeds the amount.
pub fn net_amount(amount: Decimal, fee: Decimal) -> crate::Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(crate::Error::InvalidAmount(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    if fee > amount {
        return Err(crate::Error::InvalidAmount(format!(
            "fee {} exceeds amount {}",
            fee, amount
        )));
    }
    Ok(amount - fee)
}

/// Fee rates keyed by operation type
#[derive(Debug, Clone)]
pub struct FeeSchedule {
    deposit_rate: Decimal,
    withdrawal_rate: Decimal,
}

impl FeeSchedule {
    /// Build from configuration (rates already validated at load)
    pub fn new(config: &FeeConfig) -> Self {
        Self {
            deposit_rate: config.deposit_rate,
            withdrawal_rate: config.withdrawal_rate,
        }
    }

    /// Rate for an operation type. Escrow movements carry the full amount,
    /// so everything except deposit/withdrawal is zero-rated.
    pub fn rate_for(&self, tx_type: TransactionType) -> Decimal {
        match tx_type {
            TransactionType::Deposit => self.deposit_rate,
            TransactionType::Withdrawal => self.withdrawal_rate,
            _ => Decimal::ZERO,
        }
    }

    /// Fee for an operation at the given currency precision
    pub fn fee_for(&self, tx_type: TransactionType, amount: Decimal, scale: u32) -> Decimal {
        compute_fee(amount, self.rate_for(tx_type), scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_two_percent_of_fifty() {
        let fee = compute_fee(dec!(50.00), dec!(0.02), 2);
        assert_eq!(fee, dec!(1.00));
        assert_eq!(net_amount(dec!(50.00), fee).unwrap(), dec!(49.00));
    }

    #[test]
    fn test_half_even_rounding() {
        // 6.25 * 0.02 = 0.125 → rounds to the even neighbor 0.12
        assert_eq!(compute_fee(dec!(6.25), dec!(0.02), 2), dec!(0.12));
        // 18.75 * 0.02 = 0.375 → 0.38
        assert_eq!(compute_fee(dec!(18.75), dec!(0.02), 2), dec!(0.38));
    }

    #[test]
    fn test_zero_scale_currency() {
        // JPY has no minor units
        assert_eq!(compute_fee(dec!(1000), dec!(0.025), 0), dec!(25));
        assert_eq!(compute_fee(dec!(990), dec!(0.025), 0), dec!(25)); // 24.75 → 25
    }

    #[test]
    fn test_net_amount_rejects_non_positive() {
        assert!(net_amount(dec!(0), dec!(0)).is_err());
        assert!(net_amount(dec!(-5.00), dec!(0)).is_err());
    }

    #[test]
    fn test_net_amount_rejects_fee_over_amount() {
        assert!(net_amount(dec!(1.00), dec!(1.01)).is_err());
    }

    #[test]
    fn test_schedule_rates() {
        let schedule = FeeSchedule::new(&crate::config::FeeConfig::default());
        assert_eq!(schedule.rate_for(TransactionType::Deposit), dec!(0.02));
        assert_eq!(schedule.rate_for(TransactionType::Withdrawal), dec!(0.025));
        assert_eq!(schedule.rate_for(TransactionType::EscrowHold), dec!(0));
        assert_eq!(schedule.rate_for(TransactionType::EscrowRelease), dec!(0));
    }

    #[test]
    fn test_withdrawal_fee() {
        let schedule = FeeSchedule::new(&crate::config::FeeConfig::default());
        let fee = schedule.fee_for(TransactionType::Withdrawal, dec!(100.00), 2);
        assert_eq!(fee, dec!(2.50));
    }
}
