//! PnL reserve boundary.
//!
//! Realized losses flow in, realized gains flow out, and withdrawals are
//! best-effort: the reserve pays what it holds and the caller records the
//! rest as a pending credit. The general fee bucket rides along so fee
//! routing has a single destination.

use crate::types::Quote;
use serde::{Deserialize, Serialize};

pub trait PnlReserve {
    fn deposit(&mut self, amount: Quote);

    /// Withdraw up to `amount`, returning what was actually paid.
    fn withdraw(&mut self, amount: Quote) -> Quote;

    fn available(&self) -> Quote;

    /// Fees destined for the general bucket, not for PnL backing.
    fn route_fee(&mut self, amount: Quote);
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryReserve {
    pub balance: Quote,
    pub fee_bucket: Quote,
    pub total_deposits: Quote,
    pub total_payouts: Quote,
}

impl InMemoryReserve {
    pub fn new(seed: Quote) -> Self {
        Self {
            balance: seed,
            fee_bucket: Quote::ZERO,
            total_deposits: seed,
            total_payouts: Quote::ZERO,
        }
    }
}

impl PnlReserve for InMemoryReserve {
    fn deposit(&mut self, amount: Quote) {
        debug_assert!(!amount.is_negative());
        self.balance += amount;
        self.total_deposits += amount;
    }

    fn withdraw(&mut self, amount: Quote) -> Quote {
        debug_assert!(!amount.is_negative());
        let paid = amount.min(self.balance);
        self.balance -= paid;
        self.total_payouts += paid;
        paid
    }

    fn available(&self) -> Quote {
        self.balance
    }

    fn route_fee(&mut self, amount: Quote) {
        debug_assert!(!amount.is_negative());
        self.fee_bucket += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn withdraw_is_best_effort() {
        let mut reserve = InMemoryReserve::new(Quote::new(dec!(100)));

        let paid = reserve.withdraw(Quote::new(dec!(40)));
        assert_eq!(paid.value(), dec!(40));

        // asking for more than the balance pays out the balance
        let partial = reserve.withdraw(Quote::new(dec!(500)));
        assert_eq!(partial.value(), dec!(60));
        assert!(reserve.available().is_zero());
    }

    #[test]
    fn fee_bucket_is_separate_from_backing() {
        let mut reserve = InMemoryReserve::new(Quote::ZERO);
        reserve.route_fee(Quote::new(dec!(5)));
        assert!(reserve.available().is_zero());
        assert_eq!(reserve.fee_bucket.value(), dec!(5));
    }
}
