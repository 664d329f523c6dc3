//! Staking / fee-configuration boundary.
//!
//! The engine asks one question per trade: what taker rate does this user
//! actually pay? Exactly one discount path applies: paying the fee in the
//! reward token, or the user's staking tier. Never both.

use crate::types::{Bps, TraderId, BPS_DENOM};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub trait FeeDiscount {
    /// Effective taker bps after at most one discount path.
    fn apply_discount(&self, base_bps: Bps, pay_in_reward_token: bool, user: TraderId) -> Bps;

    fn maker_rebate_bps(&self) -> Bps;

    fn bps_denominator(&self) -> u32 {
        BPS_DENOM
    }
}

/// Static lookup table standing in for the staking program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticFeeTable {
    /// Flat discount for paying the fee in the reward token, bps of the
    /// base rate's denominator (subtracted from base).
    pub reward_payment_discount_bps: Bps,
    /// Per-user staking tier discounts, same units.
    pub staking_discounts: HashMap<TraderId, Bps>,
    pub rebate_bps: Bps,
}

impl StaticFeeTable {
    pub fn new(reward_payment_discount_bps: Bps, rebate_bps: Bps) -> Self {
        Self {
            reward_payment_discount_bps,
            staking_discounts: HashMap::new(),
            rebate_bps,
        }
    }

    pub fn set_staking_discount(&mut self, user: TraderId, discount: Bps) {
        self.staking_discounts.insert(user, discount);
    }
}

impl FeeDiscount for StaticFeeTable {
    fn apply_discount(&self, base_bps: Bps, pay_in_reward_token: bool, user: TraderId) -> Bps {
        let discount = if pay_in_reward_token {
            self.reward_payment_discount_bps
        } else {
            self.staking_discounts
                .get(&user)
                .copied()
                .unwrap_or(Bps(0))
        };
        Bps(base_bps.value().saturating_sub(discount.value()))
    }

    fn maker_rebate_bps(&self) -> Bps {
        self.rebate_bps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_paths_are_exclusive() {
        let mut table = StaticFeeTable::new(Bps(4), Bps(2));
        table.set_staking_discount(TraderId(1), Bps(7));

        // reward-token payment ignores the (larger) staking discount
        assert_eq!(table.apply_discount(Bps(10), true, TraderId(1)), Bps(6));
        // staking path applies only without reward-token payment
        assert_eq!(table.apply_discount(Bps(10), false, TraderId(1)), Bps(3));
        // no tier, no payment discount: base rate
        assert_eq!(table.apply_discount(Bps(10), false, TraderId(2)), Bps(10));
    }

    #[test]
    fn discount_saturates_at_zero() {
        let table = StaticFeeTable::new(Bps(50), Bps(2));
        assert_eq!(table.apply_discount(Bps(10), true, TraderId(1)), Bps(0));
    }
}
