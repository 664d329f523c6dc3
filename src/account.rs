// 10.0: per-trader ledger. collateral, both position sides with VWAP
// entries, margin locked against resting orders, reward bookkeeping, and
// the pending-credit receivable for gains the reserve could not pay.
// 10.1 has the reduce-then-add netting rule at the bottom.

use crate::types::{Price, Quote, Side, Timestamp, TraderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub trader: TraderId,
    /// Never negative. Losses beyond collateral are foregone, not owed.
    pub collateral: Quote,
    pub long_qty: Decimal,
    pub short_qty: Decimal,
    /// Volume-weighted entry, zeroed when the side fully closes.
    pub avg_long_price: Decimal,
    pub avg_short_price: Decimal,
    /// Realized gains the reserve could not pay yet. Claimable later.
    pub pending_credit: Quote,
    /// Initial margin reserved against resting maker orders.
    pub locked_im: Quote,
    /// Reward accumulator snapshot as of this account's last settlement.
    pub reward_debt: Decimal,
    pub pending_reward: Quote,
    /// This account's contribution to the eligibility total.
    pub last_eligible: Quote,
    pub created_at: Timestamp,
}

impl Account {
    pub fn new(trader: TraderId, now: Timestamp) -> Self {
        Self {
            trader,
            collateral: Quote::ZERO,
            long_qty: Decimal::ZERO,
            short_qty: Decimal::ZERO,
            avg_long_price: Decimal::ZERO,
            avg_short_price: Decimal::ZERO,
            pending_credit: Quote::ZERO,
            locked_im: Quote::ZERO,
            reward_debt: Decimal::ZERO,
            pending_reward: Quote::ZERO,
            last_eligible: Quote::ZERO,
            created_at: now,
        }
    }

    pub fn gross_qty(&self) -> Decimal {
        self.long_qty + self.short_qty
    }

    pub fn is_flat(&self) -> bool {
        self.long_qty.is_zero() && self.short_qty.is_zero()
    }

    pub fn gross_notional(&self, index: Price, contract_size: Decimal) -> Quote {
        Quote::new(self.gross_qty() * index.value() * contract_size)
    }

    /// Mark-to-index paper PnL, signed.
    pub fn unrealized_pnl(&self, index: Price, contract_size: Decimal) -> Quote {
        let long_leg = self.long_qty * (index.value() - self.avg_long_price);
        let short_leg = self.short_qty * (self.avg_short_price - index.value());
        Quote::new((long_leg + short_leg) * contract_size)
    }

    /// Collateral plus paper PnL. May be negative; margin checks use this.
    pub fn equity_signed(&self, index: Price, contract_size: Decimal) -> Quote {
        self.collateral + self.unrealized_pnl(index, contract_size)
    }

    /// Reported equity, floored at zero.
    pub fn equity(&self, index: Price, contract_size: Decimal) -> Quote {
        self.equity_signed(index, contract_size).floor_zero()
    }

    pub fn credit_collateral(&mut self, amount: Quote) {
        debug_assert!(!amount.is_negative());
        self.collateral += amount;
    }

    /// Take up to `amount` from collateral, returning what was actually
    /// taken. The balance never goes negative.
    pub fn debit_collateral_capped(&mut self, amount: Quote) -> Quote {
        debug_assert!(!amount.is_negative());
        let taken = amount.min(self.collateral);
        self.collateral -= taken;
        taken
    }
}

/// What one fill did to an account, in per-side deltas. The engine folds
/// these into the market's open-interest totals.
#[derive(Debug, Clone, Copy, Default)]
pub struct FillOutcome {
    pub reduced_long: Decimal,
    pub reduced_short: Decimal,
    pub added_long: Decimal,
    pub added_short: Decimal,
    /// Signed realized PnL from the reducing leg. Settled against the
    /// reserve by the caller, not here.
    pub realized: Quote,
}

impl FillOutcome {
    pub fn long_delta(&self) -> Decimal {
        self.added_long - self.reduced_long
    }

    pub fn short_delta(&self) -> Decimal {
        self.added_short - self.reduced_short
    }
}

// 10.1: the netting rule. a fill first reduces the opposite side at its
// recorded entry (realizing pnl), then adds any remainder to the own side
// at a volume-weighted entry. avg entry zeroes when a side fully closes.
pub fn apply_fill(
    account: &mut Account,
    side: Side,
    qty: Decimal,
    price: Price,
    contract_size: Decimal,
) -> FillOutcome {
    debug_assert!(qty > Decimal::ZERO);
    let mut outcome = FillOutcome::default();
    let p = price.value();
    let mut remaining = qty;

    match side {
        Side::Long => {
            let reduce = remaining.min(account.short_qty);
            if reduce > Decimal::ZERO {
                outcome.realized +=
                    Quote::new((account.avg_short_price - p) * reduce * contract_size);
                account.short_qty -= reduce;
                if account.short_qty.is_zero() {
                    account.avg_short_price = Decimal::ZERO;
                }
                outcome.reduced_short = reduce;
                remaining -= reduce;
            }
            if remaining > Decimal::ZERO {
                account.avg_long_price =
                    weighted_entry(account.avg_long_price, account.long_qty, p, remaining);
                account.long_qty += remaining;
                outcome.added_long = remaining;
            }
        }
        Side::Short => {
            let reduce = remaining.min(account.long_qty);
            if reduce > Decimal::ZERO {
                outcome.realized +=
                    Quote::new((p - account.avg_long_price) * reduce * contract_size);
                account.long_qty -= reduce;
                if account.long_qty.is_zero() {
                    account.avg_long_price = Decimal::ZERO;
                }
                outcome.reduced_long = reduce;
                remaining -= reduce;
            }
            if remaining > Decimal::ZERO {
                account.avg_short_price =
                    weighted_entry(account.avg_short_price, account.short_qty, p, remaining);
                account.short_qty += remaining;
                outcome.added_short = remaining;
            }
        }
    }

    outcome
}

fn weighted_entry(old_avg: Decimal, old_qty: Decimal, price: Decimal, add_qty: Decimal) -> Decimal {
    (old_avg * old_qty + price * add_qty) / (old_qty + add_qty)
}

#[cfg(test)]
mod tests {
    use super::*;

    use rust_decimal_macros::dec;

    fn account() -> Account {
        let mut a = Account::new(TraderId(1), Timestamp::from_millis(0));
        a.collateral = Quote::new(dec!(1000));
        a
    }

    fn px(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    #[test]
    fn open_long_sets_vwap_entry() {
        let mut a = account();
        apply_fill(&mut a, Side::Long, dec!(10), px(dec!(100)), Decimal::ONE);
        apply_fill(&mut a, Side::Long, dec!(10), px(dec!(110)), Decimal::ONE);

        assert_eq!(a.long_qty, dec!(20));
        assert_eq!(a.avg_long_price, dec!(105));
        assert_eq!(a.short_qty, Decimal::ZERO);
    }

    #[test]
    fn reduce_realizes_against_entry() {
        let mut a = account();
        apply_fill(&mut a, Side::Long, dec!(10), px(dec!(100)), Decimal::ONE);
        let out = apply_fill(&mut a, Side::Short, dec!(4), px(dec!(110)), Decimal::ONE);

        // closed 4 at +10 each
        assert_eq!(out.realized.value(), dec!(40));
        assert_eq!(out.reduced_long, dec!(4));
        assert_eq!(a.long_qty, dec!(6));
        // entry unchanged on reduction
        assert_eq!(a.avg_long_price, dec!(100));
    }

    #[test]
    fn full_close_zeroes_entry() {
        let mut a = account();
        apply_fill(&mut a, Side::Short, dec!(5), px(dec!(100)), Decimal::ONE);
        let out = apply_fill(&mut a, Side::Long, dec!(5), px(dec!(90)), Decimal::ONE);

        // short closed below entry: gain
        assert_eq!(out.realized.value(), dec!(50));
        assert_eq!(a.short_qty, Decimal::ZERO);
        assert_eq!(a.avg_short_price, Decimal::ZERO);
    }

    #[test]
    fn cross_through_flips_side() {
        let mut a = account();
        apply_fill(&mut a, Side::Long, dec!(3), px(dec!(100)), Decimal::ONE);
        let out = apply_fill(&mut a, Side::Short, dec!(8), px(dec!(95)), Decimal::ONE);

        // 3 closed at -5 each, 5 opened short at 95
        assert_eq!(out.realized.value(), dec!(-15));
        assert_eq!(out.reduced_long, dec!(3));
        assert_eq!(out.added_short, dec!(5));
        assert_eq!(a.long_qty, Decimal::ZERO);
        assert_eq!(a.avg_long_price, Decimal::ZERO);
        assert_eq!(a.short_qty, dec!(5));
        assert_eq!(a.avg_short_price, dec!(95));
    }

    #[test]
    fn contract_size_scales_realized() {
        let mut a = account();
        apply_fill(&mut a, Side::Long, dec!(2), px(dec!(10)), dec!(5));
        let out = apply_fill(&mut a, Side::Short, dec!(2), px(dec!(12)), dec!(5));
        assert_eq!(out.realized.value(), dec!(20)); // 2 * 2 * 5
    }

    #[test]
    fn equity_floors_at_zero_but_signed_does_not() {
        let mut a = account();
        a.collateral = Quote::new(dec!(10));
        apply_fill(&mut a, Side::Long, dec!(10), px(dec!(100)), Decimal::ONE);

        let crashed = px(dec!(90));
        assert_eq!(a.equity_signed(crashed, Decimal::ONE).value(), dec!(-90));
        assert_eq!(a.equity(crashed, Decimal::ONE), Quote::ZERO);
    }

    #[test]
    fn debit_capped_never_goes_negative() {
        let mut a = account();
        let taken = a.debit_collateral_capped(Quote::new(dec!(1500)));
        assert_eq!(taken.value(), dec!(1000));
        assert_eq!(a.collateral, Quote::ZERO);
    }

    #[test]
    fn gross_notional_counts_both_sides() {
        let mut a = account();
        apply_fill(&mut a, Side::Long, dec!(3), px(dec!(100)), Decimal::ONE);
        // a second account state with both sides can only arise transiently,
        // but the arithmetic must still count both
        a.short_qty = dec!(2);
        assert_eq!(
            a.gross_notional(px(dec!(100)), Decimal::ONE).value(),
            dec!(500)
        );
    }
}
