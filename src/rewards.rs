// 12.0: continuous pro-rata reward distribution without per-account
// iteration. a global accumulator tracks "reward per eligible unit" scaled
// by 1e18; each account remembers the accumulator value it last settled
// against (reward_debt) and its own eligible amount. settle-before-touch,
// refresh-after-touch gives O(1) work per operation.
//
// eligibility is at-risk margin: min(equity, required initial margin) --
// capital genuinely exposed, so resting-only or overfunded accounts don't
// farm the pot.

use crate::account::Account;
use crate::types::Quote;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub const ACC_SCALE: Decimal = dec!(1_000_000_000_000_000_000);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardPool {
    /// Reward per eligible unit, scaled by 1e18. Monotonically increasing.
    pub acc_per_eligible: Decimal,
    /// Sum of every account's `last_eligible`.
    pub total_eligible: Decimal,
    /// Deposited but not yet claimed balance backing pending rewards.
    pub pot: Quote,
    /// Deposits parked while nobody was eligible; folds into the
    /// accumulator with the next deposit or refresh once eligibility
    /// returns.
    pub carry: Quote,
    pub total_deposited: Quote,
    pub total_paid: Quote,
}

impl RewardPool {
    pub fn deposit(&mut self, amount: Quote) {
        debug_assert!(!amount.is_negative());
        self.pot += amount;
        self.total_deposited += amount;

        if self.total_eligible.is_zero() {
            self.carry += amount;
        } else {
            let distributable = amount + std::mem::take(&mut self.carry);
            self.acc_per_eligible += distributable.value() * ACC_SCALE / self.total_eligible;
        }
    }

    /// Credit the account's pending reward up to the current accumulator.
    /// Must run before any operation mutates the account.
    pub fn settle(&mut self, account: &mut Account) {
        let owed = account.last_eligible.value()
            * (self.acc_per_eligible - account.reward_debt)
            / ACC_SCALE;
        if owed > Decimal::ZERO {
            account.pending_reward += Quote::new(owed);
        }
        account.reward_debt = self.acc_per_eligible;
    }

    /// Swap the account's eligibility contribution for its new value, after
    /// an operation. Settles first: the accumulator may have moved since
    /// the pre-operation settle (a carry fold), and the account's old
    /// eligibility is what that growth was owed against.
    pub fn refresh(&mut self, account: &mut Account, eligible: Quote) {
        debug_assert!(!eligible.is_negative());
        self.settle(account);
        self.total_eligible -= account.last_eligible.value();
        self.total_eligible += eligible.value();
        account.last_eligible = eligible;

        // a parked carry becomes distributable as soon as anyone is
        // eligible again
        if !self.carry.is_zero() && self.total_eligible > Decimal::ZERO {
            let distributable = std::mem::take(&mut self.carry);
            self.acc_per_eligible += distributable.value() * ACC_SCALE / self.total_eligible;
        }
    }

    /// Remove the account from eligibility entirely. Liquidation calls this
    /// before any sizing math so an under-margined account stops accruing.
    pub fn strip(&mut self, account: &mut Account) {
        self.settle(account);
        self.total_eligible -= account.last_eligible.value();
        account.last_eligible = Quote::ZERO;
    }

    /// Pay out the account's pending balance from the pot.
    pub fn claim(&mut self, account: &mut Account) -> Quote {
        self.settle(account);
        let amount = account.pending_reward.min(self.pot);
        account.pending_reward -= amount;
        self.pot -= amount;
        self.total_paid += amount;
        amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Timestamp, TraderId};
    use rust_decimal_macros::dec;

    fn account(id: u64) -> Account {
        Account::new(TraderId(id), Timestamp(0))
    }

    fn q(v: Decimal) -> Quote {
        Quote::new(v)
    }

    #[test]
    fn pro_rata_by_eligibility() {
        let mut pool = RewardPool::default();
        let mut a = account(1);
        let mut b = account(2);

        pool.settle(&mut a);
        pool.refresh(&mut a, q(dec!(30)));
        pool.settle(&mut b);
        pool.refresh(&mut b, q(dec!(70)));

        pool.deposit(q(dec!(100)));

        assert_eq!(pool.claim(&mut a).value(), dec!(30));
        assert_eq!(pool.claim(&mut b).value(), dec!(70));
    }

    #[test]
    fn deposit_with_no_eligibility_parks_in_carry() {
        let mut pool = RewardPool::default();
        pool.deposit(q(dec!(50)));
        assert_eq!(pool.carry.value(), dec!(50));
        assert!(pool.acc_per_eligible.is_zero());

        // first eligible account folds the carry in
        let mut a = account(1);
        pool.settle(&mut a);
        pool.refresh(&mut a, q(dec!(10)));
        assert!(pool.carry.is_zero());

        assert_eq!(pool.claim(&mut a).value(), dec!(50));
    }

    #[test]
    fn late_joiner_earns_nothing_retroactively() {
        let mut pool = RewardPool::default();
        let mut early = account(1);
        pool.settle(&mut early);
        pool.refresh(&mut early, q(dec!(10)));

        pool.deposit(q(dec!(40)));

        let mut late = account(2);
        pool.settle(&mut late);
        pool.refresh(&mut late, q(dec!(10)));

        assert_eq!(pool.claim(&mut late), Quote::ZERO);
        assert_eq!(pool.claim(&mut early).value(), dec!(40));
    }

    #[test]
    fn strip_freezes_accrual() {
        let mut pool = RewardPool::default();
        let mut a = account(1);
        pool.settle(&mut a);
        pool.refresh(&mut a, q(dec!(10)));

        pool.deposit(q(dec!(10)));
        pool.strip(&mut a);
        // earned before the strip is kept
        assert_eq!(a.pending_reward.value(), dec!(10));
        assert!(pool.total_eligible.is_zero());

        // deposits after the strip accrue to nobody (carry), not to a
        pool.deposit(q(dec!(10)));
        assert_eq!(pool.claim(&mut a).value(), dec!(10));
        assert_eq!(pool.carry.value(), dec!(10));
    }

    #[test]
    fn conservation_under_churn() {
        let mut pool = RewardPool::default();
        let mut accounts: Vec<Account> = (1..=4).map(account).collect();

        for (i, acc) in accounts.iter_mut().enumerate() {
            pool.settle(acc);
            pool.refresh(acc, q(Decimal::from((i as u64 + 1) * 10)));
        }
        pool.deposit(q(dec!(97)));
        for acc in accounts.iter_mut() {
            pool.settle(acc);
            pool.refresh(acc, q(dec!(5)));
        }
        pool.deposit(q(dec!(13)));

        let mut paid = Quote::ZERO;
        for acc in accounts.iter_mut() {
            paid += pool.claim(acc);
        }
        let pending: Quote = accounts.iter().map(|a| a.pending_reward).sum();
        assert!(pending.value() + paid.value() <= pool.total_deposited.value());
        // nothing material stranded beyond rounding dust
        assert!(pool.total_deposited.value() - paid.value() < dec!(0.000001));
    }
}
