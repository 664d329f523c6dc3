// 6.0: liquidation sizing and penalty math.
//
// Sizing is deliberately an estimate, carried over from the production
// system: the shortfall to an IM-plus-buffer target is ceil-divided by a
// representative per-contract margin value at the current price and tier.
// Under some price/tier combinations this over- or under-shoots the exact
// buffer; the keeper simply calls again. Do not "fix" this into an exact
// solve.

use crate::account::Account;
use crate::config::{FeeConfig, MarginConfig};
use crate::margin::{effective_im_bps, per_contract_margin};
use crate::types::{Bps, Price, Quote, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The quantity and side a liquidation should close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosePlan {
    pub side: Side,
    pub qty: Decimal,
}

/// Close from whichever side is currently larger, reducing gross exposure
/// fastest. Ties go to the long side.
pub fn larger_side(account: &Account) -> Option<Side> {
    if account.is_flat() {
        return None;
    }
    if account.long_qty >= account.short_qty {
        Some(Side::Long)
    } else {
        Some(Side::Short)
    }
}

/// Minimal closing quantity to restore the buffer target:
/// `ceil(shortfall / per_contract)`, capped by the requested maximum and by
/// the chosen side's actual size.
pub fn plan_close(
    account: &Account,
    index: Price,
    contract_size: Decimal,
    config: &MarginConfig,
    equity: Quote,
    max_qty: Decimal,
) -> Option<ClosePlan> {
    let side = larger_side(account)?;
    let side_qty = match side {
        Side::Long => account.long_qty,
        Side::Short => account.short_qty,
    };

    let gross_notional = account.gross_notional(index, contract_size);
    let target_bps = Bps(
        effective_im_bps(config, gross_notional).value() + config.liquidation_buffer_bps.value(),
    );
    let target_requirement = Quote::new(target_bps.of(gross_notional.value()));
    let shortfall = (target_requirement - equity).floor_zero();
    if shortfall.is_zero() {
        return None;
    }

    let per_contract = per_contract_margin(index, contract_size, target_bps);
    if per_contract.is_zero() {
        return None;
    }

    let needed = (shortfall.value() / per_contract.value()).ceil();
    let qty = needed.min(max_qty).min(side_qty);
    if qty <= Decimal::ZERO {
        return None;
    }

    Some(ClosePlan { side, qty })
}

/// How a liquidation penalty is carved up. Keeper and treasury take their
/// configured cuts; the remainder lands in the PnL reserve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PenaltySplit {
    pub total: Quote,
    pub keeper: Quote,
    pub treasury: Quote,
    pub reserve: Quote,
}

pub fn split_penalty(total: Quote, fees: &FeeConfig) -> PenaltySplit {
    let keeper = Quote::new(fees.keeper_share_bps.of(total.value()));
    let treasury = Quote::new(fees.treasury_share_bps.of(total.value()));
    PenaltySplit {
        total,
        keeper,
        treasury,
        reserve: total - keeper - treasury,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierSchedule;
    use crate::types::{Timestamp, TraderId};
    use rust_decimal_macros::dec;

    fn margin_config() -> MarginConfig {
        MarginConfig {
            initial_margin_bps: Bps(1_000),
            maintenance_margin_bps: Bps(500),
            liquidation_buffer_bps: Bps(0),
            tiers: TierSchedule::default(),
        }
    }

    fn px(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    fn long_account(qty: Decimal, entry: Decimal) -> Account {
        let mut a = Account::new(TraderId(7), Timestamp(0));
        a.long_qty = qty;
        a.avg_long_price = entry;
        a
    }

    #[test]
    fn worked_sizing_example() {
        // per-contract margin 5 (price 50, 10% IM), shortfall 50 -> 10 lots
        let cfg = margin_config();
        let mut a = long_account(dec!(100), dec!(50));
        a.collateral = Quote::new(dec!(450)); // target 500, equity 450

        let plan = plan_close(&a, px(dec!(50)), Decimal::ONE, &cfg, Quote::new(dec!(450)), dec!(1000))
            .unwrap();
        assert_eq!(plan.side, Side::Long);
        assert_eq!(plan.qty, dec!(10));
    }

    #[test]
    fn sizing_rounds_up() {
        let cfg = margin_config();
        let a = long_account(dec!(100), dec!(50));
        // shortfall 48, per-contract 5 -> ceil(9.6) = 10
        let plan = plan_close(&a, px(dec!(50)), Decimal::ONE, &cfg, Quote::new(dec!(452)), dec!(1000))
            .unwrap();
        assert_eq!(plan.qty, dec!(10));
    }

    #[test]
    fn sizing_caps_at_side_and_request() {
        let cfg = margin_config();
        let a = long_account(dec!(4), dec!(50));
        // huge shortfall, but only 4 contracts exist
        let plan = plan_close(&a, px(dec!(50)), Decimal::ONE, &cfg, Quote::ZERO, dec!(1000)).unwrap();
        assert_eq!(plan.qty, dec!(4));

        let capped = plan_close(&a, px(dec!(50)), Decimal::ONE, &cfg, Quote::ZERO, dec!(2)).unwrap();
        assert_eq!(capped.qty, dec!(2));
    }

    #[test]
    fn no_plan_when_already_at_target() {
        let cfg = margin_config();
        let a = long_account(dec!(10), dec!(50));
        // requirement 50, equity comfortably above
        assert!(plan_close(&a, px(dec!(50)), Decimal::ONE, &cfg, Quote::new(dec!(100)), dec!(10)).is_none());
    }

    #[test]
    fn closes_larger_side_first() {
        let mut a = long_account(dec!(2), dec!(50));
        a.short_qty = dec!(9);
        a.avg_short_price = dec!(50);
        assert_eq!(larger_side(&a), Some(Side::Short));

        a.short_qty = dec!(2);
        assert_eq!(larger_side(&a), Some(Side::Long)); // tie -> long
    }

    #[test]
    fn buffer_raises_the_target() {
        let mut cfg = margin_config();
        cfg.liquidation_buffer_bps = Bps(500); // target 15%
        let a = long_account(dec!(100), dec!(50));

        // equity exactly at plain IM (500) still shows a 250 shortfall
        // against the buffered target of 750, at 7.5/contract
        let plan = plan_close(&a, px(dec!(50)), Decimal::ONE, &cfg, Quote::new(dec!(500)), dec!(1000))
            .unwrap();
        assert_eq!(plan.qty, dec!(34)); // ceil(250 / 7.5)
    }

    #[test]
    fn penalty_split_routes_remainder_to_reserve() {
        let fees = FeeConfig {
            keeper_share_bps: Bps(4_000),
            treasury_share_bps: Bps(2_000),
            ..FeeConfig::default()
        };
        let split = split_penalty(Quote::new(dec!(100)), &fees);
        assert_eq!(split.keeper.value(), dec!(40));
        assert_eq!(split.treasury.value(), dec!(20));
        assert_eq!(split.reserve.value(), dec!(40));
        assert_eq!(
            (split.keeper + split.treasury + split.reserve).value(),
            split.total.value()
        );
    }
}
