//! Taker fee and maker rebate distribution.
//!
//! The taker pays `fill_notional * effective_bps`, where the effective rate
//! applies exactly one discount path. Makers share a rebate pool pro-rata
//! by filled notional; the last maker takes the exact remainder so rounding
//! never leaks a dust balance. What's left of the fee splits between the
//! PnL reserve and the general fee bucket.

use crate::types::{Bps, Quote, TraderId, BPS_DENOM};
use rust_decimal::{Decimal, RoundingStrategy};

#[derive(Debug, Clone)]
pub struct FeeBreakdown {
    pub taker_fee: Quote,
    pub rebate_pool: Quote,
    pub rebates: Vec<(TraderId, Quote)>,
    pub reserve_cut: Quote,
    pub general_cut: Quote,
}

pub fn taker_fee(total_fill_notional: Quote, effective_bps: Bps) -> Quote {
    Quote::new(effective_bps.of(total_fill_notional.value()))
}

/// The rebate rate can never exceed what the taker was actually charged.
pub fn rebate_bps(configured: Bps, effective_taker_bps: Bps) -> Bps {
    if configured < effective_taker_bps {
        configured
    } else {
        effective_taker_bps
    }
}

/// Split `pool` across makers proportionally to their filled notional.
/// Entries must be aggregated per maker; the final maker receives
/// `pool - sum(previous)` rather than a second proportional rounding.
pub fn split_rebates(pool: Quote, maker_notionals: &[(TraderId, Quote)]) -> Vec<(TraderId, Quote)> {
    if maker_notionals.is_empty() || pool.is_zero() {
        return Vec::new();
    }

    let total: Decimal = maker_notionals.iter().map(|(_, n)| n.value()).sum();
    if total.is_zero() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(maker_notionals.len());
    let mut distributed = Quote::ZERO;
    for (i, (maker, notional)) in maker_notionals.iter().enumerate() {
        let share = if i + 1 == maker_notionals.len() {
            pool - distributed
        } else {
            let exact = pool.value() * notional.value() / total;
            // round down; the tail absorbs the dust so shares never
            // overshoot the pool
            Quote::new(exact.round_dp_with_strategy(9, RoundingStrategy::ToZero))
        };
        distributed += share;
        out.push((*maker, share));
    }
    out
}

/// Route the post-rebate fee: `reserve_share_bps` into the reserve, the
/// rest into the general bucket.
pub fn route_remainder(fee_after_rebate: Quote, reserve_share_bps: Bps) -> (Quote, Quote) {
    debug_assert!(reserve_share_bps.value() <= BPS_DENOM);
    let reserve_cut = Quote::new(reserve_share_bps.of(fee_after_rebate.value()));
    (reserve_cut, fee_after_rebate - reserve_cut)
}

pub fn breakdown(
    total_fill_notional: Quote,
    effective_taker_bps: Bps,
    configured_rebate_bps: Bps,
    reserve_share_bps: Bps,
    maker_notionals: &[(TraderId, Quote)],
) -> FeeBreakdown {
    let fee = taker_fee(total_fill_notional, effective_taker_bps);
    let pool = if maker_notionals.is_empty() {
        Quote::ZERO
    } else {
        Quote::new(
            rebate_bps(configured_rebate_bps, effective_taker_bps).of(total_fill_notional.value()),
        )
    };
    let rebates = split_rebates(pool, maker_notionals);
    let (reserve_cut, general_cut) = route_remainder(fee - pool, reserve_share_bps);

    FeeBreakdown {
        taker_fee: fee,
        rebate_pool: pool,
        rebates,
        reserve_cut,
        general_cut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn q(v: Decimal) -> Quote {
        Quote::new(v)
    }

    #[test]
    fn worked_rebate_example() {
        // pool 100, weights 300/700 -> 30 and the exact remainder 70
        let rebates = split_rebates(
            q(dec!(100)),
            &[(TraderId(1), q(dec!(300))), (TraderId(2), q(dec!(700)))],
        );
        assert_eq!(rebates, vec![(TraderId(1), q(dec!(30))), (TraderId(2), q(dec!(70)))]);
    }

    #[test]
    fn rebate_split_conserves_pool_under_rounding() {
        let pool = q(dec!(10));
        let rebates = split_rebates(
            pool,
            &[
                (TraderId(1), q(dec!(1))),
                (TraderId(2), q(dec!(1))),
                (TraderId(3), q(dec!(1))),
            ],
        );
        let total: Quote = rebates.iter().map(|(_, r)| *r).sum();
        assert_eq!(total, pool);
        // last maker absorbed the rounding dust
        assert_eq!(rebates[2].1, pool - rebates[0].1 - rebates[1].1);
    }

    #[test]
    fn rebate_never_exceeds_charged_rate() {
        assert_eq!(rebate_bps(Bps(5), Bps(10)), Bps(5));
        assert_eq!(rebate_bps(Bps(15), Bps(10)), Bps(10));
    }

    #[test]
    fn remainder_routing() {
        let (reserve, general) = route_remainder(q(dec!(80)), Bps(2_500));
        assert_eq!(reserve.value(), dec!(20));
        assert_eq!(general.value(), dec!(60));
    }

    #[test]
    fn full_breakdown_conserves_fee() {
        let makers = [(TraderId(1), q(dec!(600))), (TraderId(2), q(dec!(400)))];
        let b = breakdown(q(dec!(1_000)), Bps(10), Bps(4), Bps(5_000), &makers);

        assert_eq!(b.taker_fee.value(), dec!(1));
        assert_eq!(b.rebate_pool.value(), dec!(0.4));
        let rebate_total: Quote = b.rebates.iter().map(|(_, r)| *r).sum();
        assert_eq!(rebate_total, b.rebate_pool);
        assert_eq!(
            (b.rebate_pool + b.reserve_cut + b.general_cut).value(),
            b.taker_fee.value()
        );
    }

    #[test]
    fn empty_makers_no_rebate() {
        let b = breakdown(q(dec!(1_000)), Bps(10), Bps(4), Bps(5_000), &[]);
        assert!(b.rebates.is_empty());
        assert!(b.rebate_pool.is_zero());
        // no makers: the full fee routes onward
        assert_eq!((b.reserve_cut + b.general_cut).value(), dec!(1));
    }
}
