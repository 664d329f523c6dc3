//! Tiered margin requirements.
//!
//! Required margin is a basis-point fraction of gross notional. The
//! effective rate is the greater of the configured base rate and the tier
//! schedule rate for the account's gross notional, where tiers form a step
//! function over ascending thresholds: larger books post proportionally
//! more margin.

use crate::config::{MarginConfig, TierSchedule};
use crate::types::{Bps, Price, Quote};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy)]
pub struct MarginRequirement {
    pub initial: Quote,
    pub maintenance: Quote,
    pub effective_im_bps: Bps,
}

/// The tier rate for a notional: the rate of the last threshold not
/// exceeding it, or 0 bps below the first threshold.
pub fn tier_bps(schedule: &TierSchedule, gross_notional: Quote) -> Bps {
    let mut selected = Bps(0);
    for (threshold, rate) in schedule.thresholds.iter().zip(&schedule.im_bps) {
        if gross_notional >= *threshold {
            selected = *rate;
        } else {
            break;
        }
    }
    selected
}

pub fn effective_im_bps(config: &MarginConfig, gross_notional: Quote) -> Bps {
    let tiered = tier_bps(&config.tiers, gross_notional);
    if tiered > config.initial_margin_bps {
        tiered
    } else {
        config.initial_margin_bps
    }
}

/// `gross_qty * price * contract_size * bps / 10_000`.
pub fn required_margin(
    gross_qty: Decimal,
    price: Price,
    contract_size: Decimal,
    bps: Bps,
) -> Quote {
    Quote::new(bps.of(gross_qty * price.value() * contract_size))
}

/// Margin a single contract carries at the given price and rate. Used by
/// liquidation sizing and locked-margin release.
pub fn per_contract_margin(price: Price, contract_size: Decimal, bps: Bps) -> Quote {
    required_margin(Decimal::ONE, price, contract_size, bps)
}

pub fn margin_requirement(
    gross_qty: Decimal,
    price: Price,
    contract_size: Decimal,
    config: &MarginConfig,
) -> MarginRequirement {
    let notional = Quote::new(gross_qty * price.value() * contract_size);
    let im_bps = effective_im_bps(config, notional);

    MarginRequirement {
        initial: required_margin(gross_qty, price, contract_size, im_bps),
        maintenance: required_margin(gross_qty, price, contract_size, config.maintenance_margin_bps),
        effective_im_bps: im_bps,
    }
}

/// Post-trade check: equity net of locked resting-order margin must cover
/// the initial requirement.
pub fn satisfies_initial_margin(
    equity_signed: Quote,
    locked_im: Quote,
    requirement: &MarginRequirement,
) -> bool {
    equity_signed - locked_im >= requirement.initial
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierSchedule;
    use rust_decimal_macros::dec;

    fn config() -> MarginConfig {
        MarginConfig {
            initial_margin_bps: Bps(1_000),
            maintenance_margin_bps: Bps(500),
            liquidation_buffer_bps: Bps(250),
            tiers: TierSchedule::new(
                vec![
                    Quote::new(dec!(1_000)),
                    Quote::new(dec!(10_000)),
                    Quote::new(dec!(100_000)),
                ],
                vec![Bps(1_000), Bps(2_000), Bps(4_000)],
            )
            .unwrap(),
        }
    }

    fn px(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    #[test]
    fn tier_is_a_step_function() {
        let cfg = config();
        assert_eq!(tier_bps(&cfg.tiers, Quote::new(dec!(999))), Bps(0));
        assert_eq!(tier_bps(&cfg.tiers, Quote::new(dec!(1_000))), Bps(1_000));
        assert_eq!(tier_bps(&cfg.tiers, Quote::new(dec!(9_999))), Bps(1_000));
        assert_eq!(tier_bps(&cfg.tiers, Quote::new(dec!(10_000))), Bps(2_000));
        assert_eq!(tier_bps(&cfg.tiers, Quote::new(dec!(5_000_000))), Bps(4_000));
    }

    #[test]
    fn base_rate_is_a_floor() {
        let cfg = config();
        // below every threshold the base rate applies
        assert_eq!(
            effective_im_bps(&cfg, Quote::new(dec!(100))),
            Bps(1_000)
        );
        // above, the tier wins
        assert_eq!(
            effective_im_bps(&cfg, Quote::new(dec!(50_000))),
            Bps(2_000)
        );
    }

    #[test]
    fn margin_formula() {
        // 100 contracts at index 1.0, contract size 1, 10% IM -> 10 units
        let req = margin_requirement(dec!(100), px(dec!(1)), Decimal::ONE, &config());
        assert_eq!(req.initial.value(), dec!(10));
        assert_eq!(req.maintenance.value(), dec!(5));
    }

    #[test]
    fn margin_check_respects_locked() {
        let req = margin_requirement(dec!(100), px(dec!(1)), Decimal::ONE, &config());
        assert!(satisfies_initial_margin(
            Quote::new(dec!(10)),
            Quote::ZERO,
            &req
        ));
        assert!(!satisfies_initial_margin(
            Quote::new(dec!(9)),
            Quote::ZERO,
            &req
        ));
        // locked margin is not available to cover the position
        assert!(!satisfies_initial_margin(
            Quote::new(dec!(12)),
            Quote::new(dec!(3)),
            &req
        ));
    }

    #[test]
    fn requirement_is_monotonic_across_tiers() {
        let cfg = config();
        let mut last = Bps(0);
        for notional in [0i64, 500, 1_000, 5_000, 10_000, 100_000, 1_000_000] {
            let bps = effective_im_bps(&cfg, Quote::new(Decimal::from(notional)));
            assert!(bps >= last, "rate decreased at {}", notional);
            last = bps;
        }
    }

    #[test]
    fn per_contract_value() {
        assert_eq!(
            per_contract_margin(px(dec!(200)), Decimal::ONE, Bps(1_000)).value(),
            dec!(20)
        );
    }
}
