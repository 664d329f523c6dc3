// 7.0 config.rs: all series settings in one place. margin tiers, fees,
// index parameters, exposure caps. admin-tunable through the engine, with
// validation here so a bad schedule can never be installed.

use crate::types::{Bps, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Integer decay fraction for one EMA: `ema += (sample - ema) * num / den`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmaFraction {
    pub num: u32,
    pub den: u32,
}

impl EmaFraction {
    pub fn new(num: u32, den: u32) -> Result<Self, ConfigError> {
        if den == 0 || num == 0 || num > den {
            return Err(ConfigError::InvalidEmaFraction { num, den });
        }
        Ok(Self { num, den })
    }

    pub fn alpha(&self) -> Decimal {
        Decimal::from(self.num) / Decimal::from(self.den)
    }
}

// 7.1: the contract series. immutable-ish: EMA params may be retuned by an
// admin before expiry, everything else is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesConfig {
    // Human readable series name (e.g. "WTI-DEC26")
    pub symbol: String,
    // Expiry timestamp. trading and sampling stop here
    pub expiry: Timestamp,
    // Quote units per contract at index 1.0
    pub contract_size: Decimal,
    // Seed for both EMAs when the series opens
    pub initial_index_price: Price,
    // Fast EMA decay (hours-scale window)
    pub ema_fast: EmaFraction,
    // Slow EMA decay (weeks-scale window)
    pub ema_slow: EmaFraction,
    // index = min(ema_fast, ema_slow * cap_multiple_bps / 10_000)
    pub cap_multiple_bps: Bps,
    // Reject a mark sample deviating more than this from the last accepted
    // one. 0 disables the gate
    pub mark_gate_bps: Bps,
    // Trailing window retained in the TWAP buffer, seconds
    pub twap_window_secs: u64,
    // Hard cap on buffered samples
    pub twap_max_samples: usize,
}

impl SeriesConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        EmaFraction::new(self.ema_fast.num, self.ema_fast.den)?;
        EmaFraction::new(self.ema_slow.num, self.ema_slow.den)?;
        if self.contract_size <= Decimal::ZERO {
            return Err(ConfigError::InvalidContractSize(self.contract_size));
        }
        if self.cap_multiple_bps.value() < crate::types::BPS_DENOM {
            // a cap below 1x would pin the index under the slow EMA forever
            return Err(ConfigError::InvalidCapMultiple(self.cap_multiple_bps));
        }
        if self.twap_max_samples == 0 || self.twap_window_secs == 0 {
            return Err(ConfigError::InvalidTwapBounds);
        }
        Ok(())
    }
}

/// A reasonable default series expiring 30 days after the epoch the engine
/// clock starts from. Tests and the sim override what they care about.
impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            symbol: "SYN-FUT".to_string(),
            expiry: Timestamp::from_millis(30 * 24 * 3600 * 1000),
            contract_size: Decimal::ONE,
            initial_index_price: Price::new_unchecked(Decimal::ONE),
            ema_fast: EmaFraction { num: 1, den: 10 },
            ema_slow: EmaFraction { num: 1, den: 600 },
            cap_multiple_bps: Bps(12_000), // fast EMA capped at 1.2x slow
            mark_gate_bps: Bps(2_000),     // reject prints >20% from the last
            twap_window_secs: 300,
            twap_max_samples: 128,
        }
    }
}

// 7.2: tier schedule. parallel ascending arrays: once gross notional crosses
// thresholds[i], margin is at least im_bps[i]. step function, no
// interpolation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierSchedule {
    pub thresholds: Vec<Quote>,
    pub im_bps: Vec<Bps>,
}

impl TierSchedule {
    pub fn new(thresholds: Vec<Quote>, im_bps: Vec<Bps>) -> Result<Self, ConfigError> {
        let schedule = Self { thresholds, im_bps };
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thresholds.len() != self.im_bps.len() {
            return Err(ConfigError::TierArityMismatch {
                thresholds: self.thresholds.len(),
                rates: self.im_bps.len(),
            });
        }
        for pair in self.thresholds.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ConfigError::TierThresholdsNotAscending);
            }
        }
        for pair in self.im_bps.windows(2) {
            if pair[1] < pair[0] {
                return Err(ConfigError::TierRatesDecreasing);
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}

/** 7.3: margin settings. base IM/MM in bps plus the tier schedule. */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginConfig {
    // Floor initial margin, bps of gross notional
    pub initial_margin_bps: Bps,
    // Maintenance margin, bps of gross notional
    pub maintenance_margin_bps: Bps,
    // Liquidation targets IM + this buffer
    pub liquidation_buffer_bps: Bps,
    pub tiers: TierSchedule,
}

impl MarginConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maintenance_margin_bps > self.initial_margin_bps {
            return Err(ConfigError::MaintenanceAboveInitial {
                mm: self.maintenance_margin_bps,
                im: self.initial_margin_bps,
            });
        }
        self.tiers.validate()
    }
}

impl Default for MarginConfig {
    fn default() -> Self {
        Self {
            initial_margin_bps: Bps(1_000),      // 10%
            maintenance_margin_bps: Bps(500),    // 5%
            liquidation_buffer_bps: Bps(250),    // restore to IM + 2.5%
            tiers: TierSchedule {
                thresholds: vec![
                    Quote::new(dec!(100_000)),
                    Quote::new(dec!(500_000)),
                    Quote::new(dec!(2_000_000)),
                ],
                im_bps: vec![Bps(1_000), Bps(2_000), Bps(4_000)],
            },
        }
    }
}

/** 7.4: fee settings. taker bps plus how the post-rebate remainder and the
liquidation penalty are carved up. the maker rebate rate itself comes from
the staking/fee collaborator. */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    // Taker fee in basis points, before discounts
    pub taker_fee_bps: Bps,
    // Share of the post-rebate fee deposited into the PnL reserve
    pub reserve_share_bps: Bps,
    // Liquidation penalty on closed notional
    pub liquidation_fee_bps: Bps,
    // Penalty cut paid to the liquidating keeper
    pub keeper_share_bps: Bps,
    // Penalty cut routed to the treasury; remainder goes to the reserve
    pub treasury_share_bps: Bps,
}

impl FeeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keeper_share_bps.value() + self.treasury_share_bps.value()
            > crate::types::BPS_DENOM
        {
            return Err(ConfigError::PenaltySplitOverflow {
                keeper: self.keeper_share_bps,
                treasury: self.treasury_share_bps,
            });
        }
        if self.reserve_share_bps.value() > crate::types::BPS_DENOM {
            return Err(ConfigError::ReserveShareOverflow(self.reserve_share_bps));
        }
        Ok(())
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            taker_fee_bps: Bps(10),       // 0.1%
            reserve_share_bps: Bps(5_000), // half of the remainder
            liquidation_fee_bps: Bps(100), // 1% of closed notional
            keeper_share_bps: Bps(4_000),
            treasury_share_bps: Bps(2_000),
        }
    }
}

// 7.5: exposure caps. 0 = unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCaps {
    // Max gross notional per account
    pub account_notional_cap: Quote,
    // Max gross notional market-wide
    pub market_notional_cap: Quote,
    // Max share of total open interest one account may hold, bps
    pub oi_share_cap_bps: Bps,
}

impl Default for RiskCaps {
    fn default() -> Self {
        Self {
            account_notional_cap: Quote::ZERO,
            market_notional_cap: Quote::ZERO,
            oi_share_cap_bps: Bps(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("EMA fraction {num}/{den} out of range")]
    InvalidEmaFraction { num: u32, den: u32 },

    #[error("contract size {0} must be positive")]
    InvalidContractSize(Decimal),

    #[error("cap multiple {0} below 1x")]
    InvalidCapMultiple(Bps),

    #[error("TWAP buffer bounds must be non-zero")]
    InvalidTwapBounds,

    #[error("tier schedule arity mismatch: {thresholds} thresholds vs {rates} rates")]
    TierArityMismatch { thresholds: usize, rates: usize },

    #[error("tier thresholds must be strictly ascending")]
    TierThresholdsNotAscending,

    #[error("tier margin rates must be non-decreasing")]
    TierRatesDecreasing,

    #[error("maintenance margin {mm} above initial margin {im}")]
    MaintenanceAboveInitial { mm: Bps, im: Bps },

    #[error("penalty split overflows: keeper {keeper} + treasury {treasury}")]
    PenaltySplitOverflow { keeper: Bps, treasury: Bps },

    #[error("reserve share {0} above 100%")]
    ReserveShareOverflow(Bps),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        SeriesConfig::default().validate().unwrap();
        MarginConfig::default().validate().unwrap();
        FeeConfig::default().validate().unwrap();
    }

    #[test]
    fn tier_schedule_rejects_unsorted_thresholds() {
        let result = TierSchedule::new(
            vec![Quote::new(dec!(500)), Quote::new(dec!(100))],
            vec![Bps(100), Bps(200)],
        );
        assert_eq!(result.unwrap_err(), ConfigError::TierThresholdsNotAscending);
    }

    #[test]
    fn tier_schedule_rejects_decreasing_rates() {
        let result = TierSchedule::new(
            vec![Quote::new(dec!(100)), Quote::new(dec!(500))],
            vec![Bps(200), Bps(100)],
        );
        assert_eq!(result.unwrap_err(), ConfigError::TierRatesDecreasing);
    }

    #[test]
    fn tier_schedule_rejects_arity_mismatch() {
        let result = TierSchedule::new(vec![Quote::new(dec!(100))], vec![]);
        assert!(matches!(result, Err(ConfigError::TierArityMismatch { .. })));
    }

    #[test]
    fn ema_fraction_bounds() {
        assert!(EmaFraction::new(1, 10).is_ok());
        assert!(EmaFraction::new(0, 10).is_err());
        assert!(EmaFraction::new(11, 10).is_err());
        assert!(EmaFraction::new(1, 0).is_err());
    }

    #[test]
    fn mm_above_im_rejected() {
        let cfg = MarginConfig {
            initial_margin_bps: Bps(500),
            maintenance_margin_bps: Bps(600),
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MaintenanceAboveInitial { .. })
        ));
    }
}
