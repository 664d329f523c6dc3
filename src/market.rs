//! Market aggregate state.
//!
//! One value owns everything that changes as the series trades: open
//! interest totals, the synthetic index, the reward pool, and the
//! write-once settlement record. The engine mutates it as a unit per
//! operation; lifecycle gating (live, expired, settled) lives here.

use crate::config::{FeeConfig, MarginConfig, RiskCaps, SeriesConfig};
use crate::index::IndexState;
use crate::rewards::RewardPool;
use crate::settlement::SettlementState;
use crate::types::{Price, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketState {
    pub series: SeriesConfig,
    pub margin: MarginConfig,
    pub fees: FeeConfig,
    pub caps: RiskCaps,
    /// Admin halt. Blocks trading, not settlement or claims.
    pub paused: bool,
    /// Sum of long_qty / short_qty over all accounts. Kept in lockstep with
    /// the per-account ledgers by the engine.
    pub oi_long: Decimal,
    pub oi_short: Decimal,
    pub index: IndexState,
    pub rewards: RewardPool,
    pub settlement: SettlementState,
    pub created_at: Timestamp,
}

impl MarketState {
    pub fn new(
        series: SeriesConfig,
        margin: MarginConfig,
        fees: FeeConfig,
        caps: RiskCaps,
        now: Timestamp,
    ) -> Self {
        let index = IndexState::new(series.initial_index_price);
        Self {
            series,
            margin,
            fees,
            caps,
            paused: false,
            oi_long: Decimal::ZERO,
            oi_short: Decimal::ZERO,
            index,
            rewards: RewardPool::default(),
            settlement: SettlementState::default(),
            created_at: now,
        }
    }

    pub fn index_price(&self) -> Price {
        self.index.index_price(self.series.cap_multiple_bps)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.series.expiry
    }

    pub fn is_settled(&self) -> bool {
        self.settlement.is_settled()
    }

    pub fn total_open_interest(&self) -> Decimal {
        self.oi_long + self.oi_short
    }

    pub fn total_notional(&self, contract_size: Decimal) -> Quote {
        Quote::new(self.total_open_interest() * self.index_price().value() * contract_size)
    }

    pub fn apply_oi_delta(&mut self, long_delta: Decimal, short_delta: Decimal) {
        self.oi_long += long_delta;
        self.oi_short += short_delta;
        debug_assert!(self.oi_long >= Decimal::ZERO && self.oi_short >= Decimal::ZERO);
    }

    /// Exposure cap check for an account's post-trade book. 0 = unlimited.
    pub fn check_caps(
        &self,
        account_gross_qty: Decimal,
        account_notional: Quote,
        market_oi: Decimal,
        market_notional: Quote,
    ) -> Result<(), CapBreach> {
        let caps = &self.caps;
        if !caps.account_notional_cap.is_zero() && account_notional > caps.account_notional_cap {
            return Err(CapBreach::AccountNotional {
                notional: account_notional,
                cap: caps.account_notional_cap,
            });
        }
        if !caps.market_notional_cap.is_zero() && market_notional > caps.market_notional_cap {
            return Err(CapBreach::MarketNotional {
                notional: market_notional,
                cap: caps.market_notional_cap,
            });
        }
        if caps.oi_share_cap_bps.value() > 0 && market_oi > Decimal::ZERO {
            let allowed = caps.oi_share_cap_bps.of(market_oi);
            if account_gross_qty > allowed {
                return Err(CapBreach::OiShare {
                    qty: account_gross_qty,
                    allowed,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapBreach {
    #[error("account notional {notional} exceeds cap {cap}")]
    AccountNotional { notional: Quote, cap: Quote },

    #[error("market notional {notional} exceeds cap {cap}")]
    MarketNotional { notional: Quote, cap: Quote },

    #[error("account open interest {qty} exceeds allowed share {allowed}")]
    OiShare { qty: Decimal, allowed: Decimal },
}
