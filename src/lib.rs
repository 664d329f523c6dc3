// expiry-futures: cash-settled expiry futures engine.
// no external price oracle: the index is a dual EMA of the market's own
// matched trade prints, capped against runaway fast-EMA divergence.
// all computation is deterministic with no I/O; one logical writer per
// market, every operation commits fully or not at all.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: TraderId, OrderId, Side, Price, Quote, Bps
//   2.x  matching.rs: matching-engine boundary + reference price-time book
//   3.x  margin.rs: tiered IM/MM requirements, step-function tiers
//   6.x  liquidation.rs: close sizing, larger-side-first, penalty split
//   7.x  config.rs: series, margin, fee, cap settings; schedule validation
//   8.x  engine/: the single writer: orders, liquidations, settlement
//   9.x  settlement.rs: LVP / trailing-TWAP / index price resolution
//   10.x account.rs: ledger + reduce-then-add netting
//   11.x events.rs: domain events for indexers and keeper bots
//   12.x rewards.rs: O(1) pro-rata reward accumulator (1e18 scale)
//   13.x index.rs: dual-EMA synthetic index, gate, LVP, TWAP buffer

// core market modules
pub mod account;
pub mod config;
pub mod engine;
pub mod events;
pub mod fees;
pub mod index;
pub mod liquidation;
pub mod margin;
pub mod market;
pub mod rewards;
pub mod settlement;
pub mod types;

// collaborator boundaries with in-memory reference implementations
pub mod admin;
pub mod matching;
pub mod reserve;
pub mod staking;

// re exports for convenience
pub use account::{apply_fill, Account, FillOutcome};
pub use admin::{AdminRegistry, AdminSet};
pub use config::{
    ConfigError, EmaFraction, FeeConfig, MarginConfig, RiskCaps, SeriesConfig, TierSchedule,
};
pub use engine::{
    Engine, EngineConfig, EngineError, LiquidationOutcome, MarketParams, SettlementOutcome,
    TradeResult,
};
pub use events::{Event, EventId, EventPayload};
pub use fees::FeeBreakdown;
pub use index::{ema_step, IndexError, IndexState, LastValidPrint};
pub use liquidation::{larger_side, plan_close, split_penalty, ClosePlan, PenaltySplit};
pub use margin::{
    effective_im_bps, margin_requirement, per_contract_margin, required_margin, tier_bps,
    MarginRequirement,
};
pub use market::{CapBreach, MarketState};
pub use matching::{Book, MatchingEngine, PlannedFill, RestingOrder};
pub use reserve::{InMemoryReserve, PnlReserve};
pub use rewards::{RewardPool, ACC_SCALE};
pub use settlement::{
    resolve_settlement_price, trailing_twap, SettlementSource, SettlementState,
    SETTLEMENT_TWAP_WINDOW_SECS,
};
pub use staking::{FeeDiscount, StaticFeeTable};
pub use types::{Bps, OrderId, Price, Quote, Side, Timestamp, TraderId, BPS_DENOM};
