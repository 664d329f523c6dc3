// 8.0.2: operation results and the engine error taxonomy.
//
// every error is fail-fast: the operation that raised it committed
// nothing. validation, margin, state, cap, and gate failures are distinct
// families so callers (and keeper bots) can react without string matching.

use crate::config::ConfigError;
use crate::index::IndexError;
use crate::liquidation::PenaltySplit;
use crate::market::CapBreach;
use crate::settlement::SettlementSource;
use crate::types::{OrderId, Price, Quote, Side, Timestamp, TraderId};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct TradeResult {
    pub filled_qty: Decimal,
    pub avg_fill_price: Option<Price>,
    pub taker_fee: Quote,
    pub realized_pnl: Quote,
    pub resting_order: Option<OrderId>,
}

#[derive(Debug, Clone)]
pub struct LiquidationOutcome {
    pub trader: TraderId,
    pub keeper: TraderId,
    pub side: Side,
    pub closed_qty: Decimal,
    pub close_price: Price,
    pub realized_pnl: Quote,
    pub penalty: PenaltySplit,
}

#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub price: Price,
    pub source: SettlementSource,
    pub drained_orders: usize,
    pub settled_at: Timestamp,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    // validation
    #[error("invalid quantity {0}")]
    InvalidQuantity(Decimal),

    #[error("invalid amount {0}")]
    InvalidAmount(Decimal),

    #[error("config rejected: {0}")]
    Config(#[from] ConfigError),

    // margin
    #[error("margin violation: required {required}, available {available}")]
    MarginViolation { required: Quote, available: Quote },

    #[error("insufficient collateral: requested {requested}, available {available}")]
    InsufficientCollateral { requested: Quote, available: Quote },

    // state
    #[error("market expired at {0}")]
    MarketExpired(Timestamp),

    #[error("market not expired yet (expiry {0})")]
    NotYetExpired(Timestamp),

    #[error("market is paused")]
    MarketPaused,

    #[error("market already settled")]
    AlreadySettled,

    #[error("market not settled")]
    NotSettled,

    #[error("unknown account {0:?}")]
    UnknownAccount(TraderId),

    #[error("unknown order {0:?}")]
    UnknownOrder(OrderId),

    #[error("order {order:?} not owned by {trader:?}")]
    NotOrderOwner { order: OrderId, trader: TraderId },

    #[error("{0:?} is not an admin")]
    Unauthorized(TraderId),

    #[error("account not liquidatable: equity {equity} >= maintenance {maintenance}")]
    NotLiquidatable { equity: Quote, maintenance: Quote },

    // caps
    #[error("cap exceeded: {0}")]
    Cap(#[from] CapBreach),

    // index gate
    #[error(transparent)]
    Gate(#[from] IndexError),
}
