// 11.0: every committed state change produces an event. consumed by
// indexers and keeper bots, never read back by the engine itself.

use crate::settlement::SettlementSource;
use crate::types::{OrderId, Price, Quote, Side, Timestamp, TraderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    MarketInitialized(MarketInitializedEvent),

    // collateral
    CollateralDeposited(CollateralEvent),
    CollateralWithdrawn(CollateralEvent),

    // trading
    OrderPlaced(OrderPlacedEvent),
    OrderCanceled(OrderCanceledEvent),
    OrderFilled(OrderFilledEvent),
    PositionChanged(PositionChangedEvent),
    FeeCharged(FeeChargedEvent),

    // risk
    Liquidated(LiquidatedEvent),

    // settlement
    Settled(SettledEvent),

    // reserve shortfall receivables
    PendingCreditAccrued(PendingCreditEvent),
    PendingCreditPaid(PendingCreditEvent),

    // rewards
    RewardDeposited(RewardDepositedEvent),
    RewardClaimed(RewardClaimedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInitializedEvent {
    pub symbol: String,
    pub expiry: Timestamp,
    pub contract_size: Decimal,
    pub initial_index_price: Price,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralEvent {
    pub trader: TraderId,
    pub amount: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedEvent {
    pub trader: TraderId,
    pub order_id: OrderId,
    pub is_buy: bool,
    pub price: Price,
    pub qty: Decimal,
    pub locked_im: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCanceledEvent {
    pub trader: TraderId,
    pub order_id: OrderId,
    pub released_im: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFilledEvent {
    pub order_id: OrderId,
    pub maker: TraderId,
    pub taker: TraderId,
    pub price: Price,
    pub qty: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionChangedEvent {
    pub trader: TraderId,
    pub long_qty: Decimal,
    pub short_qty: Decimal,
    pub avg_long_price: Decimal,
    pub avg_short_price: Decimal,
    pub realized_pnl: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeChargedEvent {
    pub trader: TraderId,
    pub fee: Quote,
    pub rebate_pool: Quote,
    pub reserve_cut: Quote,
    pub general_cut: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidatedEvent {
    pub trader: TraderId,
    pub keeper: TraderId,
    pub side: Side,
    pub closed_qty: Decimal,
    pub close_price: Price,
    pub penalty: Quote,
    pub keeper_cut: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettledEvent {
    pub price: Price,
    pub source: SettlementSource,
    pub drained_orders: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCreditEvent {
    pub trader: TraderId,
    pub amount: Quote,
    pub outstanding: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardDepositedEvent {
    pub amount: Quote,
    pub total_eligible: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardClaimedEvent {
    pub trader: TraderId,
    pub amount: Quote,
}
