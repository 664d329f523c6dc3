// 2.0: matching engine boundary. the engine consumes fill plans and
// commits maker fills; price-time priority matching itself is an external
// collaborator. the in-memory book below is the reference implementation
// the tests and the sim run against.

use crate::types::{OrderId, Price, Timestamp, TraderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One planned fill against a resting maker order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedFill {
    pub order_id: OrderId,
    pub maker: TraderId,
    pub price: Price,
    pub qty: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestingOrder {
    pub id: OrderId,
    pub owner: TraderId,
    pub is_buy: bool,
    pub price: Price,
    pub total_qty: Decimal,
    pub filled_qty: Decimal,
    pub expire_ts: Timestamp,
    pub placed_at: Timestamp,
}

impl RestingOrder {
    pub fn remaining(&self) -> Decimal {
        self.total_qty - self.filled_qty
    }

    pub fn is_live(&self, now: Timestamp) -> bool {
        self.remaining() > Decimal::ZERO && now < self.expire_ts
    }
}

/// What the trading engine needs from a matching engine. A fill plan is a
/// pure read; `commit_maker_fill` applies one planned fill. The drain call
/// exists only for settlement.
pub trait MatchingEngine {
    fn compute_fill_plan(
        &self,
        taker: TraderId,
        is_buy: bool,
        limit_price: Option<Price>,
        qty: Decimal,
        now: Timestamp,
    ) -> Vec<PlannedFill>;

    fn commit_maker_fill(&mut self, order_id: OrderId, qty: Decimal, now: Timestamp);

    fn post_order(
        &mut self,
        owner: TraderId,
        is_buy: bool,
        price: Price,
        qty: Decimal,
        expire_ts: Timestamp,
        now: Timestamp,
    ) -> OrderId;

    fn cancel(&mut self, order_id: OrderId) -> Option<RestingOrder>;

    /// (filled, total) for a live order.
    fn order_progress(&self, order_id: OrderId) -> Option<(Decimal, Decimal)>;

    fn has_order(&self, order_id: OrderId) -> bool;

    fn owner_of(&self, order_id: OrderId) -> Option<TraderId>;

    /// Remove up to `max` resting orders, returning (id, owner, remaining).
    /// Settlement drains the whole book through repeated calls.
    fn drain_all_collect(&mut self, max: usize) -> Vec<(OrderId, TraderId, Decimal)>;
}

// 2.1: reference book. two price-time sorted vecs; fine for tests and the
// sim, not meant to carry production depth.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Book {
    bids: Vec<RestingOrder>,
    asks: Vec<RestingOrder>,
    next_order_id: u64,
}

impl Book {
    pub fn new() -> Self {
        Self {
            bids: Vec::new(),
            asks: Vec::new(),
            next_order_id: 1,
        }
    }

    fn side(&self, is_buy: bool) -> &Vec<RestingOrder> {
        if is_buy {
            &self.bids
        } else {
            &self.asks
        }
    }

    fn find(&self, order_id: OrderId) -> Option<&RestingOrder> {
        self.bids
            .iter()
            .chain(self.asks.iter())
            .find(|o| o.id == order_id)
    }

    fn crosses(is_buy: bool, maker_price: Price, limit: Option<Price>) -> bool {
        match limit {
            None => true,
            Some(limit) => {
                if is_buy {
                    maker_price <= limit
                } else {
                    maker_price >= limit
                }
            }
        }
    }

    fn resort(&mut self) {
        // bids best-first descending, asks ascending; ties by arrival
        self.bids.sort_by(|a, b| {
            b.price
                .cmp(&a.price)
                .then(a.placed_at.cmp(&b.placed_at))
                .then(a.id.cmp(&b.id))
        });
        self.asks.sort_by(|a, b| {
            a.price
                .cmp(&b.price)
                .then(a.placed_at.cmp(&b.placed_at))
                .then(a.id.cmp(&b.id))
        });
    }
}

impl MatchingEngine for Book {
    fn compute_fill_plan(
        &self,
        taker: TraderId,
        is_buy: bool,
        limit_price: Option<Price>,
        qty: Decimal,
        now: Timestamp,
    ) -> Vec<PlannedFill> {
        let mut plan = Vec::new();
        let mut remaining = qty;

        for order in self.side(!is_buy) {
            if remaining <= Decimal::ZERO {
                break;
            }
            if !order.is_live(now) || order.owner == taker {
                continue;
            }
            if !Self::crosses(is_buy, order.price, limit_price) {
                break;
            }
            let take = remaining.min(order.remaining());
            plan.push(PlannedFill {
                order_id: order.id,
                maker: order.owner,
                price: order.price,
                qty: take,
            });
            remaining -= take;
        }

        plan
    }

    fn commit_maker_fill(&mut self, order_id: OrderId, qty: Decimal, _now: Timestamp) {
        for side in [&mut self.bids, &mut self.asks] {
            if let Some(order) = side.iter_mut().find(|o| o.id == order_id) {
                order.filled_qty += qty;
                debug_assert!(order.filled_qty <= order.total_qty);
                if order.remaining() <= Decimal::ZERO {
                    side.retain(|o| o.id != order_id);
                }
                return;
            }
        }
    }

    fn post_order(
        &mut self,
        owner: TraderId,
        is_buy: bool,
        price: Price,
        qty: Decimal,
        expire_ts: Timestamp,
        now: Timestamp,
    ) -> OrderId {
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        let order = RestingOrder {
            id,
            owner,
            is_buy,
            price,
            total_qty: qty,
            filled_qty: Decimal::ZERO,
            expire_ts,
            placed_at: now,
        };
        if is_buy {
            self.bids.push(order);
        } else {
            self.asks.push(order);
        }
        self.resort();
        id
    }

    fn cancel(&mut self, order_id: OrderId) -> Option<RestingOrder> {
        for side in [&mut self.bids, &mut self.asks] {
            if let Some(pos) = side.iter().position(|o| o.id == order_id) {
                return Some(side.remove(pos));
            }
        }
        None
    }

    fn order_progress(&self, order_id: OrderId) -> Option<(Decimal, Decimal)> {
        self.find(order_id).map(|o| (o.filled_qty, o.total_qty))
    }

    fn has_order(&self, order_id: OrderId) -> bool {
        self.find(order_id).is_some()
    }

    fn owner_of(&self, order_id: OrderId) -> Option<TraderId> {
        self.find(order_id).map(|o| o.owner)
    }

    fn drain_all_collect(&mut self, max: usize) -> Vec<(OrderId, TraderId, Decimal)> {
        let mut out = Vec::new();
        while out.len() < max {
            let order = if !self.bids.is_empty() {
                self.bids.remove(0)
            } else if !self.asks.is_empty() {
                self.asks.remove(0)
            } else {
                break;
            };
            out.push((order.id, order.owner, order.remaining()));
        }
        out
    }
}
