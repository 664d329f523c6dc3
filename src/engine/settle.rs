//! Expiry settlement.
//!
//! `snapshot_settlement` runs exactly once at or after expiry: it fixes
//! the settlement price, drains every resting order, and releases maker
//! margin at that price. Afterwards each trader flattens itself through
//! `settle_self`, which realizes PnL through the same netting path trades
//! use.

use super::core::{settle_realized, Engine};
use super::results::{EngineError, SettlementOutcome};
use crate::account::apply_fill;
use crate::events::{EventPayload, PendingCreditEvent, PositionChangedEvent, SettledEvent};
use crate::margin::{effective_im_bps, required_margin};
use crate::settlement::resolve_settlement_price;
use crate::types::{Quote, Side, TraderId};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::info;

impl Engine {
    /// One-shot settlement snapshot. A second call fails.
    pub fn snapshot_settlement(&mut self) -> Result<SettlementOutcome, EngineError> {
        if self.market.is_settled() {
            return Err(EngineError::AlreadySettled);
        }
        if !self.market.is_expired(self.current_time) {
            return Err(EngineError::NotYetExpired(self.market.series.expiry));
        }

        let (price, source) = resolve_settlement_price(&self.market.index, &self.market.series);
        let contract_size = self.market.series.contract_size;

        // drain the book; release each maker's lock at the settlement price
        let mut drained = 0usize;
        loop {
            let batch = self.matching.drain_all_collect(self.config.drain_batch);
            if batch.is_empty() {
                break;
            }
            for (order_id, owner, remaining) in batch {
                drained += 1;
                let lock = self.order_locks.remove(&order_id).unwrap_or(Quote::ZERO);
                let Some(account) = self.accounts.get_mut(&owner) else {
                    continue;
                };
                self.market.rewards.settle(account);
                let owner_notional = account.gross_notional(price, contract_size);
                let bps = effective_im_bps(&self.market.margin, owner_notional);
                let release = required_margin(remaining, price, contract_size, bps)
                    .min(lock)
                    .min(account.locked_im);
                account.locked_im -= release;
                let eligible = super::core::eligibility(account, &self.market);
                self.market.rewards.refresh(
                    self.accounts.get_mut(&owner).expect("present above"),
                    eligible,
                );
            }
        }

        self.market.settlement.price = Some(price);
        self.market.settlement.settled_at = Some(self.current_time);

        info!(price = %price, ?source, drained, "market settled");
        self.emit_event(EventPayload::Settled(SettledEvent {
            price,
            source,
            drained_orders: drained,
        }));

        Ok(SettlementOutcome {
            price,
            source,
            drained_orders: drained,
            settled_at: self.current_time,
        })
    }

    /// Flatten one account at the settlement price. Valid only after the
    /// snapshot; realizes PnL through the standard reserve path and frees
    /// any residual locked margin.
    pub fn settle_self(&mut self, trader: TraderId) -> Result<Quote, EngineError> {
        let price = self
            .market
            .settlement
            .price
            .ok_or(EngineError::NotSettled)?;
        if !self.accounts.contains_key(&trader) {
            return Err(EngineError::UnknownAccount(trader));
        }

        let contract_size = self.market.series.contract_size;
        let mut staged: HashMap<TraderId, _> = HashMap::new();
        staged.insert(trader, self.accounts[&trader].clone());

        let mut staged_pool = self.market.rewards.clone();
        staged_pool.settle(staged.get_mut(&trader).expect("staged"));

        let (realized, long_delta, short_delta) = {
            let account = staged.get_mut(&trader).expect("staged");
            let mut realized = Quote::ZERO;
            let mut long_delta = Decimal::ZERO;
            let mut short_delta = Decimal::ZERO;

            let open_long = account.long_qty;
            if open_long > Decimal::ZERO {
                let out = apply_fill(account, Side::Short, open_long, price, contract_size);
                realized += out.realized;
                long_delta += out.long_delta();
                short_delta += out.short_delta();
            }
            let open_short = account.short_qty;
            if open_short > Decimal::ZERO {
                let out = apply_fill(account, Side::Long, open_short, price, contract_size);
                realized += out.realized;
                long_delta += out.long_delta();
                short_delta += out.short_delta();
            }
            // the book is drained; nothing backs a leftover lock
            account.locked_im = Quote::ZERO;
            (realized, long_delta, short_delta)
        };

        let legs = vec![(trader, realized)];
        let pnl = settle_realized(&mut staged, &legs, self.reserve.available());

        // flat account: eligibility goes to zero
        staged_pool.refresh(staged.get_mut(&trader).expect("staged"), Quote::ZERO);

        let account = staged.remove(&trader).expect("staged");
        self.accounts.insert(trader, account);
        self.market.rewards = staged_pool;
        self.market.apply_oi_delta(long_delta, short_delta);
        self.reserve.deposit(pnl.reserve_collected);
        let paid = self.reserve.withdraw(pnl.reserve_paid);
        debug_assert!(paid == pnl.reserve_paid);

        let account = &self.accounts[&trader];
        self.emit_event(EventPayload::PositionChanged(PositionChangedEvent {
            trader,
            long_qty: account.long_qty,
            short_qty: account.short_qty,
            avg_long_price: account.avg_long_price,
            avg_short_price: account.avg_short_price,
            realized_pnl: realized,
        }));
        for (credited, amount, outstanding) in &pnl.credits_accrued {
            self.emit_event(EventPayload::PendingCreditAccrued(PendingCreditEvent {
                trader: *credited,
                amount: *amount,
                outstanding: *outstanding,
            }));
        }

        Ok(realized)
    }
}
