//! Order placement: the taker flow.
//!
//! A trade resolves into a fill plan from the matching engine. Every
//! consequence (netting on both counterparties, PnL settlement against
//! the reserve, maker margin release, fees and rebates, the index sample,
//! caps and the taker margin check) is applied to staged copies first.
//! Only a fully validated trade commits; any error leaves no trace.

use super::core::{settle_realized, Engine};
use super::results::{EngineError, TradeResult};
use crate::account::{apply_fill, Account};
use crate::events::{
    EventPayload, FeeChargedEvent, OrderCanceledEvent, OrderFilledEvent, OrderPlacedEvent,
    PendingCreditEvent, PositionChangedEvent,
};
use crate::fees;
use crate::margin::{
    effective_im_bps, margin_requirement, required_margin, satisfies_initial_margin,
};
use crate::types::{OrderId, Price, Quote, Side, Timestamp, TraderId};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn place_order(
        &mut self,
        trader: TraderId,
        is_buy: bool,
        limit_price: Option<Price>,
        qty: Decimal,
        expire_ts: Option<Timestamp>,
        pay_in_reward_token: bool,
    ) -> Result<TradeResult, EngineError> {
        if qty <= Decimal::ZERO {
            return Err(EngineError::InvalidQuantity(qty));
        }
        self.require_live()?;

        let now = self.current_time;
        let contract_size = self.market.series.contract_size;
        let taker_side = Side::of_taker(is_buy);
        let index_at_fill = self.market.index_price();

        let plan = self
            .matching
            .compute_fill_plan(trader, is_buy, limit_price, qty, now);

        // -- stage -----------------------------------------------------------

        let mut staged: HashMap<TraderId, Account> = HashMap::new();
        staged.insert(
            trader,
            self.accounts
                .get(&trader)
                .cloned()
                .unwrap_or_else(|| Account::new(trader, now)),
        );
        for fill in &plan {
            staged.entry(fill.maker).or_insert_with(|| {
                self.accounts
                    .get(&fill.maker)
                    .cloned()
                    .expect("resting order implies an account")
            });
        }

        let mut staged_pool = self.market.rewards.clone();
        for account in staged.values_mut() {
            staged_pool.settle(account);
        }

        let mut staged_locks: HashMap<OrderId, Quote> = plan
            .iter()
            .map(|f| {
                (
                    f.order_id,
                    self.order_locks.get(&f.order_id).copied().unwrap_or(Quote::ZERO),
                )
            })
            .collect();
        let mut fully_filled: Vec<OrderId> = Vec::new();

        let mut oi_long_delta = Decimal::ZERO;
        let mut oi_short_delta = Decimal::ZERO;
        let mut realized_legs: Vec<(TraderId, Quote)> = Vec::new();
        let mut maker_notionals: Vec<(TraderId, Quote)> = Vec::new();
        let mut filled_qty = Decimal::ZERO;
        let mut filled_value = Decimal::ZERO;
        let mut taker_realized = Quote::ZERO;

        for fill in &plan {
            let maker_side = taker_side.opposite();

            let maker = staged.get_mut(&fill.maker).expect("staged above");
            let maker_outcome =
                apply_fill(maker, maker_side, fill.qty, fill.price, contract_size);
            push_leg(&mut realized_legs, fill.maker, maker_outcome.realized);

            // proportional release of the maker's resting-order margin,
            // at the index price at fill time
            let maker_notional_now = maker.gross_notional(index_at_fill, contract_size);
            let maker_bps = effective_im_bps(&self.market.margin, maker_notional_now);
            let release = required_margin(fill.qty, index_at_fill, contract_size, maker_bps);
            let lock = staged_locks.get_mut(&fill.order_id).expect("staged lock");
            let mut released = release.min(*lock);

            let (filled_so_far, total) = self
                .matching
                .order_progress(fill.order_id)
                .expect("planned order exists");
            if filled_so_far + fill.qty >= total {
                // order is done; return whatever lock remains
                released = *lock;
                fully_filled.push(fill.order_id);
            }
            *lock -= released;
            let released_capped = released.min(maker.locked_im);
            maker.locked_im -= released_capped;

            let taker = staged.get_mut(&trader).expect("staged above");
            let taker_outcome = apply_fill(taker, taker_side, fill.qty, fill.price, contract_size);
            push_leg(&mut realized_legs, trader, taker_outcome.realized);
            taker_realized += taker_outcome.realized;

            oi_long_delta += maker_outcome.long_delta() + taker_outcome.long_delta();
            oi_short_delta += maker_outcome.short_delta() + taker_outcome.short_delta();

            let fill_notional = Quote::new(fill.qty * fill.price.value() * contract_size);
            push_leg(&mut maker_notionals, fill.maker, fill_notional);
            filled_qty += fill.qty;
            filled_value += fill.qty * fill.price.value();
        }

        // -- pnl against the reserve ----------------------------------------

        let pnl = settle_realized(&mut staged, &realized_legs, self.reserve.available());

        // -- index sample ----------------------------------------------------

        let mut staged_index = self.market.index.clone();
        let vwap = if filled_qty > Decimal::ZERO {
            let vwap = Price::new_unchecked(filled_value / filled_qty);
            staged_index.record_sample(vwap, now, &self.market.series)?;
            Some(vwap)
        } else {
            None
        };
        let post_index = staged_index.index_price(self.market.series.cap_multiple_bps);

        // -- fees ------------------------------------------------------------

        let total_fill_notional = Quote::new(filled_value * contract_size);
        let effective_bps = self.fee_table.apply_discount(
            self.market.fees.taker_fee_bps,
            pay_in_reward_token,
            trader,
        );
        let breakdown = fees::breakdown(
            total_fill_notional,
            effective_bps,
            self.fee_table.maker_rebate_bps(),
            self.market.fees.reserve_share_bps,
            &maker_notionals,
        );

        {
            let taker = staged.get_mut(&trader).expect("staged above");
            if breakdown.taker_fee > taker.collateral {
                return Err(EngineError::InsufficientCollateral {
                    requested: breakdown.taker_fee,
                    available: taker.collateral,
                });
            }
            taker.collateral -= breakdown.taker_fee;
        }
        for (maker, rebate) in &breakdown.rebates {
            staged
                .get_mut(maker)
                .expect("staged above")
                .credit_collateral(*rebate);
        }

        // -- post the unfilled remainder ------------------------------------

        let remaining = qty - filled_qty;
        let mut new_lock = Quote::ZERO;
        let post_remainder = match (limit_price, remaining > Decimal::ZERO) {
            (Some(price), true) => {
                let taker = staged.get_mut(&trader).expect("staged above");
                let resting_bps = effective_im_bps(
                    &self.market.margin,
                    taker.gross_notional(post_index, contract_size),
                );
                new_lock = required_margin(remaining, price, contract_size, resting_bps);
                taker.locked_im += new_lock;
                Some(price)
            }
            _ => None,
        };

        // -- margin and caps -------------------------------------------------

        {
            let taker = staged.get(&trader).expect("staged above");
            let requirement =
                margin_requirement(taker.gross_qty(), post_index, contract_size, &self.market.margin);
            let equity = taker.equity_signed(post_index, contract_size);
            if !satisfies_initial_margin(equity, taker.locked_im, &requirement) {
                return Err(EngineError::MarginViolation {
                    required: requirement.initial + taker.locked_im,
                    available: equity,
                });
            }

            let new_oi = self.market.total_open_interest() + oi_long_delta + oi_short_delta;
            let market_notional = Quote::new(new_oi * post_index.value() * contract_size);
            self.market.check_caps(
                taker.gross_qty(),
                taker.gross_notional(post_index, contract_size),
                new_oi,
                market_notional,
            )?;
        }

        // -- refresh reward eligibility -------------------------------------

        for account in staged.values_mut() {
            let requirement = margin_requirement(
                account.gross_qty(),
                post_index,
                contract_size,
                &self.market.margin,
            );
            let eligible = account
                .equity(post_index, contract_size)
                .min(requirement.initial);
            staged_pool.refresh(account, eligible);
        }

        // -- commit ----------------------------------------------------------

        for fill in &plan {
            self.matching.commit_maker_fill(fill.order_id, fill.qty, now);
        }
        for order_id in &fully_filled {
            self.order_locks.remove(order_id);
        }
        for (order_id, lock) in &staged_locks {
            if self.order_locks.contains_key(order_id) {
                self.order_locks.insert(*order_id, *lock);
            }
        }

        let resting_order = post_remainder.map(|price| {
            let expire = expire_ts.unwrap_or(self.market.series.expiry);
            let id = self
                .matching
                .post_order(trader, is_buy, price, remaining, expire, now);
            self.order_locks.insert(id, new_lock);
            id
        });

        for (id, account) in staged {
            self.accounts.insert(id, account);
        }
        self.market.index = staged_index;
        self.market.rewards = staged_pool;
        self.market.apply_oi_delta(oi_long_delta, oi_short_delta);

        self.reserve.deposit(pnl.reserve_collected);
        let paid = self.reserve.withdraw(pnl.reserve_paid);
        debug_assert!(paid == pnl.reserve_paid);
        self.reserve.deposit(breakdown.reserve_cut);
        self.reserve.route_fee(breakdown.general_cut);

        // -- events ----------------------------------------------------------

        for fill in &plan {
            self.emit_event(EventPayload::OrderFilled(OrderFilledEvent {
                order_id: fill.order_id,
                maker: fill.maker,
                taker: trader,
                price: fill.price,
                qty: fill.qty,
            }));
        }
        let mut touched: Vec<TraderId> = vec![trader];
        touched.extend(maker_notionals.iter().map(|(m, _)| *m));
        for id in touched {
            let account = &self.accounts[&id];
            let realized = realized_legs
                .iter()
                .filter(|(t, _)| *t == id)
                .map(|(_, r)| *r)
                .sum();
            self.emit_event(EventPayload::PositionChanged(PositionChangedEvent {
                trader: id,
                long_qty: account.long_qty,
                short_qty: account.short_qty,
                avg_long_price: account.avg_long_price,
                avg_short_price: account.avg_short_price,
                realized_pnl: realized,
            }));
        }
        if !breakdown.taker_fee.is_zero() {
            self.emit_event(EventPayload::FeeCharged(FeeChargedEvent {
                trader,
                fee: breakdown.taker_fee,
                rebate_pool: breakdown.rebate_pool,
                reserve_cut: breakdown.reserve_cut,
                general_cut: breakdown.general_cut,
            }));
        }
        for (credited, amount, outstanding) in &pnl.credits_accrued {
            self.emit_event(EventPayload::PendingCreditAccrued(PendingCreditEvent {
                trader: *credited,
                amount: *amount,
                outstanding: *outstanding,
            }));
        }
        if let Some(id) = resting_order {
            self.emit_event(EventPayload::OrderPlaced(OrderPlacedEvent {
                trader,
                order_id: id,
                is_buy,
                price: post_remainder.expect("resting implies limit"),
                qty: remaining,
                locked_im: new_lock,
            }));
        }

        debug!(
            trader = trader.0,
            filled = %filled_qty,
            fee = %breakdown.taker_fee,
            "order executed"
        );

        Ok(TradeResult {
            filled_qty,
            avg_fill_price: vwap,
            taker_fee: breakdown.taker_fee,
            realized_pnl: taker_realized,
            resting_order,
        })
    }

    /// Cancel a resting order, releasing its remaining locked margin.
    /// Allowed while paused and after expiry (until settlement drains the
    /// book) so traders can always step back.
    pub fn cancel_order(&mut self, trader: TraderId, order_id: OrderId) -> Result<Quote, EngineError> {
        if self.market.is_settled() {
            return Err(EngineError::AlreadySettled);
        }
        let owner = self
            .matching
            .owner_of(order_id)
            .ok_or(EngineError::UnknownOrder(order_id))?;
        if owner != trader {
            return Err(EngineError::NotOrderOwner {
                order: order_id,
                trader,
            });
        }

        self.matching.cancel(order_id).expect("owner_of checked");
        let release = self.order_locks.remove(&order_id).unwrap_or(Quote::ZERO);

        let account = self
            .accounts
            .get_mut(&trader)
            .ok_or(EngineError::UnknownAccount(trader))?;
        self.market.rewards.settle(account);
        let released = release.min(account.locked_im);
        account.locked_im -= released;
        let eligible = super::core::eligibility(account, &self.market);
        self.market.rewards.refresh(
            self.accounts.get_mut(&trader).expect("checked above"),
            eligible,
        );

        self.emit_event(EventPayload::OrderCanceled(OrderCanceledEvent {
            trader,
            order_id,
            released_im: released,
        }));
        Ok(released)
    }
}

/// Accumulate into an order-preserving (trader, amount) list.
fn push_leg(legs: &mut Vec<(TraderId, Quote)>, trader: TraderId, amount: Quote) {
    if let Some((_, existing)) = legs.iter_mut().find(|(t, _)| *t == trader) {
        *existing += amount;
    } else {
        legs.push((trader, amount));
    }
}
