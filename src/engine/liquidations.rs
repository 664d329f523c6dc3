//! Liquidation detection and execution.
//!
//! Ordering is load-bearing: strip reward eligibility, then check the
//! maintenance requirement, then size the close. An under-margined account
//! must not keep accruing rewards, and its eligibility only returns on its
//! next own operation.

use super::core::{settle_realized, Engine};
use super::results::{EngineError, LiquidationOutcome};
use crate::account::{apply_fill, Account};
use crate::events::{EventPayload, LiquidatedEvent, PendingCreditEvent, PositionChangedEvent};
use crate::liquidation::{plan_close, split_penalty};
use crate::margin::margin_requirement;
use crate::types::{Quote, TraderId};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, warn};

impl Engine {
    /// Scan for accounts below maintenance margin at the current index.
    /// Read-only; keepers call `liquidate` on what this returns.
    pub fn liquidatable_accounts(&self) -> Vec<TraderId> {
        let index = self.market.index_price();
        let contract_size = self.market.series.contract_size;
        let mut out = Vec::new();
        for (trader, account) in &self.accounts {
            if account.is_flat() {
                continue;
            }
            let requirement =
                margin_requirement(account.gross_qty(), index, contract_size, &self.market.margin);
            if account.equity(index, contract_size) < requirement.maintenance {
                out.push(*trader);
            }
        }
        out.sort();
        out
    }

    pub fn liquidate(
        &mut self,
        keeper: TraderId,
        victim: TraderId,
        max_qty: Decimal,
    ) -> Result<LiquidationOutcome, EngineError> {
        if max_qty <= Decimal::ZERO {
            return Err(EngineError::InvalidQuantity(max_qty));
        }
        if self.market.is_settled() {
            return Err(EngineError::AlreadySettled);
        }
        if self.market.is_expired(self.current_time) {
            // past expiry the book is frozen; settlement handles closure
            return Err(EngineError::MarketExpired(self.market.series.expiry));
        }
        if !self.accounts.contains_key(&victim) {
            return Err(EngineError::UnknownAccount(victim));
        }

        let now = self.current_time;
        let index = self.market.index_price();
        let contract_size = self.market.series.contract_size;

        // -- stage -----------------------------------------------------------

        let mut staged: HashMap<TraderId, Account> = HashMap::new();
        staged.insert(victim, self.accounts[&victim].clone());
        staged.insert(
            keeper,
            self.accounts
                .get(&keeper)
                .cloned()
                .unwrap_or_else(|| Account::new(keeper, now)),
        );

        let mut staged_pool = self.market.rewards.clone();
        staged_pool.settle(staged.get_mut(&keeper).expect("staged"));

        // eligibility strip comes before any sizing math
        staged_pool.strip(staged.get_mut(&victim).expect("staged"));

        let (equity, requirement) = {
            let account = &staged[&victim];
            let requirement =
                margin_requirement(account.gross_qty(), index, contract_size, &self.market.margin);
            (account.equity(index, contract_size), requirement)
        };
        if equity >= requirement.maintenance {
            return Err(EngineError::NotLiquidatable {
                equity,
                maintenance: requirement.maintenance,
            });
        }

        let plan = plan_close(
            &staged[&victim],
            index,
            contract_size,
            &self.market.margin,
            equity,
            max_qty,
        )
        .ok_or(EngineError::NotLiquidatable {
            equity,
            maintenance: requirement.maintenance,
        })?;

        // -- close through the netting path ---------------------------------

        let closing_side = plan.side.opposite();
        let outcome = {
            let account = staged.get_mut(&victim).expect("staged");
            apply_fill(account, closing_side, plan.qty, index, contract_size)
        };
        let legs = vec![(victim, outcome.realized)];
        let pnl = settle_realized(&mut staged, &legs, self.reserve.available());

        // -- penalty ---------------------------------------------------------

        let closed_notional = plan.qty * index.value() * contract_size;
        let penalty_due = Quote::new(self.market.fees.liquidation_fee_bps.of(closed_notional));
        let penalty_charged = {
            let account = staged.get_mut(&victim).expect("staged");
            account.debit_collateral_capped(penalty_due)
        };
        let split = split_penalty(penalty_charged, &self.market.fees);
        staged
            .get_mut(&keeper)
            .expect("staged")
            .credit_collateral(split.keeper);

        // keeper's eligibility moves with its new balance; the victim stays
        // stripped until its next own operation
        if keeper != victim {
            let keeper_account = staged.get_mut(&keeper).expect("staged");
            let req = margin_requirement(
                keeper_account.gross_qty(),
                index,
                contract_size,
                &self.market.margin,
            );
            let eligible = keeper_account.equity(index, contract_size).min(req.initial);
            staged_pool.refresh(keeper_account, eligible);
        }

        // -- commit ----------------------------------------------------------

        for (id, account) in staged {
            self.accounts.insert(id, account);
        }
        self.market.rewards = staged_pool;
        self.market
            .apply_oi_delta(outcome.long_delta(), outcome.short_delta());

        self.reserve.deposit(pnl.reserve_collected);
        let paid = self.reserve.withdraw(pnl.reserve_paid);
        debug_assert!(paid == pnl.reserve_paid);
        self.reserve.deposit(split.reserve);
        self.treasury += split.treasury;

        let account = &self.accounts[&victim];
        self.emit_event(EventPayload::PositionChanged(PositionChangedEvent {
            trader: victim,
            long_qty: account.long_qty,
            short_qty: account.short_qty,
            avg_long_price: account.avg_long_price,
            avg_short_price: account.avg_short_price,
            realized_pnl: outcome.realized,
        }));
        for (credited, amount, outstanding) in &pnl.credits_accrued {
            self.emit_event(EventPayload::PendingCreditAccrued(PendingCreditEvent {
                trader: *credited,
                amount: *amount,
                outstanding: *outstanding,
            }));
        }
        self.emit_event(EventPayload::Liquidated(LiquidatedEvent {
            trader: victim,
            keeper,
            side: plan.side,
            closed_qty: plan.qty,
            close_price: index,
            penalty: split.total,
            keeper_cut: split.keeper,
        }));

        if penalty_charged < penalty_due {
            warn!(
                victim = victim.0,
                due = %penalty_due,
                charged = %penalty_charged,
                "liquidation penalty capped by remaining collateral"
            );
        }
        debug!(
            victim = victim.0,
            keeper = keeper.0,
            qty = %plan.qty,
            "liquidated"
        );

        Ok(LiquidationOutcome {
            trader: victim,
            keeper,
            side: plan.side,
            closed_qty: plan.qty,
            close_price: index,
            realized_pnl: outcome.realized,
            penalty: split,
        })
    }
}
