// 8.0 engine/core.rs: the single writer. owns the market aggregate, every
// account, and the collaborator boundaries; every public operation runs
// against a consistent snapshot and commits all-or-nothing. callers are
// expected to serialize submissions (one logical writer per market).

use super::config::EngineConfig;
use super::results::EngineError;
use crate::account::Account;
use crate::admin::{AdminRegistry, AdminSet};
use crate::config::{EmaFraction, FeeConfig, MarginConfig, RiskCaps, SeriesConfig, TierSchedule};
use crate::events::{
    CollateralEvent, Event, EventId, EventPayload, MarketInitializedEvent, PendingCreditEvent,
    RewardClaimedEvent, RewardDepositedEvent,
};
use crate::margin::margin_requirement;
use crate::market::MarketState;
use crate::matching::{Book, MatchingEngine};
use crate::reserve::{InMemoryReserve, PnlReserve};
use crate::staking::{FeeDiscount, StaticFeeTable};
use crate::types::{Bps, OrderId, Price, Quote, Timestamp, TraderId};
use std::collections::HashMap;
use tracing::debug;

/// Everything needed to open a series.
#[derive(Debug, Clone, Default)]
pub struct MarketParams {
    pub series: SeriesConfig,
    pub margin: MarginConfig,
    pub fees: FeeConfig,
    pub caps: RiskCaps,
}

pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) market: MarketState,
    pub(super) accounts: HashMap<TraderId, Account>,
    pub(super) matching: Box<dyn MatchingEngine>,
    pub(super) reserve: Box<dyn PnlReserve>,
    pub(super) fee_table: Box<dyn FeeDiscount>,
    pub(super) admin: Box<dyn AdminRegistry>,
    /// Initial margin reserved per resting order; mirrored in the owner's
    /// aggregate `locked_im`.
    pub(super) order_locks: HashMap<OrderId, Quote>,
    pub(super) treasury: Quote,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) current_time: Timestamp,
}

impl Engine {
    /// Open a market. Fails fast on any invalid parameter; markets are
    /// created before expiry, once.
    pub fn new(params: MarketParams, admins: AdminSet, now: Timestamp) -> Result<Self, EngineError> {
        params.series.validate()?;
        params.margin.validate()?;
        params.fees.validate()?;
        if now >= params.series.expiry {
            return Err(EngineError::MarketExpired(params.series.expiry));
        }

        let market = MarketState::new(
            params.series,
            params.margin,
            params.fees,
            params.caps,
            now,
        );

        let mut engine = Self {
            config: EngineConfig::default(),
            market,
            accounts: HashMap::new(),
            matching: Box::new(Book::new()),
            reserve: Box::new(InMemoryReserve::default()),
            fee_table: Box::new(StaticFeeTable::default()),
            admin: Box::new(admins),
            order_locks: HashMap::new(),
            treasury: Quote::ZERO,
            events: Vec::new(),
            next_event_id: 1,
            current_time: now,
        };

        let series = &engine.market.series;
        let init = MarketInitializedEvent {
            symbol: series.symbol.clone(),
            expiry: series.expiry,
            contract_size: series.contract_size,
            initial_index_price: series.initial_index_price,
        };
        engine.emit_event(EventPayload::MarketInitialized(init));
        Ok(engine)
    }

    pub fn with_matching(mut self, matching: impl MatchingEngine + 'static) -> Self {
        self.matching = Box::new(matching);
        self
    }

    pub fn with_reserve(mut self, reserve: impl PnlReserve + 'static) -> Self {
        self.reserve = Box::new(reserve);
        self
    }

    pub fn with_fee_table(mut self, table: impl FeeDiscount + 'static) -> Self {
        self.fee_table = Box::new(table);
        self
    }

    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    // -- clock --------------------------------------------------------------

    pub fn set_time(&mut self, now: Timestamp) {
        self.current_time = now;
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = Timestamp::from_millis(self.current_time.as_millis() + millis);
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    // -- read side ----------------------------------------------------------

    pub fn market(&self) -> &MarketState {
        &self.market
    }

    pub fn index_price(&self) -> Price {
        self.market.index_price()
    }

    pub fn account(&self, trader: TraderId) -> Option<&Account> {
        self.accounts.get(&trader)
    }

    pub fn accounts_iter(&self) -> impl Iterator<Item = (&TraderId, &Account)> {
        self.accounts.iter()
    }

    pub fn treasury_balance(&self) -> Quote {
        self.treasury
    }

    pub fn reserve_available(&self) -> Quote {
        self.reserve.available()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    // -- collateral ---------------------------------------------------------

    pub fn deposit(&mut self, trader: TraderId, amount: Quote) -> Result<(), EngineError> {
        if amount.is_negative() || amount.is_zero() {
            return Err(EngineError::InvalidAmount(amount.value()));
        }
        if self.market.is_settled() {
            return Err(EngineError::AlreadySettled);
        }

        let now = self.current_time;
        let account = self
            .accounts
            .entry(trader)
            .or_insert_with(|| Account::new(trader, now));
        self.market.rewards.settle(account);
        account.credit_collateral(amount);
        let new_balance = account.collateral;
        let eligible = eligibility(account, &self.market);
        self.market
            .rewards
            .refresh(self.accounts.get_mut(&trader).expect("just inserted"), eligible);

        debug!(trader = trader.0, amount = %amount, "collateral deposited");
        self.emit_event(EventPayload::CollateralDeposited(CollateralEvent {
            trader,
            amount,
            new_balance,
        }));
        Ok(())
    }

    /// Withdrawal is clamped: what remains must still cover locked margin
    /// and the position's initial requirement, and available never goes
    /// below zero.
    pub fn withdraw(&mut self, trader: TraderId, amount: Quote) -> Result<(), EngineError> {
        if amount.is_negative() || amount.is_zero() {
            return Err(EngineError::InvalidAmount(amount.value()));
        }
        let available = self.withdrawable(trader)?;
        if amount > available {
            return Err(EngineError::InsufficientCollateral {
                requested: amount,
                available,
            });
        }

        let account = self.accounts.get_mut(&trader).expect("checked above");
        self.market.rewards.settle(account);
        account.collateral -= amount;
        let new_balance = account.collateral;
        let eligible = eligibility(account, &self.market);
        self.market.rewards.refresh(
            self.accounts.get_mut(&trader).expect("checked above"),
            eligible,
        );

        debug!(trader = trader.0, amount = %amount, "collateral withdrawn");
        self.emit_event(EventPayload::CollateralWithdrawn(CollateralEvent {
            trader,
            amount,
            new_balance,
        }));
        Ok(())
    }

    pub fn withdrawable(&self, trader: TraderId) -> Result<Quote, EngineError> {
        let account = self
            .accounts
            .get(&trader)
            .ok_or(EngineError::UnknownAccount(trader))?;
        let index = self.market.index_price();
        let contract_size = self.market.series.contract_size;
        let requirement =
            margin_requirement(account.gross_qty(), index, contract_size, &self.market.margin);
        let equity = account
            .equity_signed(index, contract_size)
            .min(account.collateral);
        Ok((equity - account.locked_im - requirement.initial).floor_zero())
    }

    // -- rewards ------------------------------------------------------------

    pub fn deposit_reward(&mut self, amount: Quote) -> Result<(), EngineError> {
        if amount.is_negative() || amount.is_zero() {
            return Err(EngineError::InvalidAmount(amount.value()));
        }
        self.market.rewards.deposit(amount);
        let total_eligible = self.market.rewards.total_eligible;
        self.emit_event(EventPayload::RewardDeposited(RewardDepositedEvent {
            amount,
            total_eligible,
        }));
        Ok(())
    }

    pub fn claim_reward(&mut self, trader: TraderId) -> Result<Quote, EngineError> {
        let account = self
            .accounts
            .get_mut(&trader)
            .ok_or(EngineError::UnknownAccount(trader))?;
        let amount = self.market.rewards.claim(account);
        if !amount.is_zero() {
            self.emit_event(EventPayload::RewardClaimed(RewardClaimedEvent {
                trader,
                amount,
            }));
        }
        Ok(amount)
    }

    /// Best-effort payout of gains the reserve could not cover earlier.
    pub fn claim_pending_credit(&mut self, trader: TraderId) -> Result<Quote, EngineError> {
        let account = self
            .accounts
            .get_mut(&trader)
            .ok_or(EngineError::UnknownAccount(trader))?;
        self.market.rewards.settle(account);
        let owed = account.pending_credit;
        if owed.is_zero() {
            return Ok(Quote::ZERO);
        }
        let paid = self.reserve.withdraw(owed);
        let account = self.accounts.get_mut(&trader).expect("checked above");
        account.pending_credit -= paid;
        account.credit_collateral(paid);
        let outstanding = account.pending_credit;
        let eligible = eligibility(account, &self.market);
        self.market.rewards.refresh(
            self.accounts.get_mut(&trader).expect("checked above"),
            eligible,
        );

        if !paid.is_zero() {
            self.emit_event(EventPayload::PendingCreditPaid(PendingCreditEvent {
                trader,
                amount: paid,
                outstanding,
            }));
        }
        Ok(paid)
    }

    // -- admin --------------------------------------------------------------

    pub fn set_margin_bps(
        &mut self,
        caller: TraderId,
        initial: Bps,
        maintenance: Bps,
    ) -> Result<(), EngineError> {
        self.require_admin(caller)?;
        let mut updated = self.market.margin.clone();
        updated.initial_margin_bps = initial;
        updated.maintenance_margin_bps = maintenance;
        updated.validate()?;
        self.market.margin = updated;
        Ok(())
    }

    pub fn set_tier_schedule(
        &mut self,
        caller: TraderId,
        tiers: TierSchedule,
    ) -> Result<(), EngineError> {
        self.require_admin(caller)?;
        tiers.validate()?;
        self.market.margin.tiers = tiers;
        Ok(())
    }

    pub fn set_risk_caps(&mut self, caller: TraderId, caps: RiskCaps) -> Result<(), EngineError> {
        self.require_admin(caller)?;
        self.market.caps = caps;
        Ok(())
    }

    pub fn set_ema_params(
        &mut self,
        caller: TraderId,
        fast: EmaFraction,
        slow: EmaFraction,
        cap_multiple_bps: Bps,
        mark_gate_bps: Bps,
    ) -> Result<(), EngineError> {
        self.require_admin(caller)?;
        let mut updated = self.market.series.clone();
        updated.ema_fast = fast;
        updated.ema_slow = slow;
        updated.cap_multiple_bps = cap_multiple_bps;
        updated.mark_gate_bps = mark_gate_bps;
        updated.validate()?;
        self.market.series = updated;
        Ok(())
    }

    pub fn set_paused(&mut self, caller: TraderId, paused: bool) -> Result<(), EngineError> {
        self.require_admin(caller)?;
        self.market.paused = paused;
        Ok(())
    }

    fn require_admin(&self, caller: TraderId) -> Result<(), EngineError> {
        if self.admin.is_admin(caller) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized(caller))
        }
    }

    // -- shared internals ---------------------------------------------------

    /// Trading is only open pre-expiry, unpaused, unsettled.
    pub(super) fn require_live(&self) -> Result<(), EngineError> {
        if self.market.is_settled() {
            return Err(EngineError::AlreadySettled);
        }
        if self.market.is_expired(self.current_time) {
            return Err(EngineError::MarketExpired(self.market.series.expiry));
        }
        if self.market.paused {
            return Err(EngineError::MarketPaused);
        }
        Ok(())
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event {
            id: EventId(self.next_event_id),
            timestamp: self.current_time,
            payload,
        };
        self.next_event_id += 1;
        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let excess = self.events.len() - self.config.max_events;
            self.events.drain(0..excess);
        }
    }
}

/// At-risk eligibility: capital genuinely exposed to market risk.
pub(super) fn eligibility(account: &Account, market: &MarketState) -> Quote {
    let index = market.index_price();
    let contract_size = market.series.contract_size;
    let requirement =
        margin_requirement(account.gross_qty(), index, contract_size, &market.margin);
    account.equity(index, contract_size).min(requirement.initial)
}

/// Settle a batch of realized PnL legs against the reserve, on staged
/// accounts. Losses collect first so their proceeds back the gains of the
/// same operation; whatever the reserve still cannot pay becomes a pending
/// credit on the winning account.
pub(super) struct PnlSettlement {
    pub reserve_collected: Quote,
    pub reserve_paid: Quote,
    /// (trader, newly accrued credit, outstanding credit after accrual)
    pub credits_accrued: Vec<(TraderId, Quote, Quote)>,
}

pub(super) fn settle_realized(
    staged: &mut HashMap<TraderId, Account>,
    legs: &[(TraderId, Quote)],
    reserve_available: Quote,
) -> PnlSettlement {
    let mut collected = Quote::ZERO;
    let mut paid = Quote::ZERO;
    let mut credits = Vec::new();
    let mut available = reserve_available;

    for (trader, realized) in legs.iter().filter(|(_, r)| r.is_negative()) {
        let account = staged.get_mut(trader).expect("staged account");
        let owed = -*realized;
        let taken = account.debit_collateral_capped(owed);
        // shortfall beyond collateral is foregone, never a negative balance
        collected += taken;
        available += taken;
    }

    for (trader, realized) in legs.iter().filter(|(_, r)| !r.is_negative() && !r.is_zero()) {
        let account = staged.get_mut(trader).expect("staged account");
        let covered = (*realized).min(available);
        available -= covered;
        paid += covered;
        account.credit_collateral(covered);

        let shortfall = *realized - covered;
        if !shortfall.is_zero() {
            account.pending_credit += shortfall;
            credits.push((*trader, shortfall, account.pending_credit));
        }
    }

    PnlSettlement {
        reserve_collected: collected,
        reserve_paid: paid,
        credits_accrued: credits,
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("symbol", &self.market.series.symbol)
            .field("accounts", &self.accounts.len())
            .field("oi_long", &self.market.oi_long)
            .field("oi_short", &self.market.oi_short)
            .field("settled", &self.market.is_settled())
            .finish()
    }
}
