//! Expiry Futures Core Simulation.
//!
//! Drives the full series lifecycle against the in-memory collaborators:
//! trading and index formation, tiered margin, a liquidation, reward
//! distribution, and expiry settlement.

use expiry_futures::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const HOUR_MS: i64 = 3_600_000;

fn main() {
    tracing_subscriber_init();

    println!("Expiry Futures Core Simulation");
    println!("Synthetic self-referential index, single series\n");

    scenario_1_trading_and_index();
    scenario_2_liquidation();
    scenario_3_rewards();
    scenario_4_settlement();

    println!("\nAll simulations completed successfully.");
}

fn tracing_subscriber_init() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn new_engine(expiry_ms: i64) -> Engine {
    let params = MarketParams {
        series: SeriesConfig {
            symbol: "SYN-EXP1".to_string(),
            expiry: Timestamp::from_millis(expiry_ms),
            initial_index_price: Price::new_unchecked(dec!(100)),
            ..SeriesConfig::default()
        },
        ..MarketParams::default()
    };
    Engine::new(params, AdminSet::with([TraderId(0)]), Timestamp::from_millis(0)).unwrap()
}

/// Two traders meet; their print becomes the index's next sample.
fn scenario_1_trading_and_index() {
    println!("Scenario 1: Trading and Index Formation\n");

    let mut engine = new_engine(30 * 24 * HOUR_MS);
    let alice = TraderId(1);
    let bob = TraderId(2);

    engine.deposit(alice, Quote::new(dec!(10_000))).unwrap();
    engine.deposit(bob, Quote::new(dec!(10_000))).unwrap();
    println!("  Alice and Bob each deposit 10,000");
    println!("  Index opens at {}", engine.index_price());

    let ask = engine
        .place_order(bob, false, Some(Price::new_unchecked(dec!(101))), dec!(10), None, false)
        .unwrap();
    println!("  Bob posts SELL 10 @ 101, resting order {:?}", ask.resting_order);

    engine.advance_time(HOUR_MS);
    let trade = engine
        .place_order(alice, true, Some(Price::new_unchecked(dec!(101))), dec!(4), None, false)
        .unwrap();
    println!(
        "  Alice lifts {} @ {} (fee {})",
        trade.filled_qty,
        trade.avg_fill_price.unwrap(),
        trade.taker_fee
    );
    println!("  Index after the print: {}", engine.index_price());

    let a = engine.account(alice).unwrap();
    let b = engine.account(bob).unwrap();
    println!("  Alice long {} @ {}", a.long_qty, a.avg_long_price);
    println!("  Bob short {} @ {}, locked IM {}", b.short_qty, b.avg_short_price, b.locked_im);
    println!(
        "  Open interest: {} long / {} short\n",
        engine.market().oi_long,
        engine.market().oi_short
    );
}

/// An over-levered long gets partially closed by a keeper.
fn scenario_2_liquidation() {
    println!("Scenario 2: Liquidation\n");

    let mut engine = new_engine(30 * 24 * HOUR_MS);
    let whale = TraderId(1);
    let maker = TraderId(2);
    let keeper = TraderId(3);

    engine.deposit(whale, Quote::new(dec!(1_020))).unwrap();
    engine.deposit(maker, Quote::new(dec!(100_000))).unwrap();
    engine.deposit(keeper, Quote::new(dec!(5_000))).unwrap();

    engine
        .place_order(maker, false, Some(Price::new_unchecked(dec!(100))), dec!(100), None, false)
        .unwrap();
    engine
        .place_order(whale, true, Some(Price::new_unchecked(dec!(100))), dec!(100), None, false)
        .unwrap();
    println!("  Whale opens 100 long @ 100 on 1,020 collateral (10% IM)");

    // grind the index down with small prints
    for step in 1..=12 {
        engine.advance_time(HOUR_MS);
        let price = Price::new_unchecked(dec!(100) - Decimal::from(step));
        engine
            .place_order(maker, false, Some(price), dec!(1), None, false)
            .ok();
        engine
            .place_order(keeper, true, Some(price), dec!(1), None, false)
            .ok();
    }
    println!("  Index ground down to {}", engine.index_price());

    let targets = engine.liquidatable_accounts();
    println!("  Liquidatable: {:?}", targets);

    if targets.contains(&whale) {
        let outcome = engine.liquidate(keeper, whale, dec!(100)).unwrap();
        println!(
            "  Keeper closed {} contracts @ {}; penalty {} (keeper cut {})\n",
            outcome.closed_qty, outcome.close_price, outcome.penalty.total, outcome.penalty.keeper
        );
    } else {
        println!("  (whale survived this path)\n");
    }
}

/// Rewards accrue pro-rata to at-risk margin, O(1) per account.
fn scenario_3_rewards() {
    println!("Scenario 3: Reward Accumulator\n");

    let mut engine = new_engine(30 * 24 * HOUR_MS);
    let alice = TraderId(1);
    let bob = TraderId(2);
    let keeper = TraderId(3);

    for (trader, amount) in [(alice, dec!(10_000)), (bob, dec!(10_000)), (keeper, dec!(10_000))] {
        engine.deposit(trader, Quote::new(amount)).unwrap();
    }

    // only alice and bob take on risk
    engine
        .place_order(bob, false, Some(Price::new_unchecked(dec!(100))), dec!(30), None, false)
        .unwrap();
    engine
        .place_order(alice, true, Some(Price::new_unchecked(dec!(100))), dec!(30), None, false)
        .unwrap();

    engine.deposit_reward(Quote::new(dec!(600))).unwrap();
    let a = engine.claim_reward(alice).unwrap();
    let b = engine.claim_reward(bob).unwrap();
    let k = engine.claim_reward(keeper).unwrap();
    println!("  600 deposited; claims: alice {}, bob {}, idle keeper {}\n", a, b, k);
}

/// Expiry: snapshot once, then every account flattens itself.
fn scenario_4_settlement() {
    println!("Scenario 4: Settlement\n");

    let expiry = 24 * HOUR_MS;
    let mut engine = new_engine(expiry);
    let alice = TraderId(1);
    let bob = TraderId(2);

    engine.deposit(alice, Quote::new(dec!(10_000))).unwrap();
    engine.deposit(bob, Quote::new(dec!(10_000))).unwrap();

    engine
        .place_order(bob, false, Some(Price::new_unchecked(dec!(100))), dec!(10), None, false)
        .unwrap();
    engine
        .place_order(alice, true, Some(Price::new_unchecked(dec!(100))), dec!(10), None, false)
        .unwrap();

    engine.advance_time(HOUR_MS);
    engine
        .place_order(bob, false, Some(Price::new_unchecked(dec!(104))), dec!(1), None, false)
        .unwrap();
    engine
        .place_order(alice, true, Some(Price::new_unchecked(dec!(104))), dec!(1), None, false)
        .unwrap();

    engine.set_time(Timestamp::from_millis(expiry));
    let outcome = engine.snapshot_settlement().unwrap();
    println!(
        "  Settled at {} via {:?} ({} orders drained)",
        outcome.price, outcome.source, outcome.drained_orders
    );

    let second = engine.snapshot_settlement();
    println!("  Second snapshot rejected: {}", second.unwrap_err());

    // loser first so the reserve holds funds when the winner flattens
    for trader in [bob, alice] {
        let realized = engine.settle_self(trader).unwrap();
        let account = engine.account(trader).unwrap();
        println!(
            "  Trader {:?} flattened, realized {}, collateral {}",
            trader, realized, account.collateral
        );
    }
    println!();
}
