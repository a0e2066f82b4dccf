//! The concrete end-to-end scenarios: a crossing trade with zero-sum PnL,
//! option payoff on settlement, a partial-fill ladder, post_only rejection,
//! halt behavior, and the order-rate limit.

use marketpit::engine::{Engine, NewOrderRequest};
use marketpit::instrument::NewInstrument;
use marketpit::risk::RiskLimits;
use marketpit::types::{InstrumentKind, Side, TimeInForce};

fn scalar(engine: &mut Engine, symbol: &str) -> u32 {
    engine
        .add_instrument(NewInstrument {
            symbol: symbol.to_string(),
            kind: InstrumentKind::Scalar,
            tick_size: 1,
            lot_size: 1,
            tick_value: 1.0,
            reference_id: None,
            strike: None,
        })
        .unwrap()
}

fn call(engine: &mut Engine, symbol: &str, reference_id: u32, strike_minor: i64) -> u32 {
    engine
        .add_instrument(NewInstrument {
            symbol: symbol.to_string(),
            kind: InstrumentKind::Call,
            tick_size: 1,
            lot_size: 1,
            tick_value: 1.0,
            reference_id: Some(reference_id),
            strike: Some(strike_minor),
        })
        .unwrap()
}

fn order(user_id: u32, inst: u32, side: Side, price: i64, qty: u64) -> NewOrderRequest {
    NewOrderRequest {
        user_id,
        instrument_id: inst,
        side,
        price,
        qty,
        tif: TimeInForce::Gfd,
        post_only: false,
    }
}

const ALICE: u32 = 1;
const BOB: u32 = 2;

fn setup(engine: &mut Engine) {
    engine.set_risk_limits(ALICE, RiskLimits::default());
    engine.set_risk_limits(BOB, RiskLimits::default());
}

#[test]
fn scenario_1_crossing_trade_and_zero_sum() {
    let mut engine = Engine::new();
    setup(&mut engine);
    let t = scalar(&mut engine, "T");

    engine.submit_order(order(ALICE, t, Side::Buy, 10_000, 10)).unwrap();
    let outcome = engine.submit_order(order(BOB, t, Side::Sell, 10_000, 10)).unwrap();
    assert_eq!(outcome.fills.len(), 1);
    assert_eq!(outcome.fills[0].price, 10_000);

    let alice_pos = engine.position_of(ALICE, t);
    assert_eq!(alice_pos.net_qty, 10);
    assert!((alice_pos.vwap - 10_000.0).abs() < 1e-9);

    engine.settle(t, 10_500).unwrap();
    let alice_pnl = engine.total_pnl_of_user(ALICE);
    let bob_pnl = engine.total_pnl_of_user(BOB);
    assert!((alice_pnl - 50.0).abs() < 1e-6);
    assert!((bob_pnl + 50.0).abs() < 1e-6);
    assert!((alice_pnl + bob_pnl).abs() < 1e-6);
}

#[test]
fn scenario_2_option_payoff_on_underlying_settlement() {
    let mut engine = Engine::new();
    setup(&mut engine);
    let b = scalar(&mut engine, "B");
    let c = call(&mut engine, "B-C100", b, 10_000);

    engine.submit_order(order(ALICE, c, Side::Buy, 500, 10)).unwrap();
    engine.submit_order(order(BOB, c, Side::Sell, 500, 10)).unwrap();

    let settled = engine.settle(b, 12_000).unwrap();
    assert_eq!(settled.len(), 2);
    assert_eq!(settled[1].instrument_id, c);
    assert_eq!(settled[1].value, 2_000);

    let alice_pnl = engine.total_pnl_of_user(ALICE);
    let bob_pnl = engine.total_pnl_of_user(BOB);
    assert!((alice_pnl - 150.0).abs() < 1e-6);
    assert!((bob_pnl + 150.0).abs() < 1e-6);
}

#[test]
fn scenario_3_ladder_and_partial_fill() {
    let mut engine = Engine::new();
    setup(&mut engine);
    let t = scalar(&mut engine, "T");

    engine.submit_order(order(ALICE, t, Side::Buy, 10_000, 10)).unwrap();
    engine.submit_order(order(ALICE, t, Side::Buy, 9_900, 20)).unwrap();
    engine.submit_order(order(ALICE, t, Side::Buy, 9_800, 30)).unwrap();

    // A marketable sell reaching down to the worst level: fills the best two
    // levels in full (price improvement on both) then partially hits the
    // third, leaving the remainder of Alice's deepest bid resting.
    let outcome = engine.submit_order(order(BOB, t, Side::Sell, 9_800, 35)).unwrap();
    assert_eq!(outcome.fills.len(), 3);
    assert_eq!((outcome.fills[0].price, outcome.fills[0].qty), (10_000, 10));
    assert_eq!((outcome.fills[1].price, outcome.fills[1].qty), (9_900, 20));
    assert_eq!((outcome.fills[2].price, outcome.fills[2].qty), (9_800, 5));
    assert_eq!(outcome.status, marketpit::order::OrderStatus::Filled);

    let snapshot = engine.snapshot(t, usize::MAX).unwrap();
    assert_eq!(snapshot.bids.len(), 1);
    assert_eq!(snapshot.bids[0].price, 9_800);
    assert_eq!(snapshot.bids[0].qty, 25);
}

#[test]
fn scenario_4_post_only_rejected_when_crossing() {
    let mut engine = Engine::new();
    setup(&mut engine);
    let t = scalar(&mut engine, "T");

    engine.submit_order(order(ALICE, t, Side::Sell, 10_100, 10)).unwrap();
    let mut req = order(BOB, t, Side::Buy, 10_100, 5);
    req.post_only = true;
    let result = engine.submit_order(req);
    assert!(result.is_err());

    let snapshot = engine.snapshot(t, usize::MAX).unwrap();
    assert_eq!(snapshot.asks[0].qty, 10);
    assert!(snapshot.bids.is_empty());
}

#[test]
fn scenario_5_halt_blocks_submit_but_allows_cancel() {
    let mut engine = Engine::new();
    setup(&mut engine);
    let t = scalar(&mut engine, "T");

    let outcome = engine.submit_order(order(ALICE, t, Side::Buy, 10_000, 10)).unwrap();
    engine.set_halted(t, true).unwrap();

    assert!(engine.submit_order(order(BOB, t, Side::Sell, 10_000, 10)).is_err());
    assert!(engine.cancel_order(outcome.order_id, ALICE, false).unwrap());
}

#[test]
fn scenario_6_rate_limit_rejects_after_threshold() {
    let mut engine = Engine::new();
    engine.set_risk_limits(ALICE, RiskLimits { max_orders_per_sec: 3, ..Default::default() });
    let t = scalar(&mut engine, "T");

    for i in 0..3 {
        let price = 10_000 + i as i64;
        assert!(engine.submit_order(order(ALICE, t, Side::Buy, price, 1)).is_ok());
    }
    let result = engine.submit_order(order(ALICE, t, Side::Buy, 10_010, 1));
    assert!(result.is_err());
}
