//! Session-coordinator behavior: role uniqueness, broadcast fan-out, and the
//! explicit "resting orders survive departure" rule.

use marketpit::instrument::NewInstrument;
use marketpit::message::{Outbound, Role};
use marketpit::session::Coordinator;
use marketpit::types::{InstrumentKind, Side, TimeInForce};

fn coordinator() -> Coordinator {
    let dir = tempfile::tempdir().expect("tempdir").into_path();
    Coordinator::new(dir)
}

async fn create_and_join_exchange(coord: &Coordinator) -> (String, u32, tokio::sync::mpsc::UnboundedReceiver<Outbound>) {
    let room_code = coord.create_room(None);
    let join = coord.join(&room_code, "exchange".into(), Role::Exchange, None).await.unwrap();
    (room_code, join.user_id, join.receiver)
}

#[tokio::test]
async fn only_one_exchange_seat_per_room() {
    let coord = coordinator();
    let (room_code, _exchange_id, _rx) = create_and_join_exchange(&coord).await;

    let second = coord.join(&room_code, "impostor".into(), Role::Exchange, None).await;
    assert!(second.is_err());

    let trader = coord.join(&room_code, "trader".into(), Role::Trader, None).await;
    assert!(trader.is_ok());
}

#[tokio::test]
async fn departed_users_resting_orders_are_not_cancelled() {
    let coord = coordinator();
    let (room_code, exchange_id, _exchange_rx) = create_and_join_exchange(&coord).await;

    let alice = coord.join(&room_code, "alice".into(), Role::Trader, None).await.unwrap();
    let bob = coord.join(&room_code, "bob".into(), Role::Trader, None).await.unwrap();

    let inst = coord
        .add_instrument(
            &room_code,
            exchange_id,
            NewInstrument {
                symbol: "T".into(),
                kind: InstrumentKind::Scalar,
                tick_size: 1,
                lot_size: 1,
                tick_value: 1.0,
                reference_id: None,
                strike: None,
            },
        )
        .await
        .unwrap();

    coord
        .submit_order(&room_code, alice.user_id, inst, Side::Buy, 10_000, 10, TimeInForce::Gfd, false)
        .await
        .unwrap();

    coord.leave(&room_code, alice.user_id).await.unwrap();

    // Alice's resting bid is still live: Bob's sell should cross it.
    coord
        .submit_order(&room_code, bob.user_id, inst, Side::Sell, 10_000, 10, TimeInForce::Gfd, false)
        .await
        .unwrap();

    let mut saw_fill = false;
    while let Ok(event) = bob.receiver.try_recv() {
        if matches!(event, Outbound::Fill { .. }) {
            saw_fill = true;
        }
    }
    assert!(saw_fill, "expected bob to receive a fill against alice's surviving resting order");
}

#[tokio::test]
async fn settlement_cascades_to_referencing_options_and_refreshes_all_positions() {
    let coord = coordinator();
    let (room_code, exchange_id, _exchange_rx) = create_and_join_exchange(&coord).await;
    let alice = coord.join(&room_code, "alice".into(), Role::Trader, None).await.unwrap();
    let bob = coord.join(&room_code, "bob".into(), Role::Trader, None).await.unwrap();

    let scalar = coord
        .add_instrument(
            &room_code,
            exchange_id,
            NewInstrument {
                symbol: "B".into(),
                kind: InstrumentKind::Scalar,
                tick_size: 1,
                lot_size: 1,
                tick_value: 1.0,
                reference_id: None,
                strike: None,
            },
        )
        .await
        .unwrap();
    let call = coord
        .add_instrument(
            &room_code,
            exchange_id,
            NewInstrument {
                symbol: "B-C100".into(),
                kind: InstrumentKind::Call,
                tick_size: 1,
                lot_size: 1,
                tick_value: 1.0,
                reference_id: Some(scalar),
                strike: Some(10_000),
            },
        )
        .await
        .unwrap();

    coord.submit_order(&room_code, alice.user_id, call, Side::Buy, 500, 10, TimeInForce::Gfd, false).await.unwrap();
    coord.submit_order(&room_code, bob.user_id, call, Side::Sell, 500, 10, TimeInForce::Gfd, false).await.unwrap();

    let mut alice_rx = alice.receiver;
    while alice_rx.try_recv().is_ok() {}

    coord.settle(&room_code, exchange_id, scalar, 12_000).await.unwrap();

    let mut saw_option_expired = false;
    let mut saw_settlement = false;
    let mut saw_pnl = false;
    while let Ok(event) = alice_rx.try_recv() {
        match event {
            Outbound::OptionExpired { inst, .. } if inst == call => saw_option_expired = true,
            Outbound::Settlement { inst, .. } if inst == scalar => saw_settlement = true,
            Outbound::Pnl { .. } => saw_pnl = true,
            _ => {}
        }
    }
    assert!(saw_option_expired, "expected option_expired cascade for the referencing call");
    assert!(saw_settlement, "expected settlement event for the underlying scalar");
    assert!(saw_pnl, "expected a PnL refresh after settlement");
}
