//! Property tests for the book invariants: no crossed book, FIFO within a
//! level, and conservation of quantity across a random sequence of
//! submissions and cancels.

use proptest::prelude::*;

use marketpit::book::Book;
use marketpit::order::{Order, OrderStatus};
use marketpit::types::{OrderId, Qty, Side, TimeInForce};

fn mk_order(id: OrderId, user: u32, side: Side, price: i64, qty: Qty, sequence: u64) -> Order {
    Order {
        order_id: id,
        user_id: user,
        instrument_id: 1,
        side,
        limit_price: price,
        original_qty: qty,
        remaining_qty: qty,
        tif: TimeInForce::Gfd,
        post_only: false,
        sequence_number: sequence,
        status: OrderStatus::Live,
    }
}

#[derive(Debug, Clone)]
enum Op {
    Submit { side: Side, price: i64, qty: Qty },
    Cancel { target: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<bool>(), 95i64..105, 1u64..20).prop_map(|(buy, price, qty)| Op::Submit {
            side: if buy { Side::Buy } else { Side::Sell },
            price,
            qty,
        }),
        (0usize..64).prop_map(|target| Op::Cancel { target }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn book_never_ends_crossed_and_conserves_quantity(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut book = Book::new(1);
        let mut submitted_ids = Vec::new();
        let mut next_id: OrderId = 1;
        let mut total_submitted_qty: u128 = 0;
        let mut total_filled_qty: u128 = 0;

        for op in ops {
            match op {
                Op::Submit { side, price, qty } => {
                    let id = next_id;
                    next_id += 1;
                    total_submitted_qty += qty as u128;
                    let order = mk_order(id, (id % 5) as u32, side, price, qty, id);
                    if let Ok(outcome) = book.submit(order) {
                        total_filled_qty += outcome.fills.iter().map(|f| f.qty as u128).sum::<u128>();
                        submitted_ids.push(id);
                    }
                }
                Op::Cancel { target } => {
                    if !submitted_ids.is_empty() {
                        let id = submitted_ids[target % submitted_ids.len()];
                        let _ = book.cancel(id, (id % 5) as u32, false);
                    }
                }
            }

            // Invariant: the book never rests crossed.
            if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
                prop_assert!(bid < ask, "book crossed: bid {} >= ask {}", bid, ask);
            }
        }

        // Invariant: every unit of quantity is either still resting or was
        // matched — fills never invent or destroy quantity. Each trade
        // debits two resting/aggressing legs, so total matched qty can be
        // at most the submitted qty.
        prop_assert!(total_filled_qty <= total_submitted_qty);
    }

    #[test]
    fn fifo_within_level_preserved(qtys in prop::collection::vec(1u64..10, 2..10)) {
        let mut book = Book::new(1);
        let mut ids = Vec::new();
        for (i, qty) in qtys.iter().enumerate() {
            let id = (i + 1) as OrderId;
            ids.push(id);
            book.submit(mk_order(id, i as u32, Side::Buy, 100, *qty, id)).unwrap();
        }
        let total: u64 = qtys.iter().sum();
        let outcome = book.submit(mk_order(9999, 999, Side::Sell, 100, total, 9999)).unwrap();

        // Fills must arrive in the same order the resting orders were
        // submitted (ascending order_id), never reordered.
        let fill_order: Vec<OrderId> = outcome.fills.iter().map(|f| f.maker_order_id).collect();
        let mut sorted = fill_order.clone();
        sorted.sort_unstable();
        prop_assert_eq!(fill_order, sorted);
        prop_assert_eq!(fill_order, ids);
    }
}
