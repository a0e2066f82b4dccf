//! Price-time-priority limit order book for a single instrument.
//!
//! Bids and asks are kept in price-ordered maps (descending best-bid-first,
//! ascending best-ask-first); a secondary `order_id -> (price, side)` index
//! gives O(1) cancel-by-id without scanning levels, the same shape the
//! corpus's concurrent order books use for their location index, simplified
//! here to plain `std` collections because a room's book is only ever
//! mutated by one caller at a time (see the engine's per-room serialization).

mod error;
pub mod snapshot;

pub use error::BookError;
pub use snapshot::{BookSnapshot, DepthLevel};

use std::collections::BTreeMap;
use std::collections::HashMap;

use tracing::trace;

use crate::level::PriceLevel;
use crate::order::{Order, OrderStatus};
use crate::types::{InstrumentId, OrderId, Price, Qty, Side, TimeInForce, UserId};

/// One side of a completed trade, as produced by [`Book::submit`]. The
/// caller (the engine) is responsible for assigning a trade id, a
/// timestamp, and driving position updates; the book only knows about
/// price-time priority.
#[derive(Debug, Clone)]
pub struct RawFill {
    pub maker_order_id: OrderId,
    pub maker_user_id: UserId,
    pub taker_order_id: OrderId,
    pub taker_user_id: UserId,
    /// Side of the taker (aggressor).
    pub taker_side: Side,
    pub price: Price,
    pub qty: Qty,
}

/// Outcome of submitting a new order: the fills it produced (maker-first,
/// in execution order) and whether any remainder ended up resting.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub fills: Vec<RawFill>,
    pub rested_qty: Qty,
}

pub struct Book {
    pub instrument_id: InstrumentId,
    bids: BTreeMap<Price, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    locations: HashMap<OrderId, (Price, Side)>,
    last_trade_price: Option<Price>,
    halted: bool,
    settled: bool,
}

impl Book {
    pub fn new(instrument_id: InstrumentId) -> Self {
        Self {
            instrument_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            locations: HashMap::new(),
            last_trade_price: None,
            halted: false,
            settled: false,
        }
    }

    pub fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn set_settled(&mut self) {
        self.settled = true;
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn last_trade_price(&self) -> Option<Price> {
        self.last_trade_price
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Price, PriceLevel> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    fn opposite_mut(&mut self, side: Side) -> &mut BTreeMap<Price, PriceLevel> {
        self.side_mut(side.opposite())
    }

    fn would_cross(&self, side: Side, price: Price) -> bool {
        match side {
            Side::Buy => self.best_ask().is_some_and(|ask| price >= ask),
            Side::Sell => self.best_bid().is_some_and(|bid| price <= bid),
        }
    }

    fn guard_mutable(&self) -> Result<(), BookError> {
        if self.settled {
            return Err(BookError::Settled(self.instrument_id));
        }
        if self.halted {
            return Err(BookError::Halted(self.instrument_id));
        }
        Ok(())
    }

    /// Submit a new order. Matches against the opposite side following
    /// price-time priority (price improvement always accrues to the
    /// aggressor: trades print at the *resting* order's price), then either
    /// discards (IOC) or rests (GFD) any remainder.
    pub fn submit(&mut self, mut order: Order) -> Result<MatchOutcome, BookError> {
        self.guard_mutable()?;

        if order.post_only && self.would_cross(order.side, order.limit_price) {
            return Err(BookError::WouldCross {
                price: order.limit_price,
            });
        }

        let mut outcome = MatchOutcome::default();
        if !order.post_only {
            self.match_against_book(&mut order, &mut outcome);
        }

        if order.remaining_qty > 0 {
            if order.tif == TimeInForce::Ioc {
                order.status = OrderStatus::Cancelled;
            } else {
                outcome.rested_qty = order.remaining_qty;
                self.rest(order);
            }
        }

        Ok(outcome)
    }

    fn match_against_book(&mut self, incoming: &mut Order, outcome: &mut MatchOutcome) {
        let opposite_side = incoming.side.opposite();
        loop {
            if incoming.remaining_qty == 0 {
                break;
            }
            let best_price = match opposite_side {
                Side::Buy => self.bids.keys().next_back().copied(),
                Side::Sell => self.asks.keys().next().copied(),
            };
            let Some(price) = best_price else { break };

            let crosses = match incoming.side {
                Side::Buy => incoming.limit_price >= price,
                Side::Sell => incoming.limit_price <= price,
            };
            if !crosses {
                break;
            }

            let levels = self.opposite_mut(incoming.side);
            let level = levels.get_mut(&price).expect("best price key is present");

            while incoming.remaining_qty > 0 {
                let Some(maker) = level.front_mut() else { break };
                let traded_qty = incoming.remaining_qty.min(maker.remaining_qty);
                maker.apply_fill(traded_qty);
                incoming.apply_fill(traded_qty);
                level.debit(traded_qty);

                outcome.fills.push(RawFill {
                    maker_order_id: maker.order_id,
                    maker_user_id: maker.user_id,
                    taker_order_id: incoming.order_id,
                    taker_user_id: incoming.user_id,
                    taker_side: incoming.side,
                    price,
                    qty: traded_qty,
                });
                trace!(
                    instrument_id = self.instrument_id,
                    price, qty = traded_qty, "matched"
                );

                if maker.remaining_qty == 0 {
                    let filled = level.pop_front_if_filled().expect("head just emptied");
                    self.locations.remove(&filled.order_id);
                } else {
                    break;
                }
            }

            self.last_trade_price = Some(price);

            if level.is_empty() {
                levels.remove(&price);
            }
        }
    }

    fn rest(&mut self, order: Order) {
        let price = order.limit_price;
        let side = order.side;
        let order_id = order.order_id;
        self.side_mut(side).entry(price).or_insert_with(|| PriceLevel::new(price)).push_back(order);
        self.locations.insert(order_id, (price, side));
    }

    /// Locate and remove a live order. `caller` must own it unless `is_admin`
    /// (the room's exchange performing an explicit pull); cancelling a
    /// terminal or unknown order is a no-op that reports `false` rather than
    /// an error, matching the idempotent-cancel invariant.
    pub fn cancel(&mut self, order_id: OrderId, caller: UserId, is_admin: bool) -> Result<bool, BookError> {
        let Some(&(price, side)) = self.locations.get(&order_id) else {
            return Ok(false);
        };
        let levels = self.side_mut(side);
        let Some(level) = levels.get_mut(&price) else {
            return Ok(false);
        };
        let owner = level.iter().find(|o| o.order_id == order_id).map(|o| o.user_id);
        if let Some(owner) = owner {
            if owner != caller && !is_admin {
                return Err(BookError::NotOwner {
                    order_id,
                    caller,
                    owner,
                });
            }
        }
        let removed = level.remove(order_id);
        if level.is_empty() {
            levels.remove(&price);
        }
        self.locations.remove(&order_id);
        Ok(removed.is_some())
    }

    /// Cancel + resubmit at a (possibly) new price/qty. Loses time priority.
    /// If the resubmit would be rejected, the original order is restored
    /// unchanged.
    pub fn replace(
        &mut self,
        order_id: OrderId,
        caller: UserId,
        new_price: Option<Price>,
        new_qty: Option<Qty>,
    ) -> Result<MatchOutcome, BookError> {
        let Some(&(price, side)) = self.locations.get(&order_id) else {
            return Err(BookError::NotFound(order_id));
        };
        let original = {
            let levels = self.side_mut(side);
            let level = levels.get_mut(&price).ok_or(BookError::NotFound(order_id))?;
            let owner = level
                .iter()
                .find(|o| o.order_id == order_id)
                .map(|o| o.user_id)
                .ok_or(BookError::NotFound(order_id))?;
            if owner != caller {
                return Err(BookError::NotOwner {
                    order_id,
                    caller,
                    owner,
                });
            }
            let removed = level.remove(order_id).ok_or(BookError::NotFound(order_id))?;
            if level.is_empty() {
                levels.remove(&price);
            }
            self.locations.remove(&order_id);
            removed
        };

        let mut replacement = original.clone();
        replacement.limit_price = new_price.unwrap_or(original.limit_price);
        replacement.original_qty = new_qty.unwrap_or(original.original_qty);
        replacement.remaining_qty = replacement.original_qty;
        replacement.status = crate::order::OrderStatus::Live;

        match self.submit(replacement) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.rest(original);
                Err(err)
            }
        }
    }

    /// All live orders resting in this book, across both sides (used for
    /// admin pulls such as `cancel_inst` / tick-size changes).
    pub fn live_order_ids(&self) -> Vec<OrderId> {
        self.locations.keys().copied().collect()
    }

    /// All live orders, both sides, in no particular order (used to find a
    /// user's resting orders for `cancel_all`).
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.bids
            .values()
            .flat_map(|l| l.iter())
            .chain(self.asks.values().flat_map(|l| l.iter()))
    }

    /// Truncated (or full, with `depth = usize::MAX`) snapshot of both
    /// sides.
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(price, level)| DepthLevel {
                price: *price,
                qty: level.total_qty(),
            })
            .collect();
        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(price, level)| DepthLevel {
                price: *price,
                qty: level.total_qty(),
            })
            .collect();
        BookSnapshot {
            instrument_id: self.instrument_id,
            bids,
            asks,
            last_price: self.last_trade_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: OrderId, user: UserId, side: Side, price: Price, qty: Qty) -> Order {
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
            sequence_number: id,
            status: OrderStatus::Live,
        }
    }

    #[test]
    fn resting_order_then_cross_prints_at_maker_price() {
        let mut book = Book::new(1);
        book.submit(order(1, 10, Side::Buy, 10000, 10)).unwrap();
        let outcome = book.submit(order(2, 20, Side::Sell, 10000, 10)).unwrap();
        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(outcome.fills[0].price, 10000);
        assert_eq!(outcome.fills[0].qty, 10);
        assert!(book.best_bid().is_none());
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn price_improvement_goes_to_aggressor() {
        let mut book = Book::new(1);
        book.submit(order(1, 10, Side::Sell, 10100, 10)).unwrap();
        let outcome = book.submit(order(2, 20, Side::Buy, 10200, 10)).unwrap();
        assert_eq!(outcome.fills[0].price, 10100);
    }

    #[test]
    fn fifo_within_level() {
        let mut book = Book::new(1);
        book.submit(order(1, 10, Side::Buy, 10000, 5)).unwrap();
        book.submit(order(2, 11, Side::Buy, 10000, 5)).unwrap();
        let outcome = book.submit(order(3, 20, Side::Sell, 10000, 7)).unwrap();
        assert_eq!(outcome.fills[0].maker_order_id, 1);
        assert_eq!(outcome.fills[0].qty, 5);
        assert_eq!(outcome.fills[1].maker_order_id, 2);
        assert_eq!(outcome.fills[1].qty, 2);
    }

    #[test]
    fn ioc_does_not_rest() {
        let mut book = Book::new(1);
        let mut o = order(1, 10, Side::Buy, 10000, 10);
        o.tif = TimeInForce::Ioc;
        let outcome = book.submit(o).unwrap();
        assert!(outcome.fills.is_empty());
        assert!(book.best_bid().is_none());
    }

    #[test]
    fn post_only_rejected_when_crossing() {
        let mut book = Book::new(1);
        book.submit(order(1, 10, Side::Sell, 10100, 10)).unwrap();
        let mut o = order(2, 20, Side::Buy, 10100, 5);
        o.post_only = true;
        assert!(matches!(book.submit(o), Err(BookError::WouldCross { .. })));
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut book = Book::new(1);
        book.submit(order(1, 10, Side::Buy, 10000, 10)).unwrap();
        assert!(book.cancel(1, 10, false).unwrap());
        assert!(!book.cancel(1, 10, false).unwrap());
    }

    #[test]
    fn halted_rejects_new_orders_but_allows_cancel() {
        let mut book = Book::new(1);
        book.submit(order(1, 10, Side::Buy, 10000, 10)).unwrap();
        book.set_halted(true);
        assert!(matches!(
            book.submit(order(2, 20, Side::Sell, 10000, 10)),
            Err(BookError::Halted(_))
        ));
        assert!(book.cancel(1, 10, false).unwrap());
    }
}
