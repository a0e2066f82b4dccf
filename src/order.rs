//! The resting/aggressing order record and its lifecycle.

use serde::{Deserialize, Serialize};

use crate::types::{InstrumentId, OrderId, Price, Qty, Side, TimeInForce, UserId};

/// Lifecycle state of an order. Terminal states (`Filled`, `Cancelled`) are
/// permanent: an order_id is never reused and never transitions back to
/// `Live`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Live,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

/// A single order: either resting in a [`crate::level::PriceLevel`] or the
/// incoming aggressor being matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub limit_price: Price,
    pub original_qty: Qty,
    pub remaining_qty: Qty,
    pub tif: TimeInForce,
    pub post_only: bool,
    /// Monotonic, engine-wide. The sole tiebreaker for time priority among
    /// orders resting at the same price.
    pub sequence_number: u64,
    pub status: OrderStatus,
}

impl Order {
    pub fn is_live(&self) -> bool {
        self.status == OrderStatus::Live && self.remaining_qty > 0
    }

    /// Reduce remaining quantity by `qty`, flipping to `Filled` once it
    /// reaches zero. `qty` must not exceed `remaining_qty`.
    pub fn apply_fill(&mut self, qty: Qty) {
        debug_assert!(qty <= self.remaining_qty);
        self.remaining_qty = self.remaining_qty.saturating_sub(qty);
        if self.remaining_qty == 0 {
            self.status = OrderStatus::Filled;
        }
    }

    pub fn cancel(&mut self) {
        if !self.status.is_terminal() {
            self.status = OrderStatus::Cancelled;
            self.remaining_qty = 0;
        }
    }
}
