//! Read-only views of a book's current state, used both for the periodic
//! market-data ticker and for reactive post-mutation broadcasts.

use serde::{Deserialize, Serialize};

use crate::types::{InstrumentId, Price, Qty};

/// One rung of the ladder: a price and the total resting quantity there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Price,
    pub qty: Qty,
}

/// A snapshot of one instrument's book, optionally truncated to `depth`
/// levels per side (the periodic ticker uses depth 5; reactive broadcasts
/// may pass `usize::MAX` for full depth).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub instrument_id: InstrumentId,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub last_price: Option<Price>,
}

impl BookSnapshot {
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((b as f64 + a as f64) / 2.0),
            _ => None,
        }
    }
}
