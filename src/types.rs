//! Core scalar types shared across the engine: sides, time-in-force, and the
//! minor-unit integer representations used for price and quantity.

use serde::{Deserialize, Serialize};

/// Minor-unit integer price (e.g. cents). Conversion to/from a display float
/// happens only at the wire boundary (see [`crate::message`]).
pub type Price = i64;

/// Integer quantity, always non-negative in practice.
pub type Qty = u64;

/// Room-local identifiers. Small monotonic integers, never reused.
pub type OrderId = u64;
pub type UserId = u32;
pub type InstrumentId = u32;
pub type TradeId = u64;

/// Which side of the book an order rests on or crosses against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Time-in-force. GFD rests until the room's end; IOC fills what it can and
/// discards the remainder instead of resting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    Gfd,
    Ioc,
}

impl Default for TimeInForce {
    fn default() -> Self {
        TimeInForce::Gfd
    }
}

/// The kind of instrument: a scalar underlying, or a call/put option on one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstrumentKind {
    Scalar,
    Call,
    Put,
}

impl InstrumentKind {
    pub fn is_option(self) -> bool {
        matches!(self, InstrumentKind::Call | InstrumentKind::Put)
    }
}
