//! Wire envelope types: one `serde`-tagged enum for inbound operations, one
//! for outbound events. Prices cross the wire as decimal display units and
//! are converted to/from minor-unit integers right here, at the boundary.

use serde::{Deserialize, Serialize};

use crate::instrument::Instrument;
use crate::order::OrderStatus;
use crate::types::{InstrumentId, OrderId, Price, Qty, Side, TimeInForce, UserId};

/// Convert a wire-level decimal price to the engine's minor-unit integer
/// representation.
pub fn to_minor(display: f64) -> Price {
    (display * 100.0).round() as Price
}

/// Convert a minor-unit integer price back to wire-level decimal.
pub fn to_display(minor: Price) -> f64 {
    minor as f64 / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Exchange,
    Trader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInstrumentWire {
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: crate::types::InstrumentKind,
    pub tick_size: f64,
    pub lot_size: Qty,
    pub tick_value: f64,
    pub strike: Option<f64>,
    pub reference_id: Option<InstrumentId>,
}

/// An inbound operation envelope, tagged by its `op` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Inbound {
    CreateRoom { passcode: Option<String> },
    Join { room: String, name: String, role: Role, passcode: Option<String> },
    Ping { timestamp: f64 },
    AddInstrument(NewInstrumentWire),
    OrderNew {
        inst: InstrumentId,
        side: Side,
        price: f64,
        qty: Qty,
        tif: TimeInForce,
        #[serde(default)]
        post_only: bool,
    },
    Cancel { order_id: OrderId, inst: InstrumentId },
    CancelAll {},
    CancelInst { inst: InstrumentId, order_ids: Vec<OrderId> },
    Replace { order_id: OrderId, price: Option<f64>, qty: Option<Qty> },
    Settle { inst: InstrumentId, value: f64 },
    Halt { inst: InstrumentId, on: bool },
    UpdateTickSize { instrument_id: InstrumentId, tick_size: f64 },
    ExpireOption { inst: InstrumentId, spot_price: f64 },
    PullQuotes { inst: InstrumentId },
    GetSnapshot { inst: Option<InstrumentId> },
    GetPositions { inst: Option<InstrumentId> },
    GetPnl {},
    ExportData {},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentView {
    pub instrument_id: InstrumentId,
    pub symbol: String,
    pub kind: crate::types::InstrumentKind,
    pub tick_size: f64,
    pub lot_size: Qty,
    pub halted: bool,
}

impl From<&Instrument> for InstrumentView {
    fn from(i: &Instrument) -> Self {
        Self {
            instrument_id: i.instrument_id,
            symbol: i.symbol.clone(),
            kind: i.kind,
            tick_size: to_display(i.tick_size),
            lot_size: i.lot_size,
            halted: i.halted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthLevelView {
    pub price: f64,
    pub size: Qty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionView {
    pub instrument_id: InstrumentId,
    pub net_qty: i64,
    pub vwap: f64,
    pub pnl: f64,
}

/// An outbound event, tagged by its `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    RoomCreated { room_code: String },
    JoinAck {
        user_id: UserId,
        role: Role,
        resume_token: String,
        room_code: String,
        instruments: Vec<InstrumentView>,
    },
    Pong { timestamp: f64, server_time: f64 },
    InstrumentAdded { instrument: InstrumentView },
    OrderAck { order_id: OrderId, status: OrderStatus, remaining_qty: Qty },
    Fill {
        order_id: OrderId,
        instrument_id: InstrumentId,
        side: Side,
        price: f64,
        qty: Qty,
    },
    Positions { positions: Vec<PositionView> },
    Pnl { total_pnl: f64, positions: Vec<PositionView> },
    MdInc {
        inst: InstrumentId,
        bids: Vec<DepthLevelView>,
        asks: Vec<DepthLevelView>,
        last: Option<f64>,
        ts: f64,
    },
    CancelAck { order_id: OrderId, cancelled: bool },
    CancelAllAck { cancelled_instruments: Vec<InstrumentId> },
    CancelInstAck { inst: InstrumentId, cancelled: usize },
    ReplaceAck { order_id: OrderId, status: OrderStatus, remaining_qty: Qty },
    Settlement { inst: InstrumentId, value: f64 },
    OptionExpired { inst: InstrumentId, spot_price: f64, reason: String },
    Halt { inst: InstrumentId, on: bool },
    TickSizeUpdated { instrument_id: InstrumentId, tick_size: f64 },
    QuotesPulled { inst: InstrumentId, reason: String },
    Error { message: String, code: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_conversion_round_trips() {
        assert_eq!(to_minor(100.01), 10001);
        assert_eq!(to_display(10001), 100.01);
    }

    #[test]
    fn order_new_deserializes_from_op_tag() {
        let raw = r#"{"op":"order_new","inst":1,"side":"buy","price":100.5,"qty":10,"tif":"GFD"}"#;
        let msg: Inbound = serde_json::from_str(raw).unwrap();
        matches!(msg, Inbound::OrderNew { .. });
    }
}
