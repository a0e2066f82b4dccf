//! Prelude module that re-exports commonly used types and traits.
//!
//! Instead of importing each type individually, you can use:
//!
//! ```rust
//! use marketpit::prelude::*;
//! ```

// Core book types
pub use crate::book::{Book, BookError, BookSnapshot, DepthLevel};

// Engine
pub use crate::engine::{Engine, FillRecord, NewOrderRequest, SubmitOutcome, TradeRecord};

// Error types
pub use crate::error::{GatewayError, Result};

// Instruments
pub use crate::instrument::{Instrument, InstrumentError, InstrumentRegistry, NewInstrument};

// Wire envelope types
pub use crate::message::{Inbound, Outbound, Role};

// Order lifecycle
pub use crate::order::{Order, OrderStatus};

// Positions and PnL
pub use crate::position::{Position, PositionLedger};

// Risk
pub use crate::risk::{RiskError, RiskGate, RiskLimits};

// Routing
pub use crate::router::{ConnectionContext, RouteOutcome, Router};

// Session coordinator
pub use crate::session::{Coordinator, JoinResult};

// Core scalar types
pub use crate::types::{
    InstrumentId, InstrumentKind, OrderId, Price, Qty, Side, TimeInForce, TradeId, UserId,
};
