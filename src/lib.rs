//! # marketpit
//!
//! A multi-room real-time market-making trading simulator: a price-time
//! priority limit order book and settlement engine per room, hosted behind
//! a session coordinator that manages membership, roles, and market-data
//! fan-out.
//!
//! ## Layout
//!
//! - [`book`] — the price-time priority matching engine for one instrument.
//! - [`instrument`] — scalar and option instrument definitions per room.
//! - [`position`] — VWAP cost basis and realized/unrealized PnL.
//! - [`risk`] — pre-trade tick/lot/rate/position/notional checks.
//! - [`engine`] — composes the above behind one room's synchronous API.
//! - [`session`] — room registry, membership, and broadcast fan-out.
//! - [`message`] — the wire envelope types.
//! - [`router`] — marshals envelopes into coordinator calls.
//! - [`export`] — CSV export of a room's history on shutdown.

pub mod book;
pub mod engine;
pub mod error;
pub mod export;
pub mod instrument;
pub mod level;
pub mod message;
pub mod order;
pub mod position;
pub mod prelude;
pub mod risk;
pub mod router;
pub mod session;
pub mod types;
