//! Order book error types.

use thiserror::Error;

use crate::types::{InstrumentId, OrderId, Price};

/// Errors raised by [`super::Book`] operations. These map onto the `State`
/// and `Risk` kinds of [`crate::error::GatewayError`]; the book itself knows
/// nothing about rate limits or position limits, only book-local invariants.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BookError {
    #[error("instrument {0} is halted")]
    Halted(InstrumentId),

    #[error("instrument {0} is settled")]
    Settled(InstrumentId),

    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("user {caller} may not modify order {order_id} owned by {owner}")]
    NotOwner {
        order_id: OrderId,
        caller: crate::types::UserId,
        owner: crate::types::UserId,
    },

    #[error("post_only order at {price} would cross the book")]
    WouldCross { price: Price },
}
