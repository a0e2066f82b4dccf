//! Error taxonomy shared by the engine and the session coordinator.
//!
//! Each variant corresponds to one of the machine-readable kinds a client can
//! be told about: envelope, authN/authZ, not-found, state, risk, or internal.
//! `Internal` is the only kind that should ever cause a room to be marked
//! inactive; every other kind leaves engine state untouched.

use thiserror::Error;

/// Top-level error type returned by engine and coordinator operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("envelope error: {0}")]
    Envelope(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("wrong passcode")]
    WrongPasscode,

    #[error("exchange seat already taken in this room")]
    ExchangeSeatTaken,

    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("instrument not found: {0}")]
    InstrumentNotFound(crate::types::InstrumentId),

    #[error("order not found: {0}")]
    OrderNotFound(crate::types::OrderId),

    #[error("user not found: {0}")]
    UserNotFound(crate::types::UserId),

    #[error(transparent)]
    Book(#[from] crate::book::BookError),

    #[error(transparent)]
    Risk(#[from] crate::risk::RiskError),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether this error should abort the owning room (see Design Note on
    /// error policy: only `Internal` ever does).
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Internal(_))
    }

    /// A short machine-readable code, distinct per kind, for the wire error
    /// envelope.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Envelope(_) => "envelope",
            GatewayError::NotAuthenticated
            | GatewayError::NotAuthorized(_)
            | GatewayError::WrongPasscode
            | GatewayError::ExchangeSeatTaken => "authz",
            GatewayError::RoomNotFound(_)
            | GatewayError::InstrumentNotFound(_)
            | GatewayError::OrderNotFound(_)
            | GatewayError::UserNotFound(_) => "not_found",
            GatewayError::Book(_) => "state",
            GatewayError::Risk(_) => "risk",
            GatewayError::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
