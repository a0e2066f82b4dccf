//! Pre-trade risk checks: tick/lot alignment, submission rate, position and
//! notional limits.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::types::{Price, Qty, UserId};

#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum RiskError {
    #[error("price {price} is not a multiple of tick size {tick_size}")]
    TickMisaligned { price: Price, tick_size: Price },

    #[error("quantity {qty} is not a multiple of lot size {lot_size}")]
    LotMisaligned { qty: Qty, lot_size: Qty },

    #[error("order rate limit exceeded: {limit} per second")]
    RateLimited { limit: u32 },

    #[error("position limit exceeded: {attempted} > {limit}")]
    PositionLimit { attempted: i64, limit: i64 },

    #[error("notional limit exceeded: {attempted} > {limit}")]
    NotionalLimit { attempted: f64, limit: f64 },
}

/// Per-user limits, set on join (see the coordinator's default values).
#[derive(Debug, Clone, Copy)]
pub struct RiskLimits {
    pub max_position: i64,
    pub max_notional: f64,
    pub max_orders_per_sec: u32,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position: 10_000,
            max_notional: 1_000_000.0,
            max_orders_per_sec: 50,
        }
    }
}

/// Sliding 1-second submission-rate window per user.
#[derive(Debug, Default)]
struct RateWindow {
    timestamps: VecDeque<Instant>,
}

impl RateWindow {
    fn record_and_check(&mut self, limit: u32, now: Instant) -> bool {
        let cutoff = now.checked_sub(Duration::from_secs(1)).unwrap_or(now);
        while self.timestamps.front().is_some_and(|t| *t < cutoff) {
            self.timestamps.pop_front();
        }
        if self.timestamps.len() as u32 >= limit {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }
}

/// Per-room risk gate: holds each user's limits and rate-limit window.
#[derive(Debug, Default)]
pub struct RiskGate {
    limits: HashMap<UserId, RiskLimits>,
    windows: HashMap<UserId, RateWindow>,
}

impl RiskGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_limits(&mut self, user_id: UserId, limits: RiskLimits) {
        self.limits.insert(user_id, limits);
    }

    pub fn limits_of(&self, user_id: UserId) -> RiskLimits {
        self.limits.get(&user_id).copied().unwrap_or_default()
    }

    /// Alignment checks only (no side effects); order and quantity must be
    /// exact multiples of tick/lot size.
    pub fn check_alignment(price: Price, tick_size: Price, qty: Qty, lot_size: Qty) -> Result<(), RiskError> {
        if tick_size > 0 && price % tick_size != 0 {
            return Err(RiskError::TickMisaligned { price, tick_size });
        }
        if lot_size > 0 && qty % lot_size != 0 {
            return Err(RiskError::LotMisaligned { qty, lot_size });
        }
        Ok(())
    }

    /// Consumes one slot of the user's rate-limit window. Cancels do not
    /// count against this (only calls from order submission paths should
    /// invoke it).
    pub fn check_rate(&mut self, user_id: UserId, now: Instant) -> Result<(), RiskError> {
        let limit = self.limits_of(user_id).max_orders_per_sec;
        let window = self.windows.entry(user_id).or_default();
        if window.record_and_check(limit, now) {
            Ok(())
        } else {
            Err(RiskError::RateLimited { limit })
        }
    }

    pub fn check_position(&self, user_id: UserId, hypothetical_net_qty: i64) -> Result<(), RiskError> {
        let limit = self.limits_of(user_id).max_position;
        if hypothetical_net_qty.abs() > limit {
            return Err(RiskError::PositionLimit {
                attempted: hypothetical_net_qty,
                limit,
            });
        }
        Ok(())
    }

    pub fn check_notional(&self, user_id: UserId, hypothetical_notional: f64) -> Result<(), RiskError> {
        let limit = self.limits_of(user_id).max_notional;
        if hypothetical_notional > limit {
            return Err(RiskError::NotionalLimit {
                attempted: hypothetical_notional,
                limit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_trips_after_limit_reached() {
        let mut gate = RiskGate::new();
        gate.set_limits(1, RiskLimits { max_orders_per_sec: 2, ..Default::default() });
        let now = Instant::now();
        assert!(gate.check_rate(1, now).is_ok());
        assert!(gate.check_rate(1, now).is_ok());
        assert!(gate.check_rate(1, now).is_err());
    }

    #[test]
    fn alignment_checks() {
        assert!(RiskGate::check_alignment(100, 5, 10, 5).is_ok());
        assert!(RiskGate::check_alignment(101, 5, 10, 5).is_err());
        assert!(RiskGate::check_alignment(100, 5, 11, 5).is_err());
    }
}
