//! Position and PnL accounting: VWAP cost basis, realized/unrealized PnL,
//! and settlement closeout.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{InstrumentId, Price, Qty, Side, UserId};

/// One user's open exposure in one instrument.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    /// Signed net quantity: positive is long, negative is short.
    pub net_qty: i64,
    /// Cost basis of the currently open exposure, in minor units. Undefined
    /// (left at the prior value) when `net_qty == 0`.
    pub vwap: f64,
    /// Cumulative PnL from closed trades, in display units.
    pub realized_pnl: f64,
}

impl Position {
    /// Apply a fill of `signed_qty` (positive = bought, negative = sold) at
    /// `price` (minor units), given the instrument's `tick_value` scaling
    /// factor. Handles same-direction adds, partial closes, full closes, and
    /// flips in one pass.
    pub fn apply(&mut self, signed_qty: i64, price: Price, tick_value: f64) {
        if signed_qty == 0 {
            return;
        }
        let same_direction = self.net_qty == 0
            || (self.net_qty > 0) == (signed_qty > 0);

        if same_direction {
            let old_abs = self.net_qty.unsigned_abs() as f64;
            let add_abs = signed_qty.unsigned_abs() as f64;
            self.vwap = (old_abs * self.vwap + add_abs * price as f64) / (old_abs + add_abs);
            self.net_qty += signed_qty;
            return;
        }

        let net_abs = self.net_qty.unsigned_abs() as i64;
        let signed_abs = signed_qty.unsigned_abs() as i64;
        let closing_qty = net_abs.min(signed_abs);
        let direction = if self.net_qty > 0 { 1.0 } else { -1.0 };
        self.realized_pnl +=
            (price as f64 - self.vwap) * closing_qty as f64 * direction * tick_value / 100.0;

        if signed_abs <= net_abs {
            self.net_qty += signed_qty;
            if self.net_qty == 0 {
                self.vwap = 0.0;
            }
        } else {
            let residual = signed_abs - net_abs;
            self.net_qty = residual * if signed_qty > 0 { 1 } else { -1 };
            self.vwap = price as f64;
        }
    }

    pub fn unrealized_pnl(&self, mark_price: Price, tick_value: f64) -> f64 {
        if self.net_qty == 0 {
            return 0.0;
        }
        (mark_price as f64 - self.vwap) * self.net_qty as f64 * tick_value / 100.0
    }

    pub fn total_pnl(&self, mark_price: Price, tick_value: f64) -> f64 {
        self.realized_pnl + self.unrealized_pnl(mark_price, tick_value)
    }
}

/// Per-(user, instrument) positions for one room.
#[derive(Debug, Default)]
pub struct PositionLedger {
    positions: HashMap<(UserId, InstrumentId), Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: UserId, instrument_id: InstrumentId) -> Position {
        self.positions
            .get(&(user_id, instrument_id))
            .copied()
            .unwrap_or_default()
    }

    pub fn apply_fill(
        &mut self,
        user_id: UserId,
        instrument_id: InstrumentId,
        side: Side,
        price: Price,
        qty: Qty,
        tick_value: f64,
    ) {
        let signed = match side {
            Side::Buy => qty as i64,
            Side::Sell => -(qty as i64),
        };
        self.positions
            .entry((user_id, instrument_id))
            .or_default()
            .apply(signed, price, tick_value);
    }

    /// Close every open position in `instrument_id` at settlement value
    /// `value` (used both for scalar settlement and for option expiry at
    /// its intrinsic value).
    pub fn settle_instrument(&mut self, instrument_id: InstrumentId, value: Price, tick_value: f64) {
        for ((_, inst), position) in self.positions.iter_mut() {
            if *inst != instrument_id || position.net_qty == 0 {
                continue;
            }
            let closing_signed = -position.net_qty;
            position.apply(closing_signed, value, tick_value);
        }
    }

    /// All (user, position) pairs touching `instrument_id`, including flat
    /// ones that still carry realized PnL.
    pub fn positions_for_instrument(
        &self,
        instrument_id: InstrumentId,
    ) -> impl Iterator<Item = (UserId, &Position)> {
        self.positions
            .iter()
            .filter(move |((_, inst), _)| *inst == instrument_id)
            .map(|((user, _), pos)| (*user, pos))
    }

    pub fn positions_for_user(&self, user_id: UserId) -> impl Iterator<Item = (InstrumentId, &Position)> {
        self.positions
            .iter()
            .filter(move |((user, _), _)| *user == user_id)
            .map(|((_, inst), pos)| (*inst, pos))
    }

    pub fn all(&self) -> impl Iterator<Item = ((UserId, InstrumentId), &Position)> {
        self.positions.iter().map(|(k, v)| (*k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_direction_add_updates_vwap() {
        let mut p = Position::default();
        p.apply(10, 10000, 1.0);
        p.apply(10, 10200, 1.0);
        assert_eq!(p.net_qty, 20);
        assert!((p.vwap - 10100.0).abs() < 1e-9);
    }

    #[test]
    fn closing_realizes_pnl() {
        let mut p = Position::default();
        p.apply(10, 10000, 1.0);
        p.apply(-10, 10500, 1.0);
        assert_eq!(p.net_qty, 0);
        // 5.00 display-unit price improvement on 10 units at tick_value 1.0.
        assert!((p.realized_pnl - 50.0).abs() < 1e-6);
    }

    #[test]
    fn flip_opens_new_side_at_new_price() {
        let mut p = Position::default();
        p.apply(10, 10000, 1.0);
        p.apply(-15, 10100, 1.0);
        assert_eq!(p.net_qty, -5);
        assert!((p.vwap - 10100.0).abs() < 1e-9);
        // 1.00 display-unit price improvement on the 10 units that closed.
        assert!((p.realized_pnl - 10.0).abs() < 1e-6);
    }
}
