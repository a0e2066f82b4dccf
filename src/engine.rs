//! The per-room engine: composes the instrument registry, one order book per
//! instrument, the position ledger, and the risk gate behind a single
//! synchronous API. An engine instance is only ever mutated by one caller at
//! a time (see the session coordinator's per-room serialization), so it
//! holds plain, non-atomic state throughout.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::book::{Book, BookSnapshot};
use crate::error::{GatewayError, Result};
use crate::instrument::{Instrument, InstrumentRegistry, NewInstrument};
use crate::order::{Order, OrderStatus};
use crate::position::{Position, PositionLedger};
use crate::risk::{RiskGate, RiskLimits};
use crate::types::{InstrumentId, OrderId, Price, Qty, Side, TimeInForce, TradeId, UserId};

/// An immutable trade record: one crossing between a buy and a sell order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: TradeId,
    pub timestamp: DateTime<Utc>,
    pub instrument_id: InstrumentId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub price: Price,
    pub quantity: Qty,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
}

/// One side of a trade, from the perspective of the user it was delivered
/// to privately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillRecord {
    pub timestamp: DateTime<Utc>,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub price: Price,
    pub quantity: Qty,
}

/// A new order request, already past envelope validation.
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub user_id: UserId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
    pub tif: TimeInForce,
    pub post_only: bool,
}

/// Result of a mutating call that can produce fills: the book
/// acknowledgment plus the fills to deliver privately to each affected user.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub remaining_qty: Qty,
    pub instrument_id: InstrumentId,
    pub fills: Vec<FillRecord>,
    pub affected_users: Vec<UserId>,
}

/// Result of settling one instrument: its id and the value it settled at
/// (the underlying spot for a scalar, or the intrinsic value paid out for
/// an option).
#[derive(Debug, Clone, Copy)]
pub struct SettledInstrument {
    pub instrument_id: InstrumentId,
    pub value: Price,
}

pub struct Engine {
    instruments: InstrumentRegistry,
    books: HashMap<InstrumentId, Book>,
    positions: PositionLedger,
    risk: RiskGate,
    orders: HashMap<OrderId, Order>,
    next_order_id: OrderId,
    next_trade_id: TradeId,
    next_sequence: u64,
    trades: Vec<TradeRecord>,
    fills: Vec<FillRecord>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            instruments: InstrumentRegistry::new(),
            books: HashMap::new(),
            positions: PositionLedger::new(),
            risk: RiskGate::new(),
            orders: HashMap::new(),
            next_order_id: 1,
            next_trade_id: 1,
            next_sequence: 1,
            trades: Vec::new(),
            fills: Vec::new(),
        }
    }

    pub fn set_risk_limits(&mut self, user_id: UserId, limits: RiskLimits) {
        self.risk.set_limits(user_id, limits);
    }

    pub fn add_instrument(&mut self, spec: NewInstrument) -> Result<InstrumentId> {
        let id = self
            .instruments
            .add(spec)
            .map_err(|e| GatewayError::Envelope(e.to_string()))?;
        self.books.insert(id, Book::new(id));
        info!(instrument_id = id, "instrument added");
        Ok(id)
    }

    pub fn instrument(&self, id: InstrumentId) -> Result<&Instrument> {
        self.instruments.get(id).ok_or(GatewayError::InstrumentNotFound(id))
    }

    pub fn list_instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.list()
    }

    pub fn set_halted(&mut self, id: InstrumentId, halted: bool) -> Result<()> {
        self.instruments
            .set_halted(id, halted)
            .ok_or(GatewayError::InstrumentNotFound(id))?;
        self.books
            .get_mut(&id)
            .ok_or(GatewayError::InstrumentNotFound(id))?
            .set_halted(halted);
        Ok(())
    }

    /// Precondition: the caller has already pulled all live quotes for
    /// `id` (see [`Engine::pull_quotes`]); resting orders are never
    /// implicitly re-quantized.
    pub fn update_tick_size(&mut self, id: InstrumentId, tick_size: Price) -> Result<()> {
        self.instruments
            .set_tick_size(id, tick_size)
            .ok_or(GatewayError::InstrumentNotFound(id))?;
        Ok(())
    }

    /// Mark `mark_price` (minor units) for `instrument_id`: the book's last
    /// trade price if one exists, else the mid, else the settlement value if
    /// already settled.
    fn mark_price(&self, instrument_id: InstrumentId) -> Price {
        let book = match self.books.get(&instrument_id) {
            Some(b) => b,
            None => return 0,
        };
        if let Some(last) = book.last_trade_price() {
            return last;
        }
        match (book.best_bid(), book.best_ask()) {
            (Some(b), Some(a)) => (b + a) / 2,
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => 0,
        }
    }

    #[instrument(skip(self))]
    pub fn submit_order(&mut self, req: NewOrderRequest) -> Result<SubmitOutcome> {
        let instrument = self.instrument(req.instrument_id)?.clone();
        if instrument.is_settled() {
            return Err(GatewayError::Book(crate::book::BookError::Settled(req.instrument_id)));
        }

        crate::risk::RiskGate::check_alignment(req.price, instrument.tick_size, req.qty, instrument.lot_size)?;
        self.risk.check_rate(req.user_id, Instant::now())?;

        let current = self.positions.get(req.user_id, req.instrument_id);
        let signed = match req.side {
            Side::Buy => req.qty as i64,
            Side::Sell => -(req.qty as i64),
        };
        let hypothetical_qty = current.net_qty + signed;
        self.risk.check_position(req.user_id, hypothetical_qty)?;
        let mark = self.mark_price(req.instrument_id).max(req.price);
        let hypothetical_notional = hypothetical_qty.unsigned_abs() as f64 * mark as f64 / 100.0;
        self.risk.check_notional(req.user_id, hypothetical_notional)?;

        let order_id = self.next_order_id;
        self.next_order_id += 1;
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;

        let order = Order {
            order_id,
            user_id: req.user_id,
            instrument_id: req.instrument_id,
            side: req.side,
            limit_price: req.price,
            original_qty: req.qty,
            remaining_qty: req.qty,
            tif: req.tif,
            post_only: req.post_only,
            sequence_number,
            status: OrderStatus::Live,
        };

        let book = self
            .books
            .get_mut(&req.instrument_id)
            .ok_or(GatewayError::InstrumentNotFound(req.instrument_id))?;
        let outcome = book.submit(order.clone())?;

        let (fills, affected_users) = self.record_fills(req.instrument_id, &instrument, &outcome);

        let total_filled: Qty = outcome.fills.iter().map(|f| f.qty).sum();
        let final_status = if outcome.rested_qty > 0 {
            OrderStatus::Live
        } else if total_filled >= req.qty {
            OrderStatus::Filled
        } else {
            // IOC with an unfilled remainder: discarded, not rested.
            OrderStatus::Cancelled
        };
        let remaining_qty = outcome.rested_qty;
        self.orders.insert(order_id, {
            let mut stored = order;
            stored.remaining_qty = remaining_qty;
            stored.status = final_status;
            stored
        });

        Ok(SubmitOutcome {
            order_id,
            status: final_status,
            remaining_qty,
            instrument_id: req.instrument_id,
            fills,
            affected_users,
        })
    }

    fn record_fills(
        &mut self,
        instrument_id: InstrumentId,
        instrument: &Instrument,
        outcome: &crate::book::MatchOutcome,
    ) -> (Vec<FillRecord>, Vec<UserId>) {
        let mut fills = Vec::new();
        let mut affected = Vec::new();
        for raw in &outcome.fills {
            let trade_id = self.next_trade_id;
            self.next_trade_id += 1;
            let now = Utc::now();

            let (buy_order_id, sell_order_id, buyer_id, seller_id) = match raw.taker_side {
                Side::Buy => (raw.taker_order_id, raw.maker_order_id, raw.taker_user_id, raw.maker_user_id),
                Side::Sell => (raw.maker_order_id, raw.taker_order_id, raw.maker_user_id, raw.taker_user_id),
            };

            self.trades.push(TradeRecord {
                trade_id,
                timestamp: now,
                instrument_id,
                buyer_id,
                seller_id,
                price: raw.price,
                quantity: raw.qty,
                buy_order_id,
                sell_order_id,
            });

            for (order_id, user_id, side) in [
                (raw.maker_order_id, raw.maker_user_id, raw.taker_side.opposite()),
                (raw.taker_order_id, raw.taker_user_id, raw.taker_side),
            ] {
                let fill = FillRecord {
                    timestamp: now,
                    order_id,
                    user_id,
                    instrument_id,
                    side,
                    price: raw.price,
                    quantity: raw.qty,
                };
                self.fills.push(fill.clone());
                fills.push(fill);
                if !affected.contains(&user_id) {
                    affected.push(user_id);
                }
                self.positions
                    .apply_fill(user_id, instrument_id, side, raw.price, raw.qty, instrument.tick_value);
                if let Some(o) = self.orders.get_mut(&order_id) {
                    o.apply_fill(raw.qty);
                }
            }
        }
        (fills, affected)
    }

    /// Cancel of a terminal or unknown order id returns `false` rather than
    /// erroring; only ownership/halted-instrument failures raise.
    pub fn cancel_order(&mut self, order_id: OrderId, caller: UserId, is_admin: bool) -> Result<bool> {
        let Some(instrument_id) = self.orders.get(&order_id).map(|o| o.instrument_id) else {
            return Ok(false);
        };
        let book = self
            .books
            .get_mut(&instrument_id)
            .ok_or(GatewayError::InstrumentNotFound(instrument_id))?;
        let cancelled = book.cancel(order_id, caller, is_admin)?;
        if cancelled {
            if let Some(o) = self.orders.get_mut(&order_id) {
                o.cancel();
            }
        }
        Ok(cancelled)
    }

    /// Cancel every live order owned by `user_id`, across all instruments.
    /// Returns the set of instruments that had at least one order removed
    /// (so the coordinator knows which books to re-broadcast).
    pub fn cancel_all(&mut self, user_id: UserId) -> Vec<InstrumentId> {
        let mut touched = Vec::new();
        for (instrument_id, book) in self.books.iter_mut() {
            let ids: Vec<OrderId> = book
                .orders()
                .filter(|o| o.user_id == user_id)
                .map(|o| o.order_id)
                .collect();
            if ids.is_empty() {
                continue;
            }
            for id in &ids {
                let _ = book.cancel(*id, user_id, false);
            }
            touched.push(*instrument_id);
        }
        for id in &touched {
            for order in self.orders.values_mut() {
                if order.instrument_id == *id && order.user_id == user_id && order.is_live() {
                    order.cancel();
                }
            }
        }
        touched
    }

    /// Admin pull: cancel specific order ids within one instrument
    /// regardless of which user submitted them. Returns how many were
    /// actually live.
    pub fn cancel_inst(&mut self, instrument_id: InstrumentId, order_ids: &[OrderId], admin: UserId) -> Result<usize> {
        let book = self
            .books
            .get_mut(&instrument_id)
            .ok_or(GatewayError::InstrumentNotFound(instrument_id))?;
        let mut count = 0;
        for &id in order_ids {
            if book.cancel(id, admin, true)? {
                count += 1;
                if let Some(o) = self.orders.get_mut(&id) {
                    o.cancel();
                }
            }
        }
        Ok(count)
    }

    /// Admin pull of every live order in one instrument (used before a
    /// tick-size change and by the explicit `pull_quotes` op).
    pub fn pull_quotes(&mut self, instrument_id: InstrumentId, admin: UserId) -> Result<usize> {
        let ids = {
            let book = self
                .books
                .get(&instrument_id)
                .ok_or(GatewayError::InstrumentNotFound(instrument_id))?;
            book.live_order_ids()
        };
        self.cancel_inst(instrument_id, &ids, admin)
    }

    pub fn replace_order(
        &mut self,
        order_id: OrderId,
        caller: UserId,
        new_price: Option<Price>,
        new_qty: Option<Qty>,
    ) -> Result<SubmitOutcome> {
        let existing = self.orders.get(&order_id).cloned().ok_or(GatewayError::OrderNotFound(order_id))?;
        let instrument_id = existing.instrument_id;
        let instrument = self.instrument(instrument_id)?.clone();
        if let Some(price) = new_price {
            if instrument.tick_size > 0 && price % instrument.tick_size != 0 {
                return Err(GatewayError::Risk(crate::risk::RiskError::TickMisaligned {
                    price,
                    tick_size: instrument.tick_size,
                }));
            }
        }
        if let Some(qty) = new_qty {
            if instrument.lot_size > 0 && qty % instrument.lot_size != 0 {
                return Err(GatewayError::Risk(crate::risk::RiskError::LotMisaligned {
                    qty,
                    lot_size: instrument.lot_size,
                }));
            }
        }

        // Re-validate position/notional limits against the replacement as if
        // it were a fresh submission, the same gate `submit_order` runs.
        let effective_price = new_price.unwrap_or(existing.limit_price);
        let effective_qty = new_qty.unwrap_or(existing.original_qty);
        let current = self.positions.get(existing.user_id, instrument_id);
        let signed = match existing.side {
            Side::Buy => effective_qty as i64,
            Side::Sell => -(effective_qty as i64),
        };
        let hypothetical_qty = current.net_qty + signed;
        self.risk.check_position(existing.user_id, hypothetical_qty)?;
        let mark = self.mark_price(instrument_id).max(effective_price);
        let hypothetical_notional = hypothetical_qty.unsigned_abs() as f64 * mark as f64 / 100.0;
        self.risk.check_notional(existing.user_id, hypothetical_notional)?;

        let book = self
            .books
            .get_mut(&instrument_id)
            .ok_or(GatewayError::InstrumentNotFound(instrument_id))?;
        let outcome = book.replace(order_id, caller, new_price, new_qty)?;
        let (fills, affected_users) = self.record_fills(instrument_id, &instrument, &outcome);
        let status = if outcome.rested_qty > 0 {
            OrderStatus::Live
        } else {
            OrderStatus::Filled
        };
        if let Some(stored) = self.orders.get_mut(&order_id) {
            if let Some(price) = new_price {
                stored.limit_price = price;
            }
            if let Some(qty) = new_qty {
                stored.original_qty = qty;
            }
            stored.remaining_qty = outcome.rested_qty;
            stored.status = status;
        }
        Ok(SubmitOutcome {
            order_id,
            status,
            remaining_qty: outcome.rested_qty,
            instrument_id,
            fills,
            affected_users,
        })
    }

    /// Settle a scalar at `value`, cascading to every CALL/PUT that
    /// references it (settled at the same underlying value, paid at
    /// intrinsic). Returns every instrument settled, primary first.
    pub fn settle(&mut self, instrument_id: InstrumentId, value: Price) -> Result<Vec<SettledInstrument>> {
        let instrument = self.instrument(instrument_id)?.clone();
        if instrument.kind.is_option() {
            warn!(instrument_id, "settle called directly on an option; treating value as its own settlement");
        }
        let mut settled = Vec::new();
        self.settle_one(instrument_id, value)?;
        settled.push(SettledInstrument { instrument_id, value });

        if !instrument.kind.is_option() {
            for option_id in self.instruments.options_referencing(instrument_id) {
                let option = self.instrument(option_id)?.clone();
                let intrinsic = option.intrinsic(value);
                self.settle_one(option_id, intrinsic)?;
                settled.push(SettledInstrument {
                    instrument_id: option_id,
                    value: intrinsic,
                });
            }
        }
        Ok(settled)
    }

    /// Directly settle one option at `spot_price`'s intrinsic value,
    /// without cascading (used by the standalone `expire_option` op).
    pub fn expire_option(&mut self, instrument_id: InstrumentId, spot_price: Price) -> Result<SettledInstrument> {
        let option = self.instrument(instrument_id)?.clone();
        let intrinsic = option.intrinsic(spot_price);
        self.settle_one(instrument_id, intrinsic)?;
        Ok(SettledInstrument {
            instrument_id,
            value: intrinsic,
        })
    }

    fn settle_one(&mut self, instrument_id: InstrumentId, value: Price) -> Result<()> {
        let instrument = self.instrument(instrument_id)?.clone();
        self.instruments
            .settle(instrument_id, value)
            .ok_or(GatewayError::InstrumentNotFound(instrument_id))?;
        if let Some(book) = self.books.get_mut(&instrument_id) {
            book.set_settled();
        }
        self.positions.settle_instrument(instrument_id, value, instrument.tick_value);
        info!(instrument_id, value, "instrument settled");
        Ok(())
    }

    pub fn snapshot(&self, instrument_id: InstrumentId, depth: usize) -> Result<BookSnapshot> {
        self.books
            .get(&instrument_id)
            .map(|b| b.snapshot(depth))
            .ok_or(GatewayError::InstrumentNotFound(instrument_id))
    }

    pub fn all_instrument_ids(&self) -> Vec<InstrumentId> {
        self.books.keys().copied().collect()
    }

    pub fn position_of(&self, user_id: UserId, instrument_id: InstrumentId) -> Position {
        self.positions.get(user_id, instrument_id)
    }

    pub fn positions_of_user(&self, user_id: UserId) -> Vec<(InstrumentId, Position, f64)> {
        self.positions
            .positions_for_user(user_id)
            .map(|(inst, pos)| {
                let mark = self.mark_price(inst);
                let tick_value = self.instrument(inst).map(|i| i.tick_value).unwrap_or(1.0);
                (inst, *pos, pos.total_pnl(mark, tick_value))
            })
            .collect()
    }

    pub fn total_pnl_of_user(&self, user_id: UserId) -> f64 {
        self.positions_of_user(user_id).iter().map(|(_, _, pnl)| pnl).sum()
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn fills(&self) -> &[FillRecord] {
        &self.fills
    }

    pub fn all_positions(&self) -> impl Iterator<Item = ((UserId, InstrumentId), &Position)> {
        self.positions.all()
    }
}
