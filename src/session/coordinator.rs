//! The session coordinator: room registry, join/leave, role authority, and
//! the private/public broadcast fan-out after every mutation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{info, warn};

use crate::engine::{NewOrderRequest, SubmitOutcome};
use crate::error::{GatewayError, Result};
use crate::instrument::NewInstrument;
use crate::message::{DepthLevelView, InstrumentView, Outbound, PositionView, Role};
use crate::risk::RiskLimits;
use crate::session::room::{RoomHandle, RoomState};
use crate::session::user::User;
use crate::types::{InstrumentId, OrderId, Price, Qty, TimeInForce, UserId};

const TICKER_PERIOD: Duration = Duration::from_millis(50);
const TICKER_DEPTH: usize = 5;

fn generate_room_code() -> String {
    let bytes: [u8; 3] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

pub struct JoinResult {
    pub user_id: UserId,
    pub role: Role,
    pub resume_token: String,
    pub room_code: String,
    pub instruments: Vec<InstrumentView>,
    pub receiver: UnboundedReceiver<Outbound>,
}

/// Global registry of rooms. Looked up concurrently by every connection
/// task, so it is a `DashMap` (structural exclusion only on create/remove);
/// each room's own mutable state lives behind its own `tokio::sync::Mutex`.
pub struct Coordinator {
    rooms: DashMap<String, Arc<RoomHandle>>,
    export_dir: PathBuf,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(PathBuf::from("exports"))
    }
}

impl Coordinator {
    pub fn new(export_dir: PathBuf) -> Self {
        Self {
            rooms: DashMap::new(),
            export_dir,
        }
    }

    pub fn create_room(&self, passcode: Option<String>) -> String {
        loop {
            let code = generate_room_code();
            if self.rooms.contains_key(&code) {
                continue;
            }
            self.rooms.insert(code.clone(), Arc::new(RoomHandle::new(code.clone(), passcode)));
            info!(room_code = %code, "room created");
            return code;
        }
    }

    fn room(&self, room_code: &str) -> Result<Arc<RoomHandle>> {
        self.rooms
            .get(room_code)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| GatewayError::RoomNotFound(room_code.to_string()))
    }

    pub async fn join(
        &self,
        room_code: &str,
        name: String,
        role: Role,
        passcode: Option<String>,
    ) -> Result<JoinResult> {
        let room = self.room(room_code)?;
        if !room.passcode_matches(&passcode) {
            return Err(GatewayError::WrongPasscode);
        }

        let mut state = room.state.lock().await;
        if role == Role::Exchange && !state.exchange_seat_free() {
            return Err(GatewayError::ExchangeSeatTaken);
        }

        let user_id = state.next_user_id;
        state.next_user_id += 1;
        if role == Role::Exchange {
            state.exchange_user_id = Some(user_id);
        }
        state.engine.set_risk_limits(user_id, RiskLimits::default());

        let (tx, rx) = mpsc::unbounded_channel();
        let resume_token = {
            let raw: [u8; 16] = rand::rng().random();
            raw.iter().map(|b| format!("{b:02x}")).collect::<String>()
        };
        state.users.insert(
            user_id,
            User {
                user_id,
                name,
                role,
                resume_token: resume_token.clone(),
                joined_at: Utc::now(),
                outbox: tx,
            },
        );

        let instruments: Vec<InstrumentView> = state.engine.list_instruments().map(InstrumentView::from).collect();
        drop(state);

        self.ensure_ticker(&room).await;

        Ok(JoinResult {
            user_id,
            role,
            resume_token,
            room_code: room_code.to_string(),
            instruments,
            receiver: rx,
        })
    }

    /// Departed users' resting orders are intentionally left live; only
    /// membership is removed.
    pub async fn leave(&self, room_code: &str, user_id: UserId) -> Result<()> {
        let room = self.room(room_code)?;
        let mut state = room.state.lock().await;
        state.users.remove(&user_id);
        if state.exchange_user_id == Some(user_id) {
            state.exchange_user_id = None;
        }
        if state.users.is_empty() {
            state.is_active = false;
            drop(state);
            let mut ticker = room.ticker.lock().await;
            if let Some(handle) = ticker.take() {
                handle.abort();
            }
        }
        Ok(())
    }

    async fn ensure_ticker(&self, room: &Arc<RoomHandle>) {
        let mut ticker = room.ticker.lock().await;
        if ticker.is_some() {
            return;
        }
        let room = room.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICKER_PERIOD);
            loop {
                interval.tick().await;
                let state = room.state.lock().await;
                if !state.is_active {
                    break;
                }
                for inst in state.engine.all_instrument_ids() {
                    if let Ok(snapshot) = state.engine.snapshot(inst, TICKER_DEPTH) {
                        let event = Outbound::MdInc {
                            inst,
                            bids: snapshot.bids.iter().map(|l| DepthLevelView { price: crate::message::to_display(l.price), size: l.qty }).collect(),
                            asks: snapshot.asks.iter().map(|l| DepthLevelView { price: crate::message::to_display(l.price), size: l.qty }).collect(),
                            last: snapshot.last_price.map(crate::message::to_display),
                            ts: Utc::now().timestamp_millis() as f64 / 1000.0,
                        };
                        broadcast(&state, event);
                    }
                }
            }
        });
        *ticker = Some(handle);
    }

    // -- authority helpers -------------------------------------------------

    fn require_admin(state: &RoomState, user_id: UserId) -> Result<()> {
        if state.is_admin(user_id) {
            Ok(())
        } else {
            Err(GatewayError::NotAuthorized("operation requires the exchange role".into()))
        }
    }

    // -- order operations ---------------------------------------------------

    pub async fn submit_order(
        &self,
        room_code: &str,
        user_id: UserId,
        instrument_id: InstrumentId,
        side: crate::types::Side,
        price: Price,
        qty: Qty,
        tif: TimeInForce,
        post_only: bool,
    ) -> Result<()> {
        let room = self.room(room_code)?;
        let mut state = room.state.lock().await;
        let result = state.engine.submit_order(NewOrderRequest {
            user_id,
            instrument_id,
            side,
            price,
            qty,
            tif,
            post_only,
        });
        match result {
            Ok(outcome) => {
                self.deliver_outcome(&mut state, user_id, &outcome, |o| Outbound::OrderAck {
                    order_id: o.order_id,
                    status: o.status,
                    remaining_qty: o.remaining_qty,
                });
                self.broadcast_md_inc(&state, instrument_id);
                Ok(())
            }
            Err(err) => {
                send_private_error(&state, user_id, &err);
                Err(err)
            }
        }
    }

    pub async fn cancel(&self, room_code: &str, user_id: UserId, order_id: OrderId, instrument_id: InstrumentId) -> Result<()> {
        let room = self.room(room_code)?;
        let mut state = room.state.lock().await;
        match state.engine.cancel_order(order_id, user_id, false) {
            Ok(cancelled) => {
                send_private(&state, user_id, Outbound::CancelAck { order_id, cancelled });
                self.broadcast_md_inc(&state, instrument_id);
                Ok(())
            }
            Err(err) => {
                send_private_error(&state, user_id, &err);
                Err(err)
            }
        }
    }

    pub async fn cancel_all(&self, room_code: &str, user_id: UserId) -> Result<()> {
        let room = self.room(room_code)?;
        let mut state = room.state.lock().await;
        let touched = state.engine.cancel_all(user_id);
        send_private(&state, user_id, Outbound::CancelAllAck { cancelled_instruments: touched.clone() });
        for inst in touched {
            self.broadcast_md_inc(&state, inst);
        }
        Ok(())
    }

    pub async fn cancel_inst(&self, room_code: &str, user_id: UserId, instrument_id: InstrumentId, order_ids: Vec<OrderId>) -> Result<()> {
        let room = self.room(room_code)?;
        let mut state = room.state.lock().await;
        if let Err(err) = Self::require_admin(&state, user_id) {
            send_private_error(&state, user_id, &err);
            return Err(err);
        }
        match state.engine.cancel_inst(instrument_id, &order_ids, user_id) {
            Ok(cancelled) => {
                send_private(&state, user_id, Outbound::CancelInstAck { inst: instrument_id, cancelled });
                self.broadcast_md_inc(&state, instrument_id);
                Ok(())
            }
            Err(err) => {
                send_private_error(&state, user_id, &err);
                Err(err)
            }
        }
    }

    pub async fn pull_quotes(&self, room_code: &str, user_id: UserId, instrument_id: InstrumentId) -> Result<()> {
        let room = self.room(room_code)?;
        let mut state = room.state.lock().await;
        if let Err(err) = Self::require_admin(&state, user_id) {
            send_private_error(&state, user_id, &err);
            return Err(err);
        }
        state.engine.pull_quotes(instrument_id, user_id)?;
        broadcast(&state, Outbound::QuotesPulled { inst: instrument_id, reason: "manual_pull".into() });
        self.broadcast_md_inc(&state, instrument_id);
        Ok(())
    }

    pub async fn replace(&self, room_code: &str, user_id: UserId, order_id: OrderId, price: Option<Price>, qty: Option<Qty>) -> Result<()> {
        let room = self.room(room_code)?;
        let mut state = room.state.lock().await;
        match state.engine.replace_order(order_id, user_id, price, qty) {
            Ok(outcome) => {
                self.deliver_outcome(&mut state, user_id, &outcome, |o| Outbound::ReplaceAck {
                    order_id: o.order_id,
                    status: o.status,
                    remaining_qty: o.remaining_qty,
                });
                self.broadcast_md_inc(&state, outcome.instrument_id);
                Ok(())
            }
            Err(err) => {
                send_private_error(&state, user_id, &err);
                Err(err)
            }
        }
    }

    // -- admin instrument operations -----------------------------------

    pub async fn add_instrument(&self, room_code: &str, user_id: UserId, spec: NewInstrument) -> Result<InstrumentId> {
        let room = self.room(room_code)?;
        let mut state = room.state.lock().await;
        if let Err(err) = Self::require_admin(&state, user_id) {
            send_private_error(&state, user_id, &err);
            return Err(err);
        }
        let id = state.engine.add_instrument(spec)?;
        let view = InstrumentView::from(state.engine.instrument(id)?);
        broadcast(&state, Outbound::InstrumentAdded { instrument: view });
        Ok(id)
    }

    pub async fn halt(&self, room_code: &str, user_id: UserId, instrument_id: InstrumentId, on: bool) -> Result<()> {
        let room = self.room(room_code)?;
        let mut state = room.state.lock().await;
        if let Err(err) = Self::require_admin(&state, user_id) {
            send_private_error(&state, user_id, &err);
            return Err(err);
        }
        state.engine.set_halted(instrument_id, on)?;
        broadcast(&state, Outbound::Halt { inst: instrument_id, on });
        Ok(())
    }

    /// Per the wire contract: pulls all live quotes for the instrument
    /// first, broadcasts that, then applies and broadcasts the tick-size
    /// change, then an (empty) market-data refresh.
    pub async fn update_tick_size(&self, room_code: &str, user_id: UserId, instrument_id: InstrumentId, tick_size: Price) -> Result<()> {
        let room = self.room(room_code)?;
        let mut state = room.state.lock().await;
        if let Err(err) = Self::require_admin(&state, user_id) {
            send_private_error(&state, user_id, &err);
            return Err(err);
        }
        state.engine.pull_quotes(instrument_id, user_id)?;
        broadcast(&state, Outbound::QuotesPulled { inst: instrument_id, reason: "tick_size_change".into() });
        state.engine.update_tick_size(instrument_id, tick_size)?;
        broadcast(&state, Outbound::TickSizeUpdated { instrument_id, tick_size: crate::message::to_display(tick_size) });
        self.broadcast_md_inc(&state, instrument_id);
        Ok(())
    }

    /// Settle a scalar (cascading to referencing options) or settle an
    /// option directly; broadcasts `option_expired` per cascaded option
    /// followed by the primary `settlement`, then refreshes positions/PnL
    /// for every user in the room.
    pub async fn settle(&self, room_code: &str, user_id: UserId, instrument_id: InstrumentId, value: Price) -> Result<()> {
        let room = self.room(room_code)?;
        let mut state = room.state.lock().await;
        if let Err(err) = Self::require_admin(&state, user_id) {
            send_private_error(&state, user_id, &err);
            return Err(err);
        }
        let settled = state.engine.settle(instrument_id, value)?;
        for s in settled.iter().skip(1) {
            broadcast(&state, Outbound::OptionExpired {
                inst: s.instrument_id,
                spot_price: crate::message::to_display(value),
                reason: "underlying_settled".into(),
            });
        }
        if let Some(primary) = settled.first() {
            broadcast(&state, Outbound::Settlement { inst: primary.instrument_id, value: crate::message::to_display(primary.value) });
        }
        self.refresh_all_positions(&state);
        Ok(())
    }

    pub async fn expire_option(&self, room_code: &str, user_id: UserId, instrument_id: InstrumentId, spot_price: Price) -> Result<()> {
        let room = self.room(room_code)?;
        let mut state = room.state.lock().await;
        if let Err(err) = Self::require_admin(&state, user_id) {
            send_private_error(&state, user_id, &err);
            return Err(err);
        }
        let settled = state.engine.expire_option(instrument_id, spot_price)?;
        broadcast(&state, Outbound::OptionExpired {
            inst: settled.instrument_id,
            spot_price: crate::message::to_display(spot_price),
            reason: "manual_expiry".into(),
        });
        self.refresh_all_positions(&state);
        Ok(())
    }

    // -- queries -------------------------------------------------------

    pub async fn snapshot(&self, room_code: &str, user_id: UserId, instrument_id: InstrumentId) -> Result<()> {
        let room = self.room(room_code)?;
        let state = room.state.lock().await;
        let snapshot = state.engine.snapshot(instrument_id, usize::MAX)?;
        send_private(&state, user_id, Outbound::MdInc {
            inst: instrument_id,
            bids: snapshot.bids.iter().map(|l| DepthLevelView { price: crate::message::to_display(l.price), size: l.qty }).collect(),
            asks: snapshot.asks.iter().map(|l| DepthLevelView { price: crate::message::to_display(l.price), size: l.qty }).collect(),
            last: snapshot.last_price.map(crate::message::to_display),
            ts: Utc::now().timestamp_millis() as f64 / 1000.0,
        });
        Ok(())
    }

    pub async fn positions(&self, room_code: &str, user_id: UserId) -> Result<()> {
        let room = self.room(room_code)?;
        let state = room.state.lock().await;
        send_private(&state, user_id, Outbound::Positions { positions: position_views(&state, user_id) });
        Ok(())
    }

    pub async fn pnl(&self, room_code: &str, user_id: UserId) -> Result<()> {
        let room = self.room(room_code)?;
        let state = room.state.lock().await;
        let positions = position_views(&state, user_id);
        let total_pnl = positions.iter().map(|p| p.pnl).sum();
        send_private(&state, user_id, Outbound::Pnl { total_pnl, positions });
        Ok(())
    }

    pub async fn export_data(&self, room_code: &str, user_id: UserId) -> Result<()> {
        let room = self.room(room_code)?;
        let state = room.state.lock().await;
        if let Err(err) = Self::require_admin(&state, user_id) {
            send_private_error(&state, user_id, &err);
            return Err(err);
        }
        let names: HashMap<UserId, String> = state.users.values().map(|u| (u.user_id, u.name.clone())).collect();
        crate::export::export_room(&self.export_dir, room_code, &state.engine, &names, Utc::now())
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        Ok(())
    }

    /// Export every known room; called on process shutdown.
    pub async fn shutdown(&self) {
        for entry in self.rooms.iter() {
            let room_code = entry.key().clone();
            let room = entry.value().clone();
            let state = room.state.lock().await;
            let names: HashMap<UserId, String> = state.users.values().map(|u| (u.user_id, u.name.clone())).collect();
            if let Err(err) = crate::export::export_room(&self.export_dir, &room_code, &state.engine, &names, Utc::now()) {
                warn!(room_code, error = %err, "export failed during shutdown");
            }
        }
    }

    // -- internal helpers ------------------------------------------------

    fn deliver_outcome(
        &self,
        state: &mut RoomState,
        initiator: UserId,
        outcome: &SubmitOutcome,
        ack: impl FnOnce(&SubmitOutcome) -> Outbound,
    ) {
        send_private(state, initiator, ack(outcome));
        for fill in &outcome.fills {
            send_private(state, fill.user_id, Outbound::Fill {
                order_id: fill.order_id,
                instrument_id: fill.instrument_id,
                side: fill.side,
                price: crate::message::to_display(fill.price),
                qty: fill.quantity,
            });
        }
        for &user_id in &outcome.affected_users {
            self.refresh_positions(state, user_id);
        }
    }

    fn refresh_positions(&self, state: &RoomState, user_id: UserId) {
        send_private(state, user_id, Outbound::Positions { positions: position_views(state, user_id) });
        let positions = position_views(state, user_id);
        let total_pnl = positions.iter().map(|p| p.pnl).sum();
        send_private(state, user_id, Outbound::Pnl { total_pnl, positions });
    }

    fn refresh_all_positions(&self, state: &RoomState) {
        let user_ids: Vec<UserId> = state.users.keys().copied().collect();
        for user_id in user_ids {
            self.refresh_positions(state, user_id);
        }
    }

    fn broadcast_md_inc(&self, state: &RoomState, instrument_id: InstrumentId) {
        if let Ok(snapshot) = state.engine.snapshot(instrument_id, usize::MAX) {
            broadcast(state, Outbound::MdInc {
                inst: instrument_id,
                bids: snapshot.bids.iter().map(|l| DepthLevelView { price: crate::message::to_display(l.price), size: l.qty }).collect(),
                asks: snapshot.asks.iter().map(|l| DepthLevelView { price: crate::message::to_display(l.price), size: l.qty }).collect(),
                last: snapshot.last_price.map(crate::message::to_display),
                ts: Utc::now().timestamp_millis() as f64 / 1000.0,
            });
        }
    }
}

fn position_views(state: &RoomState, user_id: UserId) -> Vec<PositionView> {
    state
        .engine
        .positions_of_user(user_id)
        .into_iter()
        .map(|(inst, pos, pnl)| PositionView {
            instrument_id: inst,
            net_qty: pos.net_qty,
            vwap: pos.vwap,
            pnl,
        })
        .collect()
}

fn send_private(state: &RoomState, user_id: UserId, event: Outbound) {
    if let Some(user) = state.users.get(&user_id) {
        if user.send(event).is_err() {
            warn!(user_id, "failed to deliver private event, channel closed");
        }
    }
}

fn send_private_error(state: &RoomState, user_id: UserId, err: &GatewayError) {
    send_private(state, user_id, Outbound::Error { message: err.to_string(), code: err.code().to_string() });
}

fn broadcast(state: &RoomState, event: Outbound) {
    for user in state.users.values() {
        if user.send(event.clone()).is_err() {
            warn!(user_id = user.user_id, "failed to deliver broadcast event, channel closed");
        }
    }
}
