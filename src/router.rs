//! Marshals inbound operation envelopes into coordinator calls. Carries no
//! business rules beyond envelope validation (required fields, auth gating
//! by connection state); everything else lives in [`crate::session`].

use chrono::Utc;

use crate::error::{GatewayError, Result};
use crate::instrument::NewInstrument;
use crate::message::{to_minor, Inbound, Outbound};
use crate::session::{Coordinator, JoinResult};
use crate::types::UserId;

/// Per-connection state: which room and user this connection has joined
/// as, if any. Unauthenticated connections may only send `create_room`,
/// `join`, and `ping`.
#[derive(Debug, Default, Clone)]
pub struct ConnectionContext {
    pub room_code: Option<String>,
    pub user_id: Option<UserId>,
}

/// What routing one envelope produced.
pub enum RouteOutcome {
    /// A direct reply with no room/session involved (`create_room`, `ping`).
    Reply(Outbound),
    /// A successful join; the caller should retain `receiver` to read this
    /// user's private and broadcast events from here on.
    Joined(JoinResult),
    /// The operation was dispatched to the coordinator, which already
    /// delivered any resulting events through the user's channel.
    Dispatched,
}

pub struct Router;

impl Router {
    pub async fn route(coordinator: &Coordinator, ctx: &mut ConnectionContext, msg: Inbound) -> Result<RouteOutcome> {
        match msg {
            Inbound::CreateRoom { passcode } => {
                let room_code = coordinator.create_room(passcode);
                Ok(RouteOutcome::Reply(Outbound::RoomCreated { room_code }))
            }
            Inbound::Ping { timestamp } => Ok(RouteOutcome::Reply(Outbound::Pong {
                timestamp,
                server_time: Utc::now().timestamp_millis() as f64 / 1000.0,
            })),
            Inbound::Join { room, name, role, passcode } => {
                let result = coordinator.join(&room, name, role, passcode).await?;
                ctx.room_code = Some(result.room_code.clone());
                ctx.user_id = Some(result.user_id);
                Ok(RouteOutcome::Joined(result))
            }
            other => {
                let room_code = ctx.room_code.clone().ok_or(GatewayError::NotAuthenticated)?;
                let user_id = ctx.user_id.ok_or(GatewayError::NotAuthenticated)?;
                Self::dispatch_authenticated(coordinator, &room_code, user_id, other).await?;
                Ok(RouteOutcome::Dispatched)
            }
        }
    }

    async fn dispatch_authenticated(coordinator: &Coordinator, room_code: &str, user_id: UserId, msg: Inbound) -> Result<()> {
        match msg {
            Inbound::OrderNew { inst, side, price, qty, tif, post_only } => {
                coordinator
                    .submit_order(room_code, user_id, inst, side, to_minor(price), qty, tif, post_only)
                    .await
            }
            Inbound::Cancel { order_id, inst } => coordinator.cancel(room_code, user_id, order_id, inst).await,
            Inbound::CancelAll {} => coordinator.cancel_all(room_code, user_id).await,
            Inbound::CancelInst { inst, order_ids } => coordinator.cancel_inst(room_code, user_id, inst, order_ids).await,
            Inbound::Replace { order_id, price, qty } => {
                coordinator.replace(room_code, user_id, order_id, price.map(to_minor), qty).await
            }
            Inbound::AddInstrument(spec) => {
                coordinator
                    .add_instrument(
                        room_code,
                        user_id,
                        NewInstrument {
                            symbol: spec.symbol,
                            kind: spec.kind,
                            tick_size: to_minor(spec.tick_size),
                            lot_size: spec.lot_size,
                            tick_value: spec.tick_value,
                            reference_id: spec.reference_id,
                            strike: spec.strike.map(to_minor),
                        },
                    )
                    .await
                    .map(|_| ())
            }
            Inbound::Settle { inst, value } => coordinator.settle(room_code, user_id, inst, to_minor(value)).await,
            Inbound::Halt { inst, on } => coordinator.halt(room_code, user_id, inst, on).await,
            Inbound::UpdateTickSize { instrument_id, tick_size } => {
                coordinator.update_tick_size(room_code, user_id, instrument_id, to_minor(tick_size)).await
            }
            Inbound::ExpireOption { inst, spot_price } => {
                coordinator.expire_option(room_code, user_id, inst, to_minor(spot_price)).await
            }
            Inbound::PullQuotes { inst } => coordinator.pull_quotes(room_code, user_id, inst).await,
            Inbound::GetSnapshot { inst } => {
                let inst = inst.ok_or_else(|| GatewayError::Envelope("get_snapshot requires inst".into()))?;
                coordinator.snapshot(room_code, user_id, inst).await
            }
            Inbound::GetPositions { .. } => coordinator.positions(room_code, user_id).await,
            Inbound::GetPnl {} => coordinator.pnl(room_code, user_id).await,
            Inbound::ExportData {} => coordinator.export_data(room_code, user_id).await,
            Inbound::CreateRoom { .. } | Inbound::Ping { .. } | Inbound::Join { .. } => {
                unreachable!("handled before authentication gate")
            }
        }
    }
}
