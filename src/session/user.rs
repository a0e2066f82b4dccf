//! A joined participant of one room.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;

use crate::message::{Outbound, Role};
use crate::types::UserId;

/// A single participant's membership record. `outbox` is the channel the
/// coordinator pushes private and broadcast events onto; a closed receiver
/// (dropped `UnboundedReceiver`) is treated as the user's disconnection.
pub struct User {
    pub user_id: UserId,
    pub name: String,
    pub role: Role,
    pub resume_token: String,
    pub joined_at: DateTime<Utc>,
    pub outbox: UnboundedSender<Outbound>,
}

impl User {
    /// Best-effort delivery; a send error means the client has disconnected
    /// and is logged by the caller, not retried.
    pub fn send(&self, event: Outbound) -> Result<(), Outbound> {
        self.outbox.send(event).map_err(|e| e.0)
    }
}
