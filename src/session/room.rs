//! A single trading room: its engine, its membership table, and the
//! bookkeeping needed to enforce "exactly one exchange per room".

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::engine::Engine;
use crate::message::Role;
use crate::session::user::User;
use crate::types::UserId;

/// Mutable room state, held behind a single `tokio::sync::Mutex` so that at
/// most one mutating operation runs against a room's engine at a time (see
/// the concurrency model: engine calls never suspend, so the lock is held
/// only for the duration of one synchronous operation).
pub struct RoomState {
    pub engine: Engine,
    pub users: HashMap<UserId, User>,
    pub next_user_id: UserId,
    pub exchange_user_id: Option<UserId>,
    pub is_active: bool,
}

impl RoomState {
    fn new() -> Self {
        Self {
            engine: Engine::new(),
            users: HashMap::new(),
            next_user_id: 1,
            exchange_user_id: None,
            is_active: true,
        }
    }

    pub fn exchange_seat_free(&self) -> bool {
        self.exchange_user_id.is_none()
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.users.get(&user_id).map(|u| u.role == Role::Exchange) == Some(true)
    }
}

/// A room and the resources owned alongside it: its room code, optional
/// passcode, creation time, and the periodic market-data ticker task.
pub struct RoomHandle {
    pub room_code: String,
    pub passcode: Option<String>,
    pub created_at: DateTime<Utc>,
    pub state: Mutex<RoomState>,
    pub ticker: Mutex<Option<JoinHandle<()>>>,
}

impl RoomHandle {
    pub fn new(room_code: String, passcode: Option<String>) -> Self {
        Self {
            room_code,
            passcode,
            created_at: Utc::now(),
            state: Mutex::new(RoomState::new()),
            ticker: Mutex::new(None),
        }
    }

    /// Constant-time-ish passcode check: both sides are short, fixed-size
    /// tokens already handled at the transport layer, so this is a plain
    /// comparison grounded in the same shared-secret-per-room model the
    /// source gateway uses (no bearer-token auth beyond this).
    pub fn passcode_matches(&self, attempt: &Option<String>) -> bool {
        match (&self.passcode, attempt) {
            (None, _) => true,
            (Some(expected), Some(given)) => expected == given,
            (Some(_), None) => false,
        }
    }

}
