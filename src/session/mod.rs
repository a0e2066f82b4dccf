//! Room lifecycle, membership, and the coordinator that drives an engine
//! per room.

mod coordinator;
mod room;
mod user;

pub use coordinator::{Coordinator, JoinResult};
pub use room::{RoomHandle, RoomState};
pub use user::User;
