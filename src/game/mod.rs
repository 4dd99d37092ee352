//! Game simulation modules

pub mod combat;
pub mod entities;
pub mod input;
pub mod physics;
pub mod room;
pub mod session;
pub mod simulation;
pub mod snapshot;
pub mod spawner;

pub use room::{RoomError, RoomHandle, RoomRegistry};

use uuid::Uuid;

use crate::ws::protocol::{ChatMessage, ClientMsg, ServerMsg};

use self::combat::KillCause;
use self::entities::PowerUpKind;

/// Identity of one transport connection
pub type ConnectionId = Uuid;

/// Milliseconds on a room's monotonic clock
pub type Millis = u64;

/// Side effects produced by a simulation tick
#[derive(Debug, Clone)]
pub enum GameEvent {
    ShipDestroyed {
        ship_id: String,
        destroyed_by: String,
        cause: KillCause,
        points: u32,
    },
    ShipRevived {
        ship_id: String,
    },
    PowerUpCollected {
        ship_id: String,
        kind: PowerUpKind,
    },
    /// Chat synthesized by the server (bot taunts)
    Chat(ChatMessage),
}

/// Message received from a connection, routed to its room
#[derive(Debug, Clone)]
pub struct ClientInput {
    pub connection_id: ConnectionId,
    pub msg: ClientMsg,
}

/// Message to deliver to one connection, or to all of them when `target` is `None`
#[derive(Debug, Clone)]
pub struct Outbound {
    pub target: Option<ConnectionId>,
    pub msg: ServerMsg,
}

impl Outbound {
    pub fn all(msg: ServerMsg) -> Self {
        Self { target: None, msg }
    }

    pub fn to(connection_id: ConnectionId, msg: ServerMsg) -> Self {
        Self {
            target: Some(connection_id),
            msg,
        }
    }

    pub fn is_for(&self, connection_id: ConnectionId) -> bool {
        self.target.map_or(true, |target| target == connection_id)
    }
}
