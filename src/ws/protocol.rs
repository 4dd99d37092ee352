//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::combat::KillCause;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMsg {
    /// Latency probe, answered with a suggested delay until the next one
    Ping,

    /// Client-simulated state of the sender's ship and its projectiles
    StateUpdate {
        ship: ShipState,
        #[serde(default)]
        projectiles: Vec<ProjectilePosition>,
        /// Ship to apply `ship` to; the sender's own ship when absent
        #[serde(default, rename = "shipId")]
        ship_id: Option<String>,
    },

    /// Request a ship (and companion bot) for this player
    StartGame {
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(default)]
        username: Option<String>,
    },

    /// Chat line, relayed to everyone in the room
    ChatMessage(ChatMessage),
}

/// Intent and kinematics reported by a client for one ship
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipState {
    pub is_shooting: bool,
    pub is_turning_left: bool,
    pub is_turning_right: bool,
    pub is_accelerating: bool,
    pub x: f32,
    pub y: f32,
    pub speed_x: f32,
    pub speed_y: f32,
    pub rotation: f32,
}

/// Client-reported projectile position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectilePosition {
    pub id: String,
    pub x: f32,
    pub y: f32,
}

/// Chat line, sent by clients and synthesized for bots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub player_id: String,
    pub username: String,
    pub message: String,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        #[serde(rename = "connectionId")]
        connection_id: Uuid,
        #[serde(rename = "serverTime")]
        server_time: u64,
    },

    /// Pong response
    Pong {
        /// Suggested delay before the next ping, in milliseconds
        delay: u64,
    },

    /// Chat line for everyone in the room
    ChatMessage(ChatMessage),

    /// Canonical world state after a tick
    State(RoomSnapshot),

    /// Error message
    Error { code: String, message: String },
}

/// Full room state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Server tick number
    pub tick: u64,
    pub ships: Vec<ShipSnapshot>,
    pub projectiles: Vec<ProjectileSnapshot>,
    pub power_ups: Vec<PowerUpSnapshot>,
    /// Events since the previous snapshot
    pub events: Vec<WorldEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipSnapshot {
    pub id: String,
    pub username: String,
    pub is_bot: bool,
    pub owner_id: Option<String>,
    pub connected: bool,

    pub x: f32,
    pub y: f32,
    pub speed_x: f32,
    pub speed_y: f32,
    pub rotation: f32,

    pub is_shooting: bool,
    pub is_turning_left: bool,
    pub is_turning_right: bool,
    pub is_accelerating: bool,

    pub score: u32,
    /// -1 when no power-up is held
    pub power_up: i8,
    pub power_up_expires_at: u64,
    pub fire_rate: u64,
    pub max_velocity: f32,
    pub angular_velocity: f32,

    pub is_exploding: bool,
    pub revive_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileSnapshot {
    pub id: String,
    pub owner_id: String,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub expires_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerUpSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: i8,
    pub x: f32,
    pub y: f32,
    pub expires_at: u64,
}

/// Gameplay events carried in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum WorldEvent {
    ShipDestroyed {
        #[serde(rename = "shipId")]
        ship_id: String,
        #[serde(rename = "destroyedBy")]
        destroyed_by: String,
        cause: KillCause,
        points: u32,
    },
    ShipRevived {
        #[serde(rename = "shipId")]
        ship_id: String,
    },
    PowerUpCollected {
        #[serde(rename = "shipId")]
        ship_id: String,
        #[serde(rename = "powerUp")]
        power_up: i8,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_update() {
        let raw = r#"{
            "type": "state-update",
            "ship": {
                "isShooting": true, "isTurningLeft": false, "isTurningRight": true,
                "isAccelerating": false, "x": -12.5, "y": 40, "speedX": 1, "speedY": -2,
                "rotation": 3.14
            },
            "projectiles": [{"id": "abc", "x": 1, "y": 2}]
        }"#;

        match serde_json::from_str::<ClientMsg>(raw).expect("valid message") {
            ClientMsg::StateUpdate { ship, projectiles, ship_id } => {
                assert!(ship.is_shooting && ship.is_turning_right);
                assert_eq!(ship.x, -12.5);
                assert_eq!(ship.speed_y, -2.0);
                assert_eq!(projectiles.len(), 1);
                assert_eq!(projectiles[0].id, "abc");
                assert_eq!(ship_id, None);
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_start_game_without_username() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"start-game","playerId":"p-1"}"#).unwrap();
        match msg {
            ClientMsg::StartGame { player_id, username } => {
                assert_eq!(player_id, "p-1");
                assert_eq!(username, None);
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_ping_and_chat() {
        assert!(matches!(
            serde_json::from_str::<ClientMsg>(r#"{"type":"ping"}"#),
            Ok(ClientMsg::Ping)
        ));

        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"chat-message","playerId":"p","username":"Al","message":"hi"}"#,
        )
        .unwrap();
        match msg {
            ClientMsg::ChatMessage(chat) => assert_eq!(chat.message, "hi"),
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_server_message_shapes() {
        let pong = serde_json::to_value(ServerMsg::Pong { delay: 300 }).unwrap();
        assert_eq!(pong, serde_json::json!({"type": "pong", "delay": 300}));

        let chat = serde_json::to_value(ServerMsg::ChatMessage(ChatMessage {
            player_id: "bot:p".into(),
            username: "Rusty".into(),
            message: "Next!".into(),
        }))
        .unwrap();
        assert_eq!(chat["type"], "chat-message");
        assert_eq!(chat["playerId"], "bot:p");
    }
}
