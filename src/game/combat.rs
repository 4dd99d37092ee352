//! Combat resolution - destruction, scoring and bot taunts

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::GameConfig;
use crate::ws::protocol::ChatMessage;

use super::entities::EntityStore;
use super::{GameEvent, Millis};

/// Lines a bot sends after scoring a kill
pub const TAUNTS: &[&str] = &[
    "Too easy.",
    "Is that all you've got?",
    "Better luck next time!",
    "I barely had to aim.",
    "Did you forget your shield?",
    "Back to the hangar with you.",
    "Beep boop. Target eliminated.",
    "You fly like a space rock.",
    "Next!",
    "GG, now respawn and try again.",
];

pub fn random_taunt<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    TAUNTS.choose(rng).copied().unwrap_or("Gotcha!")
}

/// What destroyed a ship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillCause {
    /// Rammed by a shielded ship
    Shield,
    /// Hit by a projectile
    Projectile,
}

impl KillCause {
    pub fn points(self, config: &GameConfig) -> u32 {
        match self {
            Self::Shield => config.shield_kill_points,
            Self::Projectile => config.projectile_kill_points,
        }
    }
}

/// Destroy `victim_id` and credit `destroyer_id`.
///
/// Either ship may be missing from the store; whatever is present is updated.
#[allow(clippy::too_many_arguments)]
pub fn destroy_ship<R: Rng + ?Sized>(
    store: &mut EntityStore,
    victim_id: &str,
    destroyer_id: &str,
    cause: KillCause,
    config: &GameConfig,
    now: Millis,
    rng: &mut R,
    events: &mut Vec<GameEvent>,
) {
    let Some(victim) = store.ship_mut(victim_id) else {
        return;
    };
    victim.explode(config, now);

    let points = cause.points(config);
    events.push(GameEvent::ShipDestroyed {
        ship_id: victim_id.to_string(),
        destroyed_by: destroyer_id.to_string(),
        cause,
        points,
    });

    let Some(destroyer) = store.ship_mut(destroyer_id) else {
        return;
    };
    destroyer.score += points;

    if destroyer.is_bot {
        events.push(GameEvent::Chat(ChatMessage {
            player_id: destroyer.id.clone(),
            username: destroyer.username.clone(),
            message: random_taunt(rng).to_string(),
        }));
    }
}
