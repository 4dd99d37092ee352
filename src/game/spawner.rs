//! Power-up spawner

use std::sync::Arc;

use rand::Rng;

use crate::config::GameConfig;

use super::entities::{new_entity_id, random_map_position, EntityStore, PowerUp, PowerUpKind};
use super::Millis;

/// Drops one power-up into the world per cooldown window
pub struct PowerUpSpawner {
    config: Arc<GameConfig>,
    next_spawn_at: Millis,
}

impl PowerUpSpawner {
    /// A spawner whose first drop happens on the first tick
    pub fn new(config: Arc<GameConfig>) -> Self {
        Self {
            config,
            next_spawn_at: 0,
        }
    }

    pub fn next_spawn_at(&self) -> Millis {
        self.next_spawn_at
    }

    /// Spawn a power-up if the cooldown elapsed. Returns the new power-up's id.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        store: &mut EntityStore,
        now: Millis,
        rng: &mut R,
    ) -> Option<String> {
        if now < self.next_spawn_at {
            return None;
        }

        let config = &self.config;
        self.next_spawn_at = now + config.power_up_spawn_cooldown_ms;

        let (x, y) = random_map_position(config, rng);
        let power_up = PowerUp {
            id: new_entity_id(),
            kind: PowerUpKind::random(rng),
            x,
            y,
            expires_at: now + config.power_up_lifetime_ms,
        };
        let id = power_up.id.clone();
        store.insert_power_up(power_up);
        Some(id)
    }
}
