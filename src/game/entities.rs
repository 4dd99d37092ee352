//! Entity store - ships, projectiles and power-ups owned by a room

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::GameConfig;

use super::physics::Hitbox;
use super::{ConnectionId, Millis};

/// Power-up types, numbered as they appear on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerUpKind {
    /// Immune to projectiles, destroys unshielded ships on contact
    Shield,
    /// Shorter delay between shots
    FireRate,
    /// Higher top speed and turn rate
    Speed,
}

impl PowerUpKind {
    pub const ALL: [PowerUpKind; 3] = [Self::Shield, Self::FireRate, Self::Speed];

    /// Wire code, -1 is reserved for "no power-up"
    pub fn code(self) -> i8 {
        match self {
            Self::Shield => 0,
            Self::FireRate => 1,
            Self::Speed => 2,
        }
    }

    /// Wire code of an optional power-up
    pub fn code_of(kind: Option<Self>) -> i8 {
        kind.map_or(-1, Self::code)
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

/// Authoritative ship record (human or bot)
#[derive(Debug, Clone)]
pub struct Ship {
    pub id: String,
    pub username: String,
    pub is_bot: bool,
    /// Player that owns this bot, `None` for humans
    pub owner_id: Option<String>,

    pub connection_id: Option<ConnectionId>,
    pub connected: bool,

    // Kinematics (client-reported)
    pub x: f32,
    pub y: f32,
    pub speed_x: f32,
    pub speed_y: f32,
    pub rotation: f32,

    // Intent (client-reported)
    pub is_shooting: bool,
    pub is_turning_left: bool,
    pub is_turning_right: bool,
    pub is_accelerating: bool,

    // Combat
    pub score: u32,
    pub power_up: Option<PowerUpKind>,
    pub power_up_expires_at: Millis,
    pub fire_rate_ms: u64,
    pub next_fire_at: Millis,
    pub max_velocity: f32,
    pub angular_velocity: f32,

    // Lifecycle
    pub is_exploding: bool,
    pub revive_at: Millis,
}

impl Ship {
    fn new(
        id: String,
        username: String,
        connection_id: ConnectionId,
        owner_id: Option<String>,
        config: &GameConfig,
    ) -> Self {
        Self {
            id,
            username,
            is_bot: owner_id.is_some(),
            owner_id,
            connection_id: Some(connection_id),
            connected: true,
            x: 0.0,
            y: 0.0,
            speed_x: 0.0,
            speed_y: 0.0,
            rotation: 0.0,
            is_shooting: false,
            is_turning_left: false,
            is_turning_right: false,
            is_accelerating: false,
            score: 0,
            power_up: None,
            power_up_expires_at: 0,
            fire_rate_ms: config.base_fire_rate_ms,
            next_fire_at: 0,
            max_velocity: config.base_max_velocity,
            angular_velocity: config.base_angular_velocity,
            is_exploding: false,
            revive_at: 0,
        }
    }

    /// A human player's ship
    pub fn player(
        id: String,
        username: String,
        connection_id: ConnectionId,
        config: &GameConfig,
    ) -> Self {
        Self::new(id, username, connection_id, None, config)
    }

    /// A bot ship paired with `owner_id`
    pub fn bot(
        owner_id: &str,
        username: String,
        connection_id: ConnectionId,
        config: &GameConfig,
    ) -> Self {
        Self::new(
            bot_id_for(owner_id),
            username,
            connection_id,
            Some(owner_id.to_string()),
            config,
        )
    }

    pub fn hitbox(&self, config: &GameConfig) -> Hitbox {
        Hitbox::new(self.x, self.y, config.ship_hitbox())
    }

    pub fn has_shield(&self) -> bool {
        self.power_up == Some(PowerUpKind::Shield)
    }

    /// Put the ship somewhere random on the map, at rest
    pub fn place_randomly<R: Rng + ?Sized>(&mut self, config: &GameConfig, rng: &mut R) {
        let (x, y) = random_map_position(config, rng);
        self.x = x;
        self.y = y;
        self.speed_x = 0.0;
        self.speed_y = 0.0;
        self.rotation = 0.0;
    }

    /// Drop any held power-up and return to baseline stats
    pub fn reset_combat_stats(&mut self, config: &GameConfig) {
        self.power_up = None;
        self.power_up_expires_at = 0;
        self.fire_rate_ms = config.base_fire_rate_ms;
        self.max_velocity = config.base_max_velocity;
        self.angular_velocity = config.base_angular_velocity;
    }

    /// Whether an exploding ship may come back at `now`
    pub fn can_revive(&self, now: Millis) -> bool {
        self.is_exploding && now >= self.revive_at
    }

    pub fn revive<R: Rng + ?Sized>(&mut self, config: &GameConfig, rng: &mut R) {
        self.is_exploding = false;
        self.place_randomly(config, rng);
        self.reset_combat_stats(config);
    }

    /// Clears a held power-up whose time ran out. Returns true if one was cleared.
    pub fn expire_power_up(&mut self, config: &GameConfig, now: Millis) -> bool {
        if self.power_up.is_some() && now >= self.power_up_expires_at {
            self.reset_combat_stats(config);
            true
        } else {
            false
        }
    }

    /// Fire a projectile if the trigger is held and the gun is ready
    pub fn try_fire(&mut self, config: &GameConfig, now: Millis) -> Option<Projectile> {
        if !self.is_shooting || now < self.next_fire_at {
            return None;
        }

        self.next_fire_at = now + self.fire_rate_ms;
        Some(Projectile {
            id: new_entity_id(),
            owner_id: self.id.clone(),
            x: self.x,
            y: self.y,
            rotation: self.rotation,
            expires_at: now + config.projectile_lifetime_ms,
        })
    }

    /// Take a power-up and apply its immediate effect
    pub fn pick_up(&mut self, kind: PowerUpKind, config: &GameConfig, now: Millis) {
        self.power_up = Some(kind);
        self.power_up_expires_at = now + config.power_up_duration_ms;

        match kind {
            PowerUpKind::FireRate => {
                self.next_fire_at = now;
                self.fire_rate_ms = config.boosted_fire_rate_ms;
            }
            PowerUpKind::Speed => {
                self.max_velocity = config.boosted_max_velocity;
                self.angular_velocity = config.boosted_angular_velocity;
            }
            PowerUpKind::Shield => {}
        }
    }

    /// Mark the ship destroyed: it loses a point and its power-up, then waits to revive
    pub fn explode(&mut self, config: &GameConfig, now: Millis) {
        self.is_exploding = true;
        self.revive_at = now + config.revive_delay_ms;
        self.score = self.score.saturating_sub(1);
        self.reset_combat_stats(config);
    }
}

/// Transient shot owned by the ship that fired it
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: String,
    pub owner_id: String,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub expires_at: Millis,
}

impl Projectile {
    pub fn is_expired(&self, now: Millis) -> bool {
        now >= self.expires_at
    }

    pub fn hitbox(&self, config: &GameConfig) -> Hitbox {
        Hitbox::new(self.x, self.y, config.projectile_box)
    }
}

/// World-owned pickup
#[derive(Debug, Clone)]
pub struct PowerUp {
    pub id: String,
    pub kind: PowerUpKind,
    pub x: f32,
    pub y: f32,
    pub expires_at: Millis,
}

impl PowerUp {
    pub fn is_expired(&self, now: Millis) -> bool {
        now >= self.expires_at
    }

    pub fn hitbox(&self, config: &GameConfig) -> Hitbox {
        Hitbox::new(self.x, self.y, config.power_up_box)
    }
}

/// The three canonical collections of a room.
///
/// Lookups return `Option`; nothing here validates or cascades.
#[derive(Debug, Default)]
pub struct EntityStore {
    ships: HashMap<String, Ship>,
    projectiles: HashMap<String, Projectile>,
    power_ups: HashMap<String, PowerUp>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Ships

    pub fn ship(&self, id: &str) -> Option<&Ship> {
        self.ships.get(id)
    }

    pub fn ship_mut(&mut self, id: &str) -> Option<&mut Ship> {
        self.ships.get_mut(id)
    }

    pub fn insert_ship(&mut self, ship: Ship) {
        self.ships.insert(ship.id.clone(), ship);
    }

    pub fn remove_ship(&mut self, id: &str) -> Option<Ship> {
        self.ships.remove(id)
    }

    pub fn ships(&self) -> impl Iterator<Item = &Ship> {
        self.ships.values()
    }

    pub fn ship_ids(&self) -> Vec<String> {
        self.ships.keys().cloned().collect()
    }

    pub fn ship_count(&self) -> usize {
        self.ships.len()
    }

    pub fn clear_ships(&mut self) {
        self.ships.clear();
    }

    // Projectiles

    pub fn projectile(&self, id: &str) -> Option<&Projectile> {
        self.projectiles.get(id)
    }

    pub fn projectile_mut(&mut self, id: &str) -> Option<&mut Projectile> {
        self.projectiles.get_mut(id)
    }

    pub fn insert_projectile(&mut self, projectile: Projectile) {
        self.projectiles.insert(projectile.id.clone(), projectile);
    }

    pub fn remove_projectile(&mut self, id: &str) -> Option<Projectile> {
        self.projectiles.remove(id)
    }

    pub fn projectiles(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.values()
    }

    pub fn projectile_ids(&self) -> Vec<String> {
        self.projectiles.keys().cloned().collect()
    }

    // Power-ups

    pub fn power_up(&self, id: &str) -> Option<&PowerUp> {
        self.power_ups.get(id)
    }

    pub fn insert_power_up(&mut self, power_up: PowerUp) {
        self.power_ups.insert(power_up.id.clone(), power_up);
    }

    pub fn remove_power_up(&mut self, id: &str) -> Option<PowerUp> {
        self.power_ups.remove(id)
    }

    pub fn power_ups(&self) -> impl Iterator<Item = &PowerUp> {
        self.power_ups.values()
    }

    pub fn power_up_ids(&self) -> Vec<String> {
        self.power_ups.keys().cloned().collect()
    }
}

/// Id under which a player's companion bot is stored
pub fn bot_id_for(player_id: &str) -> String {
    format!("bot:{}", player_id)
}

/// Fresh id for a transient entity
pub fn new_entity_id() -> String {
    Uuid::new_v4().to_string()
}

/// Uniformly random point inside the map bounds
pub fn random_map_position<R: Rng + ?Sized>(config: &GameConfig, rng: &mut R) -> (f32, f32) {
    let x = rng.gen_range(0.0..config.map_width.max(f32::EPSILON));
    let y = rng.gen_range(0.0..config.map_height.max(f32::EPSILON));
    (x, y)
}
