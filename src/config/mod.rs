//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated), `*` for any
    pub client_origin: String,
    /// Simulation tuning shared by every room
    pub game: GameConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:2567".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            game: GameConfig::from_env()?,
        })
    }
}

/// Axis-aligned box dimensions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxSize {
    pub width: f32,
    pub height: f32,
}

impl BoxSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn scaled(self, scale: f32) -> Self {
        Self {
            width: self.width * scale,
            height: self.height * scale,
        }
    }
}

/// Immutable simulation tuning handed to each room at construction.
///
/// Durations are milliseconds on the room clock.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Simulation ticks per second
    pub tick_rate_hz: u32,
    /// State broadcasts per second (clamped to the tick rate)
    pub snapshot_rate_hz: u32,
    /// Maximum concurrent connections per room
    pub max_clients: usize,

    pub map_width: f32,
    pub map_height: f32,

    /// Unscaled ship sprite box
    pub ship_box: BoxSize,
    pub ship_scale: f32,
    pub projectile_box: BoxSize,
    pub power_up_box: BoxSize,

    pub projectile_lifetime_ms: u64,
    /// Delay between two power-up spawns
    pub power_up_spawn_cooldown_ms: u64,
    /// How long an uncollected power-up stays in the world
    pub power_up_lifetime_ms: u64,
    /// How long a collected power-up stays active on a ship
    pub power_up_duration_ms: u64,

    pub base_fire_rate_ms: u64,
    pub boosted_fire_rate_ms: u64,
    pub base_max_velocity: f32,
    pub boosted_max_velocity: f32,
    pub base_angular_velocity: f32,
    pub boosted_angular_velocity: f32,

    pub revive_delay_ms: u64,
    pub reconnect_grace_ms: u64,

    /// Points for destroying a ship by ramming it with a shield up
    pub shield_kill_points: u32,
    /// Points for destroying a ship with a projectile
    pub projectile_kill_points: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            snapshot_rate_hz: 20,
            max_clients: 16,
            map_width: 3000.0,
            map_height: 3000.0,
            ship_box: BoxSize::new(96.0, 96.0),
            ship_scale: 0.5,
            projectile_box: BoxSize::new(8.0, 8.0),
            power_up_box: BoxSize::new(32.0, 32.0),
            projectile_lifetime_ms: 1_500,
            power_up_spawn_cooldown_ms: 5_000,
            power_up_lifetime_ms: 10_000,
            power_up_duration_ms: 10_000,
            base_fire_rate_ms: 300,
            boosted_fire_rate_ms: 100,
            base_max_velocity: 300.0,
            boosted_max_velocity: 500.0,
            base_angular_velocity: 200.0,
            boosted_angular_velocity: 300.0,
            revive_delay_ms: 3_000,
            reconnect_grace_ms: 20_000,
            shield_kill_points: 3,
            projectile_kill_points: 1,
        }
    }
}

impl GameConfig {
    /// Defaults overridden by any matching environment variable
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let config = Self {
            tick_rate_hz: env_or("TICK_RATE_HZ", d.tick_rate_hz)?,
            snapshot_rate_hz: env_or("SNAPSHOT_RATE_HZ", d.snapshot_rate_hz)?,
            max_clients: env_or("MAX_CLIENTS", d.max_clients)?,
            map_width: env_or("MAP_WIDTH", d.map_width)?,
            map_height: env_or("MAP_HEIGHT", d.map_height)?,
            ship_box: BoxSize::new(
                env_or("SHIP_WIDTH", d.ship_box.width)?,
                env_or("SHIP_HEIGHT", d.ship_box.height)?,
            ),
            ship_scale: env_or("SHIP_SCALE", d.ship_scale)?,
            projectile_box: BoxSize::new(
                env_or("PROJECTILE_WIDTH", d.projectile_box.width)?,
                env_or("PROJECTILE_HEIGHT", d.projectile_box.height)?,
            ),
            power_up_box: BoxSize::new(
                env_or("POWER_UP_WIDTH", d.power_up_box.width)?,
                env_or("POWER_UP_HEIGHT", d.power_up_box.height)?,
            ),
            projectile_lifetime_ms: env_or("PROJECTILE_LIFETIME_MS", d.projectile_lifetime_ms)?,
            power_up_spawn_cooldown_ms: env_or(
                "POWER_UP_SPAWN_COOLDOWN_MS",
                d.power_up_spawn_cooldown_ms,
            )?,
            power_up_lifetime_ms: env_or("POWER_UP_LIFETIME_MS", d.power_up_lifetime_ms)?,
            power_up_duration_ms: env_or("POWER_UP_DURATION_MS", d.power_up_duration_ms)?,
            base_fire_rate_ms: env_or("BASE_FIRE_RATE_MS", d.base_fire_rate_ms)?,
            boosted_fire_rate_ms: env_or("BOOSTED_FIRE_RATE_MS", d.boosted_fire_rate_ms)?,
            base_max_velocity: env_or("BASE_MAX_VELOCITY", d.base_max_velocity)?,
            boosted_max_velocity: env_or("BOOSTED_MAX_VELOCITY", d.boosted_max_velocity)?,
            base_angular_velocity: env_or("BASE_ANGULAR_VELOCITY", d.base_angular_velocity)?,
            boosted_angular_velocity: env_or(
                "BOOSTED_ANGULAR_VELOCITY",
                d.boosted_angular_velocity,
            )?,
            revive_delay_ms: env_or("REVIVE_DELAY_MS", d.revive_delay_ms)?,
            reconnect_grace_ms: env_or("RECONNECT_GRACE_MS", d.reconnect_grace_ms)?,
            shield_kill_points: env_or("SHIELD_KILL_POINTS", d.shield_kill_points)?,
            projectile_kill_points: env_or("PROJECTILE_KILL_POINTS", d.projectile_kill_points)?,
        };

        if config.tick_rate_hz == 0 {
            return Err(ConfigError::Invalid("TICK_RATE_HZ"));
        }
        if config.snapshot_rate_hz == 0 {
            return Err(ConfigError::Invalid("SNAPSHOT_RATE_HZ"));
        }

        Ok(config)
    }

    /// Hitbox of a ship after sprite scaling
    pub fn ship_hitbox(&self) -> BoxSize {
        self.ship_box.scaled(self.ship_scale)
    }

    /// Number of ticks between two state broadcasts
    pub fn snapshot_interval_ticks(&self) -> u32 {
        (self.tick_rate_hz / self.snapshot_rate_hz.max(1)).max(1)
    }
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
