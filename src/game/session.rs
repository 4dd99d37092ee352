//! Session binding - connections, players and their companion bots

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::GameConfig;

use super::entities::{EntityStore, Ship};
use super::ConnectionId;

/// Names handed out to companion bots
pub const BOT_NAMES: &[&str] = &[
    "Rusty", "Sparky", "Bolt", "Gizmo", "Widget", "Cog", "Servo", "Piston", "Rivet", "Dynamo",
];

/// What the room should do after a connection left
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The connection never started a game
    NotBound,
    /// Ship and bot are gone
    Removed { player_id: String },
    /// Ship kept; schedule removal after the grace period unless the player rejoins
    AwaitReconnect { player_id: String },
}

/// Maps connections to player ships and provisions new players
pub struct SessionBinding {
    config: Arc<GameConfig>,
}

impl SessionBinding {
    pub fn new(config: Arc<GameConfig>) -> Self {
        Self { config }
    }

    /// Rebind an existing ship to a new connection. Returns false if the player has no ship.
    pub fn on_join(
        &self,
        store: &mut EntityStore,
        connection_id: ConnectionId,
        player_id: &str,
    ) -> bool {
        let Some(ship) = store.ship_mut(player_id) else {
            return false;
        };
        if ship.is_bot {
            return false;
        }

        ship.connection_id = Some(connection_id);
        ship.connected = true;
        info!(player_id = %player_id, connection_id = %connection_id, "Player reconnected");
        true
    }

    pub fn on_leave(
        &self,
        store: &mut EntityStore,
        connection_id: ConnectionId,
        consented: bool,
    ) -> LeaveOutcome {
        let Some(player_id) = self.player_for_connection(store, connection_id) else {
            return LeaveOutcome::NotBound;
        };

        if let Some(ship) = store.ship_mut(&player_id) {
            ship.connected = false;
        }

        if consented {
            self.remove_player(store, &player_id);
            LeaveOutcome::Removed { player_id }
        } else {
            debug!(player_id = %player_id, "Player dropped, holding ship for reconnection");
            LeaveOutcome::AwaitReconnect { player_id }
        }
    }

    /// The grace period ran out. Removes the player unless they came back.
    pub fn expire_reconnection(&self, store: &mut EntityStore, player_id: &str) -> bool {
        match store.ship(player_id) {
            Some(ship) if !ship.connected => {
                self.remove_player(store, player_id);
                true
            }
            _ => false,
        }
    }

    /// Room teardown
    pub fn on_dispose(&self, store: &mut EntityStore) {
        store.clear_ships();
    }

    /// Create the player's ship and companion bot.
    ///
    /// Returns false if the player already has a ship or the connection already drives one.
    pub fn start_game<R: Rng + ?Sized>(
        &self,
        store: &mut EntityStore,
        connection_id: ConnectionId,
        player_id: &str,
        username: Option<&str>,
        rng: &mut R,
    ) -> bool {
        if store.ship(player_id).is_some() {
            return false;
        }
        if let Some(bound) = self.player_for_connection(store, connection_id) {
            debug!(
                connection_id = %connection_id,
                player_id = %player_id,
                bound_player_id = %bound,
                "Ignoring start-game from a connection that already has a ship"
            );
            return false;
        }

        let username = match username.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => guest_name(rng),
        };

        let mut ship = Ship::player(player_id.to_string(), username, connection_id, &self.config);
        ship.place_randomly(&self.config, rng);

        let mut bot = Ship::bot(player_id, bot_name(store, rng), Uuid::new_v4(), &self.config);
        bot.place_randomly(&self.config, rng);

        info!(
            player_id = %player_id,
            username = %ship.username,
            bot = %bot.username,
            "Player started game"
        );

        store.insert_ship(ship);
        store.insert_ship(bot);
        true
    }

    /// Player id of the ship currently bound to `connection_id`
    pub fn player_for_connection(
        &self,
        store: &EntityStore,
        connection_id: ConnectionId,
    ) -> Option<String> {
        store
            .ships()
            .find(|ship| !ship.is_bot && ship.connection_id == Some(connection_id))
            .map(|ship| ship.id.clone())
    }

    fn remove_player(&self, store: &mut EntityStore, player_id: &str) {
        store.remove_ship(player_id);

        let bots: Vec<String> = store
            .ships()
            .filter(|ship| ship.owner_id.as_deref() == Some(player_id))
            .map(|ship| ship.id.clone())
            .collect();
        for bot_id in bots {
            store.remove_ship(&bot_id);
        }

        info!(player_id = %player_id, "Player removed from room");
    }
}

fn guest_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("Guest{}", rng.gen_range(1000..10000))
}

/// Pick a bot name whose prefix no live bot uses yet
fn bot_name<R: Rng + ?Sized>(store: &EntityStore, rng: &mut R) -> String {
    let taken = |name: &str| {
        store
            .ships()
            .any(|ship| ship.is_bot && ship.username.starts_with(name))
    };

    let free: Vec<&str> = BOT_NAMES.iter().copied().filter(|name| !taken(name)).collect();
    if let Some(name) = free.choose(rng) {
        return (*name).to_string();
    }

    let bots = store.ships().filter(|ship| ship.is_bot).count();
    let base = BOT_NAMES.choose(rng).copied().unwrap_or("Bot");
    format!("{}{}", base, bots + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn setup() -> (SessionBinding, EntityStore, ChaCha8Rng) {
        (
            SessionBinding::new(Arc::new(GameConfig::default())),
            EntityStore::new(),
            ChaCha8Rng::seed_from_u64(42),
        )
    }

    #[test]
    fn test_start_game_creates_ship_and_bot() {
        let (binding, mut store, mut rng) = setup();
        let conn = Uuid::new_v4();

        assert!(binding.start_game(&mut store, conn, "p1", Some("Alice"), &mut rng));

        let ship = store.ship("p1").expect("player ship");
        assert_eq!(ship.username, "Alice");
        assert_eq!(ship.connection_id, Some(conn));
        assert!(ship.connected && !ship.is_bot);

        let bot = store.ship("bot:p1").expect("bot ship");
        assert!(bot.is_bot);
        assert_eq!(bot.owner_id.as_deref(), Some("p1"));
        assert_ne!(bot.connection_id, Some(conn));
        assert!(BOT_NAMES.contains(&bot.username.as_str()));
    }

    #[test]
    fn test_start_game_is_idempotent() {
        let (binding, mut store, mut rng) = setup();
        let conn = Uuid::new_v4();

        assert!(binding.start_game(&mut store, conn, "p1", None, &mut rng));
        assert!(!binding.start_game(&mut store, conn, "p1", Some("Again"), &mut rng));

        assert_eq!(store.ship_count(), 2);
        assert!(store.ship("p1").unwrap().username.starts_with("Guest"));
    }

    #[test]
    fn test_one_ship_per_connection() {
        let (binding, mut store, mut rng) = setup();
        let conn = Uuid::new_v4();

        assert!(binding.start_game(&mut store, conn, "p1", None, &mut rng));
        assert!(!binding.start_game(&mut store, conn, "p2", None, &mut rng));
        assert!(!binding.start_game(&mut store, conn, "p3", None, &mut rng));
        assert_eq!(store.ship_count(), 2);
        assert!(store.ship("p2").is_none());

        let outcome = binding.on_leave(&mut store, conn, true);
        assert_eq!(outcome, LeaveOutcome::Removed { player_id: "p1".into() });
        assert_eq!(store.ship_count(), 0);
    }

    #[test]
    fn test_blank_username_gets_guest_name() {
        let (binding, mut store, mut rng) = setup();
        binding.start_game(&mut store, Uuid::new_v4(), "p1", Some("   "), &mut rng);
        let name = &store.ship("p1").unwrap().username;
        assert!(name.starts_with("Guest") && name.len() == 9, "{}", name);
    }

    #[test]
    fn test_bot_names_avoid_taken_prefixes() {
        let (binding, mut store, mut rng) = setup();
        for i in 0..BOT_NAMES.len() {
            binding.start_game(&mut store, Uuid::new_v4(), &format!("p{}", i), None, &mut rng);
        }

        let mut names: Vec<String> = store
            .ships()
            .filter(|s| s.is_bot)
            .map(|s| s.username.clone())
            .collect();
        names.sort();
        let mut expected: Vec<String> = BOT_NAMES.iter().map(|n| n.to_string()).collect();
        expected.sort();
        assert_eq!(names, expected);

        binding.start_game(&mut store, Uuid::new_v4(), "extra", None, &mut rng);
        let extra = &store.ship("bot:extra").unwrap().username;
        assert!(extra.ends_with(&(BOT_NAMES.len() + 1).to_string()), "{}", extra);
    }

    #[test]
    fn test_join_rebinds_existing_ship() {
        let (binding, mut store, mut rng) = setup();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        binding.start_game(&mut store, first, "p1", None, &mut rng);

        assert!(!binding.on_join(&mut store, second, "unknown"));
        assert!(!binding.on_join(&mut store, second, "bot:p1"));
        assert!(binding.on_join(&mut store, second, "p1"));
        assert_eq!(store.ship("p1").unwrap().connection_id, Some(second));
        assert_eq!(binding.player_for_connection(&store, second).as_deref(), Some("p1"));
        assert_eq!(binding.player_for_connection(&store, first), None);
    }

    #[test]
    fn test_consented_leave_removes_ship_and_bot() {
        let (binding, mut store, mut rng) = setup();
        let conn = Uuid::new_v4();
        binding.start_game(&mut store, conn, "p1", None, &mut rng);
        binding.start_game(&mut store, Uuid::new_v4(), "p2", None, &mut rng);

        let outcome = binding.on_leave(&mut store, conn, true);

        assert_eq!(outcome, LeaveOutcome::Removed { player_id: "p1".into() });
        assert!(store.ship("p1").is_none());
        assert!(store.ship("bot:p1").is_none());
        assert_eq!(store.ship_count(), 2);
    }

    #[test]
    fn test_unknown_connection_leave_is_noop() {
        let (binding, mut store, mut rng) = setup();
        binding.start_game(&mut store, Uuid::new_v4(), "p1", None, &mut rng);

        assert_eq!(
            binding.on_leave(&mut store, Uuid::new_v4(), false),
            LeaveOutcome::NotBound
        );
        assert_eq!(store.ship_count(), 2);
    }

    #[test]
    fn test_reconnect_within_grace_keeps_ship() {
        let (binding, mut store, mut rng) = setup();
        let conn = Uuid::new_v4();
        binding.start_game(&mut store, conn, "p1", None, &mut rng);
        store.ship_mut("p1").unwrap().score = 5;

        let outcome = binding.on_leave(&mut store, conn, false);
        assert_eq!(outcome, LeaveOutcome::AwaitReconnect { player_id: "p1".into() });
        assert!(!store.ship("p1").unwrap().connected);

        assert!(binding.on_join(&mut store, Uuid::new_v4(), "p1"));
        assert!(!binding.expire_reconnection(&mut store, "p1"));

        let ship = store.ship("p1").unwrap();
        assert!(ship.connected);
        assert_eq!(ship.score, 5);
        assert!(store.ship("bot:p1").is_some());
    }

    #[test]
    fn test_grace_expiry_removes_ship_and_bot() {
        let (binding, mut store, mut rng) = setup();
        let conn = Uuid::new_v4();
        binding.start_game(&mut store, conn, "p1", None, &mut rng);

        binding.on_leave(&mut store, conn, false);
        assert!(binding.expire_reconnection(&mut store, "p1"));

        assert_eq!(store.ship_count(), 0);
        assert!(!binding.expire_reconnection(&mut store, "p1"));
    }

    #[test]
    fn test_dispose_clears_ships() {
        let (binding, mut store, mut rng) = setup();
        binding.start_game(&mut store, Uuid::new_v4(), "p1", None, &mut rng);
        binding.on_dispose(&mut store);
        assert_eq!(store.ship_count(), 0);
    }
}
