//! Per-tick simulation - lifecycle, firing, collisions and scoring

use std::sync::Arc;

use rand::Rng;

use crate::config::GameConfig;

use super::combat::{destroy_ship, KillCause};
use super::entities::EntityStore;
use super::{GameEvent, Millis};

/// The authoritative step run once per tick
pub struct Simulation {
    config: Arc<GameConfig>,
}

impl Simulation {
    pub fn new(config: Arc<GameConfig>) -> Self {
        Self { config }
    }

    /// Advance the world to `now`.
    ///
    /// Ships are visited in store order; each ship runs its checks in a fixed
    /// sequence, so a ship that revives this tick can collide this tick too.
    pub fn step<R: Rng + ?Sized>(
        &self,
        store: &mut EntityStore,
        now: Millis,
        rng: &mut R,
    ) -> Vec<GameEvent> {
        let config = &*self.config;
        let mut events = Vec::new();

        for ship_id in store.ship_ids() {
            let Some(ship) = store.ship_mut(&ship_id) else {
                continue;
            };

            if ship.is_exploding {
                if !ship.can_revive(now) {
                    continue;
                }
                ship.revive(config, rng);
                events.push(GameEvent::ShipRevived {
                    ship_id: ship_id.clone(),
                });
            }

            ship.expire_power_up(config, now);

            if let Some(projectile) = ship.try_fire(config, now) {
                store.insert_projectile(projectile);
            }

            self.ram_with_shield(store, &ship_id, now, rng, &mut events);
            self.collect_power_ups(store, &ship_id, now, &mut events);
            self.check_projectile_hits(store, &ship_id, now, rng, &mut events);
        }

        remove_expired(store, now);
        events
    }

    /// A shielded ship destroys every unshielded ship it touches
    fn ram_with_shield<R: Rng + ?Sized>(
        &self,
        store: &mut EntityStore,
        ship_id: &str,
        now: Millis,
        rng: &mut R,
        events: &mut Vec<GameEvent>,
    ) {
        let config = &*self.config;
        let Some(ship) = store.ship(ship_id) else {
            return;
        };
        if !ship.has_shield() {
            return;
        }

        let hitbox = ship.hitbox(config);
        let victims: Vec<String> = store
            .ships()
            .filter(|enemy| enemy.id != ship_id && !enemy.is_exploding && !enemy.has_shield())
            .filter(|enemy| hitbox.intersects(&enemy.hitbox(config)))
            .map(|enemy| enemy.id.clone())
            .collect();

        for victim_id in victims {
            destroy_ship(
                store,
                &victim_id,
                ship_id,
                KillCause::Shield,
                config,
                now,
                rng,
                events,
            );
        }
    }

    fn collect_power_ups(
        &self,
        store: &mut EntityStore,
        ship_id: &str,
        now: Millis,
        events: &mut Vec<GameEvent>,
    ) {
        let config = &*self.config;

        for power_up_id in store.power_up_ids() {
            let Some(power_up) = store.power_up(&power_up_id) else {
                continue;
            };
            if power_up.is_expired(now) {
                store.remove_power_up(&power_up_id);
                continue;
            }

            let power_up_box = power_up.hitbox(config);
            let kind = power_up.kind;
            let Some(ship) = store.ship_mut(ship_id) else {
                return;
            };
            if ship.is_exploding {
                return;
            }
            if ship.power_up.is_some() || !ship.hitbox(config).intersects(&power_up_box) {
                continue;
            }

            ship.pick_up(kind, config, now);
            store.remove_power_up(&power_up_id);
            events.push(GameEvent::PowerUpCollected {
                ship_id: ship_id.to_string(),
                kind,
            });
        }
    }

    fn check_projectile_hits<R: Rng + ?Sized>(
        &self,
        store: &mut EntityStore,
        ship_id: &str,
        now: Millis,
        rng: &mut R,
        events: &mut Vec<GameEvent>,
    ) {
        let config = &*self.config;

        for projectile_id in store.projectile_ids() {
            let Some(projectile) = store.projectile(&projectile_id) else {
                continue;
            };
            if projectile.is_expired(now) {
                store.remove_projectile(&projectile_id);
                continue;
            }

            let Some(ship) = store.ship(ship_id) else {
                return;
            };
            if ship.is_exploding {
                return;
            }
            if ship.has_shield()
                || projectile.owner_id == ship_id
                || !ship.hitbox(config).intersects(&projectile.hitbox(config))
            {
                continue;
            }

            let owner_id = projectile.owner_id.clone();
            store.remove_projectile(&projectile_id);
            destroy_ship(
                store,
                ship_id,
                &owner_id,
                KillCause::Projectile,
                config,
                now,
                rng,
                events,
            );
        }
    }
}

/// Drop anything past its expiry, even when no ship visited it this tick
fn remove_expired(store: &mut EntityStore, now: Millis) {
    for id in store.projectile_ids() {
        if store.projectile(&id).is_some_and(|p| p.is_expired(now)) {
            store.remove_projectile(&id);
        }
    }
    for id in store.power_up_ids() {
        if store.power_up(&id).is_some_and(|p| p.is_expired(now)) {
            store.remove_power_up(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoxSize;
    use crate::game::entities::{PowerUp, PowerUpKind, Projectile, Ship};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    struct World {
        config: Arc<GameConfig>,
        sim: Simulation,
        store: EntityStore,
        rng: ChaCha8Rng,
    }

    impl World {
        fn new() -> Self {
            Self::with_config(GameConfig::default())
        }

        fn with_config(config: GameConfig) -> Self {
            let config = Arc::new(config);
            Self {
                sim: Simulation::new(config.clone()),
                config,
                store: EntityStore::new(),
                rng: ChaCha8Rng::seed_from_u64(99),
            }
        }

        fn player(&mut self, id: &str, x: f32, y: f32) {
            let mut ship = Ship::player(id.into(), id.into(), Uuid::new_v4(), &self.config);
            ship.x = x;
            ship.y = y;
            self.store.insert_ship(ship);
        }

        fn bot(&mut self, owner: &str, x: f32, y: f32) {
            let mut ship = Ship::bot(owner, "Rusty".into(), Uuid::new_v4(), &self.config);
            ship.x = x;
            ship.y = y;
            self.store.insert_ship(ship);
        }

        fn give(&mut self, id: &str, kind: PowerUpKind) {
            let config = self.config.clone();
            self.store.ship_mut(id).unwrap().pick_up(kind, &config, 0);
        }

        fn projectile(&mut self, id: &str, owner: &str, x: f32, y: f32, expires_at: Millis) {
            self.store.insert_projectile(Projectile {
                id: id.into(),
                owner_id: owner.into(),
                x,
                y,
                rotation: 0.0,
                expires_at,
            });
        }

        fn power_up(&mut self, id: &str, kind: PowerUpKind, x: f32, y: f32, expires_at: Millis) {
            self.store.insert_power_up(PowerUp {
                id: id.into(),
                kind,
                x,
                y,
                expires_at,
            });
        }

        fn step(&mut self, now: Millis) -> Vec<GameEvent> {
            self.sim.step(&mut self.store, now, &mut self.rng)
        }

        fn ship(&self, id: &str) -> &Ship {
            self.store.ship(id).expect("ship exists")
        }
    }

    #[test]
    fn test_shield_destroys_unshielded_ship() {
        let mut world = World::new();
        world.player("a", 100.0, 100.0);
        world.player("b", 110.0, 100.0);
        world.give("a", PowerUpKind::Shield);

        world.step(1_000);

        assert!(world.ship("b").is_exploding);
        assert!(!world.ship("a").is_exploding);
        assert_eq!(world.ship("a").score, 3);
    }

    #[test]
    fn test_two_shields_do_not_interact() {
        let mut world = World::new();
        world.player("a", 100.0, 100.0);
        world.player("b", 110.0, 100.0);
        world.give("a", PowerUpKind::Shield);
        world.give("b", PowerUpKind::Shield);

        let events = world.step(1_000);

        assert!(!world.ship("a").is_exploding);
        assert!(!world.ship("b").is_exploding);
        assert!(events.is_empty());
    }

    #[test]
    fn test_unshielded_ships_pass_through_each_other() {
        let mut world = World::new();
        world.player("a", 100.0, 100.0);
        world.player("b", 100.0, 100.0);

        world.step(1_000);

        assert!(!world.ship("a").is_exploding);
        assert!(!world.ship("b").is_exploding);
    }

    #[test]
    fn test_own_projectile_never_hits() {
        let mut world = World::new();
        world.player("a", 50.0, 50.0);
        world.projectile("shot", "a", 50.0, 50.0, 5_000);

        world.step(1_000);

        assert!(!world.ship("a").is_exploding);
        assert!(world.store.projectile("shot").is_some());
    }

    #[test]
    fn test_projectile_hit_destroys_and_scores() {
        let mut world = World::new();
        world.player("a", 50.0, 50.0);
        world.player("b", 900.0, 900.0);
        world.ship_score("a", 2);
        world.projectile("shot", "b", 55.0, 45.0, 5_000);

        let events = world.step(1_000);

        let victim = world.ship("a");
        assert!(victim.is_exploding);
        assert_eq!(victim.score, 1);
        assert_eq!(victim.revive_at, 1_000 + world.config.revive_delay_ms);
        assert_eq!(world.ship("b").score, 1);
        assert!(world.store.projectile("shot").is_none());
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::ShipDestroyed { ship_id, cause: KillCause::Projectile, points: 1, .. }
                if ship_id == "a"
        )));
    }

    #[test]
    fn test_shield_blocks_projectiles() {
        let mut world = World::new();
        world.player("a", 50.0, 50.0);
        world.player("b", 900.0, 900.0);
        world.give("a", PowerUpKind::Shield);
        world.projectile("shot", "b", 50.0, 50.0, 5_000);

        world.step(1_000);

        assert!(!world.ship("a").is_exploding);
        assert!(world.store.projectile("shot").is_some());
    }

    #[test]
    fn test_score_never_negative() {
        let mut world = World::new();
        world.player("a", 50.0, 50.0);
        world.projectile("shot", "gone", 50.0, 50.0, 5_000);

        world.step(1_000);

        assert!(world.ship("a").is_exploding);
        assert_eq!(world.ship("a").score, 0);
    }

    #[test]
    fn test_pickup_overlap_scenario() {
        let mut world = World::with_config(GameConfig {
            ship_box: BoxSize::new(10.0, 10.0),
            ship_scale: 1.0,
            power_up_box: BoxSize::new(4.0, 4.0),
            ..Default::default()
        });
        world.player("a", 0.0, 0.0);
        world.power_up("far", PowerUpKind::Speed, 20.0, 20.0, 5_000);
        world.power_up("near", PowerUpKind::Speed, 5.0, 5.0, 5_000);

        let events = world.step(1_000);

        let ship = world.ship("a");
        assert_eq!(ship.power_up, Some(PowerUpKind::Speed));
        assert_eq!(ship.max_velocity, world.config.boosted_max_velocity);
        assert_eq!(ship.power_up_expires_at, 1_000 + world.config.power_up_duration_ms);
        assert!(world.store.power_up("near").is_none());
        assert!(world.store.power_up("far").is_some());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_held_power_up_blocks_second_pickup() {
        let mut world = World::new();
        world.player("a", 0.0, 0.0);
        world.give("a", PowerUpKind::FireRate);
        world.power_up("p1", PowerUpKind::Shield, 0.0, 0.0, 50_000);
        world.power_up("p2", PowerUpKind::Speed, 1.0, 1.0, 50_000);

        world.step(1_000);

        assert_eq!(world.ship("a").power_up, Some(PowerUpKind::FireRate));
        assert_eq!(world.store.power_ups().count(), 2);

        // Once the fire boost runs out the ship can take exactly one of them
        let expiry = world.config.power_up_duration_ms;
        world.step(expiry);
        assert!(world.ship("a").power_up.is_some());
        assert_eq!(world.store.power_ups().count(), 1);
    }

    #[test]
    fn test_power_up_expiry_restores_baseline() {
        let mut world = World::new();
        world.player("a", 0.0, 0.0);
        world.give("a", PowerUpKind::Speed);

        world.step(world.config.power_up_duration_ms);

        let ship = world.ship("a");
        assert_eq!(ship.power_up, None);
        assert_eq!(ship.max_velocity, world.config.base_max_velocity);
        assert_eq!(ship.angular_velocity, world.config.base_angular_velocity);
    }

    #[test]
    fn test_firing_spawns_owned_projectile() {
        let mut world = World::new();
        world.player("a", 10.0, 20.0);
        {
            let ship = world.store.ship_mut("a").unwrap();
            ship.is_shooting = true;
            ship.rotation = 1.25;
        }

        world.step(1_000);
        world.step(1_016);

        let shots: Vec<&Projectile> = world.store.projectiles().collect();
        assert_eq!(shots.len(), 1, "second tick is inside the cooldown");
        assert_eq!(shots[0].owner_id, "a");
        assert_eq!((shots[0].x, shots[0].y, shots[0].rotation), (10.0, 20.0, 1.25));
        assert_eq!(shots[0].expires_at, 1_000 + world.config.projectile_lifetime_ms);
        assert_eq!(world.ship("a").next_fire_at, 1_000 + world.config.base_fire_rate_ms);
    }

    #[test]
    fn test_expired_entities_removed_without_ships() {
        let mut world = World::new();
        world.projectile("old-shot", "a", 0.0, 0.0, 500);
        world.projectile("new-shot", "a", 0.0, 0.0, 5_000);
        world.power_up("old", PowerUpKind::Shield, 0.0, 0.0, 500);

        world.step(500);

        assert!(world.store.projectile("old-shot").is_none());
        assert!(world.store.projectile("new-shot").is_some());
        assert!(world.store.power_up("old").is_none());
    }

    #[test]
    fn test_exploding_ship_skipped_until_revive() {
        let mut world = World::new();
        world.player("a", 50.0, 50.0);
        world.player("b", 900.0, 900.0);
        let config = world.config.clone();
        world.store.ship_mut("a").unwrap().explode(&config, 0);
        // Off the map so the revived ship cannot land on it
        world.projectile("shot", "b", -10_000.0, -10_000.0, 60_000);

        world.step(config.revive_delay_ms - 1);
        assert!(world.ship("a").is_exploding);
        assert!(world.store.projectile("shot").is_some());

        let events = world.step(config.revive_delay_ms);
        assert!(!world.ship("a").is_exploding);
        assert!(world.store.projectile("shot").is_some());
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::ShipRevived { ship_id } if ship_id == "a")));
    }

    #[test]
    fn test_shield_ignores_exploding_ship() {
        let mut world = World::new();
        world.player("a", 100.0, 100.0);
        world.player("b", 110.0, 100.0);
        world.give("a", PowerUpKind::Shield);
        world.ship_score("b", 4);
        let config = world.config.clone();
        world.store.ship_mut("b").unwrap().explode(&config, 0);

        let events = world.step(1_000);

        assert_eq!(world.ship("a").score, 0);
        assert_eq!(world.ship("b").score, 3);
        assert_eq!(world.ship("b").revive_at, config.revive_delay_ms);
        assert!(events.is_empty());
    }

    #[test]
    fn test_exploding_ship_collects_nothing() {
        let mut world = World::new();
        world.player("a", 200.0, 200.0);
        let config = world.config.clone();
        world.store.ship_mut("a").unwrap().explode(&config, 0);
        world.power_up("boost", PowerUpKind::Speed, 200.0, 200.0, 50_000);

        let events = world.step(1_000);

        assert_eq!(world.ship("a").power_up, None);
        assert!(world.store.power_up("boost").is_some());
        assert!(events.is_empty());
    }

    #[test]
    fn test_revived_ship_can_be_hit_same_tick() {
        let mut world = World::with_config(GameConfig {
            map_width: 1.0,
            map_height: 1.0,
            ..Default::default()
        });
        world.player("a", 0.0, 0.0);
        world.player("b", 0.5, 0.5);
        let config = world.config.clone();
        world.store.ship_mut("a").unwrap().explode(&config, 0);
        // The 1x1 map puts the revived ship right on top of the shot
        world.projectile("shot", "b", 0.5, 0.5, 60_000);

        world.step(config.revive_delay_ms);

        let ship = world.ship("a");
        assert!(ship.is_exploding);
        assert_eq!(ship.revive_at, config.revive_delay_ms * 2);
        assert!(world.store.projectile("shot").is_none());
    }

    #[test]
    fn test_bot_kill_emits_chat() {
        let mut world = World::new();
        world.player("human", 300.0, 300.0);
        world.bot("owner", 305.0, 300.0);
        world.give("bot:owner", PowerUpKind::Shield);

        let events = world.step(1_000);

        assert!(world.ship("human").is_exploding);
        let chat = events
            .iter()
            .find_map(|e| match e {
                GameEvent::Chat(chat) => Some(chat),
                _ => None,
            })
            .expect("bot taunts after a kill");
        assert_eq!(chat.player_id, "bot:owner");
        assert_eq!(chat.username, "Rusty");
        assert!(!chat.message.is_empty());
    }

    impl World {
        fn ship_score(&mut self, id: &str, score: u32) {
            self.store.ship_mut(id).unwrap().score = score;
        }
    }
}
