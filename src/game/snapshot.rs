//! Snapshot building for network transmission

use crate::ws::protocol::{
    PowerUpSnapshot, ProjectileSnapshot, RoomSnapshot, ShipSnapshot, WorldEvent,
};

use super::entities::{EntityStore, PowerUp, PowerUpKind, Projectile, Ship};
use super::GameEvent;

/// Decides when to broadcast and collects events between broadcasts
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
    /// Events waiting for the next snapshot
    pending_events: Vec<WorldEvent>,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
            pending_events: Vec::new(),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for important events)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Queue the snapshot-worthy part of a tick's events
    pub fn record(&mut self, events: &[GameEvent]) {
        self.pending_events
            .extend(events.iter().filter_map(world_event));
    }

    /// Build a snapshot message, draining queued events
    pub fn build(&mut self, tick: u64, store: &EntityStore) -> RoomSnapshot {
        let events = std::mem::take(&mut self.pending_events);
        build_snapshot(tick, store, events)
    }
}

/// Snapshot of the store with an explicit event list
pub fn build_snapshot(tick: u64, store: &EntityStore, events: Vec<WorldEvent>) -> RoomSnapshot {
    RoomSnapshot {
        tick,
        ships: store.ships().map(ship_snapshot).collect(),
        projectiles: store.projectiles().map(projectile_snapshot).collect(),
        power_ups: store.power_ups().map(power_up_snapshot).collect(),
        events,
    }
}

fn ship_snapshot(ship: &Ship) -> ShipSnapshot {
    ShipSnapshot {
        id: ship.id.clone(),
        username: ship.username.clone(),
        is_bot: ship.is_bot,
        owner_id: ship.owner_id.clone(),
        connected: ship.connected,
        x: ship.x,
        y: ship.y,
        speed_x: ship.speed_x,
        speed_y: ship.speed_y,
        rotation: ship.rotation,
        is_shooting: ship.is_shooting,
        is_turning_left: ship.is_turning_left,
        is_turning_right: ship.is_turning_right,
        is_accelerating: ship.is_accelerating,
        score: ship.score,
        power_up: PowerUpKind::code_of(ship.power_up),
        power_up_expires_at: ship.power_up_expires_at,
        fire_rate: ship.fire_rate_ms,
        max_velocity: ship.max_velocity,
        angular_velocity: ship.angular_velocity,
        is_exploding: ship.is_exploding,
        revive_at: ship.revive_at,
    }
}

fn projectile_snapshot(projectile: &Projectile) -> ProjectileSnapshot {
    ProjectileSnapshot {
        id: projectile.id.clone(),
        owner_id: projectile.owner_id.clone(),
        x: projectile.x,
        y: projectile.y,
        rotation: projectile.rotation,
        expires_at: projectile.expires_at,
    }
}

fn power_up_snapshot(power_up: &PowerUp) -> PowerUpSnapshot {
    PowerUpSnapshot {
        id: power_up.id.clone(),
        kind: power_up.kind.code(),
        x: power_up.x,
        y: power_up.y,
        expires_at: power_up.expires_at,
    }
}

/// Chat goes out on its own; everything else rides in the snapshot
fn world_event(event: &GameEvent) -> Option<WorldEvent> {
    match event {
        GameEvent::ShipDestroyed {
            ship_id,
            destroyed_by,
            cause,
            points,
        } => Some(WorldEvent::ShipDestroyed {
            ship_id: ship_id.clone(),
            destroyed_by: destroyed_by.clone(),
            cause: *cause,
            points: *points,
        }),
        GameEvent::ShipRevived { ship_id } => Some(WorldEvent::ShipRevived {
            ship_id: ship_id.clone(),
        }),
        GameEvent::PowerUpCollected { ship_id, kind } => Some(WorldEvent::PowerUpCollected {
            ship_id: ship_id.clone(),
            power_up: kind.code(),
        }),
        GameEvent::Chat(_) => None,
    }
}
