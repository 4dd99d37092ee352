//! Input ingestion - client-reported ship and projectile state.
//!
//! Clients own their kinematics: values are copied verbatim with no
//! validation. Any server-side physics check belongs here, not in the
//! simulation step.

use crate::ws::protocol::{ProjectilePosition, ShipState};

use super::entities::EntityStore;

/// Overwrite a ship's intent and kinematics. Unknown ships are ignored.
pub fn apply_ship_state(store: &mut EntityStore, ship_id: &str, state: &ShipState) -> bool {
    let Some(ship) = store.ship_mut(ship_id) else {
        return false;
    };

    ship.is_shooting = state.is_shooting;
    ship.is_turning_left = state.is_turning_left;
    ship.is_turning_right = state.is_turning_right;
    ship.is_accelerating = state.is_accelerating;
    ship.x = state.x;
    ship.y = state.y;
    ship.speed_x = state.speed_x;
    ship.speed_y = state.speed_y;
    ship.rotation = state.rotation;
    true
}

/// Move known projectiles. Ids that already expired or hit are skipped.
pub fn apply_projectile_state(store: &mut EntityStore, updates: &[ProjectilePosition]) -> usize {
    let mut applied = 0;
    for update in updates {
        if let Some(projectile) = store.projectile_mut(&update.id) {
            projectile.x = update.x;
            projectile.y = update.y;
            applied += 1;
        }
    }
    applied
}

/// Whether `sender` may drive `ship_id`: its own ship or its paired bot
pub fn may_control(store: &EntityStore, sender: &str, ship_id: &str) -> bool {
    if sender == ship_id {
        return true;
    }
    store
        .ship(ship_id)
        .is_some_and(|ship| ship.owner_id.as_deref() == Some(sender))
}
