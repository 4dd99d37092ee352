//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::RoomRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rooms: Arc<RoomRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Every room gets the same immutable tuning
        let rooms = Arc::new(RoomRegistry::new(Arc::new(config.game.clone())));

        Self { config, rooms }
    }
}
