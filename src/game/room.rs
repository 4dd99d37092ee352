//! Room state and authoritative tick loop

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::GameConfig;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, RoomSnapshot, ServerMsg};

use super::entities::EntityStore;
use super::input::{apply_projectile_state, apply_ship_state, may_control};
use super::session::{LeaveOutcome, SessionBinding};
use super::simulation::Simulation;
use super::snapshot::{build_snapshot, SnapshotBuilder};
use super::spawner::PowerUpSpawner;
use super::{ClientInput, ConnectionId, GameEvent, Millis, Outbound};

/// Suggested ping interval per connected client
const PING_DELAY_PER_CLIENT_MS: u64 = 100;
/// Upper bound on the suggested ping interval
const MAX_PING_DELAY_MS: u64 = 1_000;

/// Room errors surfaced to the transport
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Room is full")]
    Full,

    #[error("Room is closed")]
    Closed,
}

/// Commands processed by the room task, one at a time
#[derive(Debug)]
pub enum RoomCommand {
    Connect {
        connection_id: ConnectionId,
        player_id: Option<String>,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Input(ClientInput),
    Disconnect {
        connection_id: ConnectionId,
        consented: bool,
    },
    ReconnectExpired {
        player_id: String,
        generation: u64,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
}

/// Room state (owned by room task)
pub struct RoomState {
    pub id: String,
    pub tick: u64,
    pub store: EntityStore,
    clients: HashSet<ConnectionId>,
    config: Arc<GameConfig>,
    session: SessionBinding,
    spawner: PowerUpSpawner,
    simulation: Simulation,
    rng: ChaCha8Rng,
}

impl RoomState {
    pub fn new(id: String, config: Arc<GameConfig>, seed: u64) -> Self {
        Self {
            id,
            tick: 0,
            store: EntityStore::new(),
            clients: HashSet::new(),
            session: SessionBinding::new(config.clone()),
            spawner: PowerUpSpawner::new(config.clone()),
            simulation: Simulation::new(config.clone()),
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Suggested delay before a client's next ping
    pub fn ping_delay(&self) -> u64 {
        (self.clients.len() as u64 * PING_DELAY_PER_CLIENT_MS).min(MAX_PING_DELAY_MS)
    }

    /// Admit a connection. Returns true if it reclaimed an existing ship.
    pub fn connect(
        &mut self,
        connection_id: ConnectionId,
        player_id: Option<&str>,
    ) -> Result<bool, RoomError> {
        if !self.clients.contains(&connection_id) && self.clients.len() >= self.config.max_clients
        {
            return Err(RoomError::Full);
        }
        self.clients.insert(connection_id);

        Ok(player_id
            .map(|player_id| self.session.on_join(&mut self.store, connection_id, player_id))
            .unwrap_or(false))
    }

    pub fn disconnect(&mut self, connection_id: ConnectionId, consented: bool) -> LeaveOutcome {
        self.clients.remove(&connection_id);
        self.session
            .on_leave(&mut self.store, connection_id, consented)
    }

    pub fn expire_reconnection(&mut self, player_id: &str) -> bool {
        self.session.expire_reconnection(&mut self.store, player_id)
    }

    /// Apply one client message. Returns the messages it triggers.
    pub fn handle_message(&mut self, connection_id: ConnectionId, msg: ClientMsg) -> Vec<Outbound> {
        match msg {
            ClientMsg::Ping => {
                vec![Outbound::to(
                    connection_id,
                    ServerMsg::Pong {
                        delay: self.ping_delay(),
                    },
                )]
            }
            ClientMsg::StateUpdate {
                ship,
                projectiles,
                ship_id,
            } => {
                let Some(sender) = self
                    .session
                    .player_for_connection(&self.store, connection_id)
                else {
                    return Vec::new();
                };

                let target = ship_id.unwrap_or_else(|| sender.clone());
                if !may_control(&self.store, &sender, &target) {
                    debug!(
                        room_id = %self.id,
                        player_id = %sender,
                        ship_id = %target,
                        "Ignoring state update for a ship the player does not control"
                    );
                    return Vec::new();
                }

                apply_ship_state(&mut self.store, &target, &ship);
                apply_projectile_state(&mut self.store, &projectiles);
                Vec::new()
            }
            ClientMsg::StartGame {
                player_id,
                username,
            } => {
                self.session.start_game(
                    &mut self.store,
                    connection_id,
                    &player_id,
                    username.as_deref(),
                    &mut self.rng,
                );
                Vec::new()
            }
            ClientMsg::ChatMessage(chat) => vec![Outbound::all(ServerMsg::ChatMessage(chat))],
        }
    }

    /// Run one simulation tick at room time `now`
    pub fn tick(&mut self, now: Millis) -> Vec<GameEvent> {
        self.tick += 1;
        if let Some(power_up_id) = self.spawner.tick(&mut self.store, now, &mut self.rng) {
            debug!(
                room_id = %self.id,
                power_up_id = %power_up_id,
                next_spawn_at = self.spawner.next_spawn_at(),
                "Power-up spawned"
            );
        }
        self.simulation.step(&mut self.store, now, &mut self.rng)
    }

    pub fn dispose(&mut self) {
        self.session.on_dispose(&mut self.store);
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        build_snapshot(self.tick, &self.store, Vec::new())
    }
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: String,
    command_tx: mpsc::Sender<RoomCommand>,
    outbound_tx: broadcast::Sender<Outbound>,
    client_count: Arc<AtomicUsize>,
}

impl RoomHandle {
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::Relaxed)
    }

    /// Join the room. The receiver carries every message addressed to this room.
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        player_id: Option<String>,
    ) -> Result<broadcast::Receiver<Outbound>, RoomError> {
        // Subscribe first so the welcome cannot be missed
        let outbound_rx = self.outbound_tx.subscribe();
        let (reply, response) = oneshot::channel();

        self.command_tx
            .send(RoomCommand::Connect {
                connection_id,
                player_id,
                reply,
            })
            .await
            .map_err(|_| RoomError::Closed)?;

        response.await.map_err(|_| RoomError::Closed)??;
        Ok(outbound_rx)
    }

    pub async fn send_input(
        &self,
        connection_id: ConnectionId,
        msg: ClientMsg,
    ) -> Result<(), RoomError> {
        self.command_tx
            .send(RoomCommand::Input(ClientInput { connection_id, msg }))
            .await
            .map_err(|_| RoomError::Closed)
    }

    pub async fn disconnect(&self, connection_id: ConnectionId, consented: bool) {
        let _ = self
            .command_tx
            .send(RoomCommand::Disconnect {
                connection_id,
                consented,
            })
            .await;
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(RoomCommand::Snapshot { reply })
            .await
            .map_err(|_| RoomError::Closed)?;
        response.await.map_err(|_| RoomError::Closed)
    }

    fn is_same_room(&self, other: &RoomHandle) -> bool {
        self.command_tx.same_channel(&other.command_tx)
    }
}

/// Registry of all active rooms
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
    config: Arc<GameConfig>,
}

impl RoomRegistry {
    pub fn new(config: Arc<GameConfig>) -> Self {
        Self {
            rooms: DashMap::new(),
            config,
        }
    }

    pub fn get(&self, id: &str) -> Option<RoomHandle> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    /// Existing room, or a freshly spawned one
    pub fn get_or_create(self: &Arc<Self>, id: &str) -> RoomHandle {
        self.rooms
            .entry(id.to_string())
            .or_insert_with(|| self.spawn_room(id.to_string()))
            .value()
            .clone()
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_clients(&self) -> usize {
        self.rooms.iter().map(|r| r.value().client_count()).sum()
    }

    fn spawn_room(self: &Arc<Self>, id: String) -> RoomHandle {
        let (room, handle) = GameRoom::new(id.clone(), self.config.clone(), rand::random());
        let registry = Arc::clone(self);
        let own_handle = handle.clone();

        tokio::spawn(async move {
            room.run().await;
            registry
                .rooms
                .remove_if(&id, |_, current| current.is_same_room(&own_handle));
        });

        handle
    }
}

/// The authoritative game room
pub struct GameRoom {
    state: RoomState,
    config: Arc<GameConfig>,
    command_rx: mpsc::Receiver<RoomCommand>,
    /// Handed to reconnection timers so they can report back
    command_tx: mpsc::Sender<RoomCommand>,
    outbound_tx: broadcast::Sender<Outbound>,
    snapshot_builder: SnapshotBuilder,
    reconnect_timers: HashMap<String, ReconnectTimer>,
    next_timer_generation: u64,
    client_count: Arc<AtomicUsize>,
    started_at: Instant,
}

/// Pending removal of a dropped player
struct ReconnectTimer {
    /// Matches the `ReconnectExpired` this timer will send
    generation: u64,
    handle: JoinHandle<()>,
}

impl GameRoom {
    /// Create a new room
    pub fn new(id: String, config: Arc<GameConfig>, seed: u64) -> (Self, RoomHandle) {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (outbound_tx, _) = broadcast::channel(256);
        let client_count = Arc::new(AtomicUsize::new(0));

        let handle = RoomHandle {
            id: id.clone(),
            command_tx: command_tx.clone(),
            outbound_tx: outbound_tx.clone(),
            client_count: client_count.clone(),
        };

        let room = Self {
            state: RoomState::new(id, config.clone(), seed),
            snapshot_builder: SnapshotBuilder::new(config.snapshot_interval_ticks()),
            config,
            command_rx,
            command_tx,
            outbound_tx,
            reconnect_timers: HashMap::new(),
            next_timer_generation: 0,
            client_count,
            started_at: Instant::now(),
        };

        (room, handle)
    }

    /// Room clock in milliseconds since creation
    fn now(&self) -> Millis {
        self.started_at.elapsed().as_millis() as Millis
    }

    /// Run the authoritative tick loop until the room empties out
    pub async fn run(mut self) {
        info!(room_id = %self.state.id, "Room opened");

        let tick_duration = Duration::from_micros(1_000_000 / self.config.tick_rate_hz as u64);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    self.run_tick();
                }
                Some(command) = self.command_rx.recv() => {
                    if self.handle_command(command) {
                        break;
                    }
                }
            }
        }

        for (_, timer) in self.reconnect_timers.drain() {
            timer.handle.abort();
        }
        self.state.dispose();
        info!(room_id = %self.state.id, ticks = self.state.tick, "Room disposed");
    }

    /// Apply a command. Returns true when the room should shut down.
    fn handle_command(&mut self, command: RoomCommand) -> bool {
        match command {
            RoomCommand::Connect {
                connection_id,
                player_id,
                reply,
            } => {
                let result = self.handle_connect(connection_id, player_id);
                let _ = reply.send(result);
                false
            }
            RoomCommand::Input(input) => {
                for outbound in self.state.handle_message(input.connection_id, input.msg) {
                    self.publish(outbound);
                }
                false
            }
            RoomCommand::Disconnect {
                connection_id,
                consented,
            } => {
                self.handle_disconnect(connection_id, consented);
                self.should_dispose()
            }
            RoomCommand::ReconnectExpired {
                player_id,
                generation,
            } => {
                let current = self
                    .reconnect_timers
                    .get(&player_id)
                    .is_some_and(|timer| timer.generation == generation);
                if !current {
                    debug!(
                        room_id = %self.state.id,
                        player_id = %player_id,
                        generation,
                        "Ignoring expiry from a cancelled reconnection timer"
                    );
                    return false;
                }

                self.reconnect_timers.remove(&player_id);
                if self.state.expire_reconnection(&player_id) {
                    info!(
                        room_id = %self.state.id,
                        player_id = %player_id,
                        "Reconnection window expired"
                    );
                }
                self.should_dispose()
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
                false
            }
        }
    }

    fn handle_connect(
        &mut self,
        connection_id: ConnectionId,
        player_id: Option<String>,
    ) -> Result<(), RoomError> {
        let rejoined = match self.state.connect(connection_id, player_id.as_deref()) {
            Ok(rejoined) => rejoined,
            Err(e) => {
                warn!(
                    room_id = %self.state.id,
                    connection_id = %connection_id,
                    error = %e,
                    "Connection rejected"
                );
                return Err(e);
            }
        };
        self.sync_client_count();

        if rejoined {
            if let Some(timer) = player_id
                .as_ref()
                .and_then(|player_id| self.reconnect_timers.remove(player_id))
            {
                timer.handle.abort();
            }
        }

        self.publish(Outbound::to(
            connection_id,
            ServerMsg::Welcome {
                connection_id,
                server_time: unix_millis(),
            },
        ));

        info!(
            room_id = %self.state.id,
            connection_id = %connection_id,
            rejoined,
            client_count = self.state.client_count(),
            "Client joined room"
        );
        Ok(())
    }

    fn handle_disconnect(&mut self, connection_id: ConnectionId, consented: bool) {
        let outcome = self.state.disconnect(connection_id, consented);
        self.sync_client_count();

        info!(
            room_id = %self.state.id,
            connection_id = %connection_id,
            consented,
            client_count = self.state.client_count(),
            ships = self.state.store.ship_count(),
            "Client left room"
        );

        if let LeaveOutcome::AwaitReconnect { player_id } = outcome {
            self.schedule_removal(player_id);
        }
    }

    /// Remove the player after the grace period unless a rejoin cancels it first
    fn schedule_removal(&mut self, player_id: String) {
        let grace = Duration::from_millis(self.config.reconnect_grace_ms);
        let command_tx = self.command_tx.clone();
        let expired_player = player_id.clone();
        self.next_timer_generation += 1;
        let generation = self.next_timer_generation;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = command_tx
                .send(RoomCommand::ReconnectExpired {
                    player_id: expired_player,
                    generation,
                })
                .await;
        });

        let timer = ReconnectTimer { generation, handle };
        if let Some(previous) = self.reconnect_timers.insert(player_id, timer) {
            previous.handle.abort();
        }
    }

    fn should_dispose(&self) -> bool {
        self.state.client_count() == 0 && self.reconnect_timers.is_empty()
    }

    fn run_tick(&mut self) {
        let now = self.now();
        let events = self.state.tick(now);

        for event in &events {
            match event {
                GameEvent::Chat(chat) => {
                    self.publish(Outbound::all(ServerMsg::ChatMessage(chat.clone())));
                }
                GameEvent::ShipDestroyed { .. } => self.snapshot_builder.force_next(),
                _ => {}
            }
        }
        self.snapshot_builder.record(&events);

        if self.snapshot_builder.should_send() {
            let snapshot = self.snapshot_builder.build(self.state.tick, &self.state.store);
            self.publish(Outbound::all(ServerMsg::State(snapshot)));
        }
    }

    fn publish(&self, outbound: Outbound) {
        // No subscribers just means nobody is listening right now
        let _ = self.outbound_tx.send(outbound);
    }

    fn sync_client_count(&self) {
        self.client_count
            .store(self.state.client_count(), Ordering::Relaxed);
    }
}
