//! Shared application state: the room registry and the summary store.

pub mod questions;
pub mod room;

use std::sync::{Arc, Mutex as StdMutex};

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dto::{summary::StoredSummary, ws::ServerEvent},
    state::room::RoomMachine,
};

/// Cheaply cloneable handle on [`AppState`].
pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle used to push messages to one connected room member.
pub struct RoomConnection {
    /// Player bound to this connection once the join frame arrived.
    pub player_id: String,
    /// Writer channel feeding the connection's WebSocket sender task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// One room: its serialized state machine, member connections, and timer.
///
/// The [`Mutex`] around the machine is the room's single-writer
/// serialization point (§5): every mutation, including the timer expiry,
/// must acquire it before touching room state.
pub struct RoomHandle {
    machine: Mutex<RoomMachine>,
    connections: DashMap<Uuid, RoomConnection>,
    timer: StdMutex<Option<JoinHandle<()>>>,
}

impl RoomHandle {
    /// Wrap a freshly created room machine.
    pub fn new(machine: RoomMachine) -> Self {
        Self {
            machine: Mutex::new(machine),
            connections: DashMap::new(),
            timer: StdMutex::new(None),
        }
    }

    /// The room's serialized state machine.
    pub fn machine(&self) -> &Mutex<RoomMachine> {
        &self.machine
    }

    /// Registry of live member connections keyed by connection id.
    pub fn connections(&self) -> &DashMap<Uuid, RoomConnection> {
        &self.connections
    }

    /// Number of currently open member connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Fan an event out to every member connection, dropping dead writers.
    pub fn broadcast(&self, event: &ServerEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize broadcast event");
                return;
            }
        };

        self.connections.retain(|_, connection| {
            connection
                .tx
                .send(Message::Text(payload.clone().into()))
                .is_ok()
        });
    }

    /// Broadcast a batch of events in order.
    pub fn broadcast_all(&self, events: &[ServerEvent]) {
        for event in events {
            self.broadcast(event);
        }
    }

    /// Install the round timer task, aborting any previous one.
    pub fn install_timer(&self, handle: JoinHandle<()>) {
        let mut slot = self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Abort the round timer, if one is running.
    pub fn abort_timer(&self) {
        let mut slot = self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

/// Central application state storing rooms and recorded session summaries.
pub struct AppState {
    config: AppConfig,
    rooms: DashMap<String, Arc<RoomHandle>>,
    summaries: DashMap<String, StoredSummary>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig) -> SharedState {
        Arc::new(Self {
            config,
            rooms: DashMap::new(),
            summaries: DashMap::new(),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registry of live rooms keyed by room id.
    pub fn rooms(&self) -> &DashMap<String, Arc<RoomHandle>> {
        &self.rooms
    }

    /// Look up a room handle by id.
    pub fn room(&self, room_id: &str) -> Option<Arc<RoomHandle>> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }

    /// Recorded session summaries keyed by player id.
    pub fn summaries(&self) -> &DashMap<String, StoredSummary> {
        &self.summaries
    }
}
