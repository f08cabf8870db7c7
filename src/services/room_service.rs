//! Room bootstrap and round timer supervision.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::info;

use crate::{
    dto::room::{CreateRoomRequest, RoomCreated},
    dto::validation::validate_room_id,
    error::ServiceError,
    state::{RoomHandle, SharedState, questions::QuestionPool, room::RoomMachine},
};

/// Create the room if absent, optionally discarding prior state.
///
/// Idempotent in every combination: bootstrapping an existing room without
/// `reset` returns it unchanged, and resetting recreates it in `waiting`
/// with the timer cancelled.
pub async fn create_or_reset(
    state: &SharedState,
    room_id: &str,
    request: CreateRoomRequest,
) -> Result<RoomCreated, ServiceError> {
    validate_room_id(room_id)
        .map_err(|_| ServiceError::InvalidInput(format!("invalid room id `{room_id}`")))?;

    let config = state.config();
    let duration = request
        .duration_seconds
        .unwrap_or_else(|| config.round_duration_secs());

    let handle = {
        let entry = state.rooms().entry(room_id.to_string()).or_insert_with(|| {
            info!(room = %room_id, duration, "creating room");
            Arc::new(RoomHandle::new(RoomMachine::new(
                room_id,
                duration,
                config.survival_probability(),
                QuestionPool::new(config.questions()),
            )))
        });
        entry.value().clone()
    };

    if request.reset {
        handle.abort_timer();
        handle.machine().lock().await.reset(request.duration_seconds);
    }

    Ok(RoomCreated {
        ok: true,
        room_id: room_id.to_string(),
    })
}

/// Force a room back to `waiting`, creating it first when absent.
pub async fn reset(state: &SharedState, room_id: &str) -> Result<RoomCreated, ServiceError> {
    create_or_reset(
        state,
        room_id,
        CreateRoomRequest {
            duration_seconds: None,
            reset: true,
        },
    )
    .await
}

/// Spawn the round timer for a freshly activated room.
///
/// On expiry the task re-acquires the room's serialization lock, so a
/// concurrent `last_alive` finish wins the race and the timeout becomes a
/// no-op.
pub fn start_round_timer(room: Arc<RoomHandle>, duration_secs: u64) {
    let timer_room = room.clone();
    let handle = tokio::spawn(async move {
        sleep(Duration::from_secs(duration_secs)).await;
        let terminal = {
            let mut machine = timer_room.machine().lock().await;
            machine.expire()
        };
        if let Some(event) = terminal {
            timer_room.broadcast(&event);
        }
    });
    room.install_timer(handle);
}
