//! Lifecycle handling for per-room player WebSocket connections.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientEvent, ServerEvent},
    services::room_service,
    state::{RoomConnection, RoomHandle, SharedState, room::Effects},
};

/// How long a fresh connection may stay silent before it must send `join`.
const IDENT_TIMEOUT: Duration = Duration::from_secs(10);
/// Close code used when the requested room does not exist.
const POLICY_VIOLATION: u16 = 1008;

/// Internal error type for socket handling operations.
#[derive(Debug, Error)]
enum SessionError {
    /// Writer channel closed; the connection should be terminated.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Handle the full lifecycle for an individual player WebSocket connection.
pub async fn handle_socket(state: SharedState, room_id: String, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let Some(room) = state.room(&room_id) else {
        warn!(room = %room_id, "connection to unknown room refused");
        let _ = outbound_tx.send(Message::Close(Some(CloseFrame {
            code: POLICY_VIOLATION,
            reason: "unknown room".into(),
        })));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(room = %room_id, error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!(room = %room_id, "websocket join timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let inbound = match ClientEvent::from_json_str(&initial_message) {
        Ok(message) => message,
        Err(err) => {
            warn!(room = %room_id, error = %err, "failed to parse client frame");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let ClientEvent::Join(join) = inbound else {
        warn!(room = %room_id, "first frame was not a join");
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    let player_id = join.player_id;
    let conn_id = Uuid::new_v4();
    room.connections().insert(
        conn_id,
        RoomConnection {
            player_id: player_id.clone(),
            tx: outbound_tx.clone(),
        },
    );
    info!(room = %room_id, player = %player_id, "player connected");

    let (fx, duration_secs) = {
        let mut machine = room.machine().lock().await;
        let fx = machine.join(&player_id);
        let duration = machine.duration_secs();
        (fx, duration)
    };
    if apply_effects(&room, &outbound_tx, fx, duration_secs).is_err() {
        info!(room = %room_id, player = %player_id, "connection closed during join, terminating");
        room.connections().remove(&conn_id);
        finalize(writer_task, outbound_tx).await;
        return;
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let parsed = match ClientEvent::from_json_str(&text) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        warn!(
                            room = %room_id,
                            player = %player_id,
                            error = %err,
                            "failed to parse client frame"
                        );
                        continue;
                    }
                };

                let applied = match parsed {
                    ClientEvent::Join(rejoin) => {
                        // A resumed session: re-send the current question and
                        // snapshot. A differing id on the same stream is ignored.
                        if rejoin.player_id != player_id {
                            warn!(
                                room = %room_id,
                                player = %player_id,
                                got = %rejoin.player_id,
                                "ignoring join with mismatched player id"
                            );
                            continue;
                        }
                        let mut machine = room.machine().lock().await;
                        let fx = machine.join(&player_id);
                        let duration = machine.duration_secs();
                        drop(machine);
                        apply_effects(&room, &outbound_tx, fx, duration)
                    }
                    ClientEvent::Submit(submit) => {
                        let mut machine = room.machine().lock().await;
                        let fx = machine.submit(
                            &player_id,
                            &submit.question_id,
                            &submit.answer,
                            &mut rand::rng(),
                        );
                        let duration = machine.duration_secs();
                        drop(machine);
                        apply_effects(&room, &outbound_tx, fx, duration)
                    }
                };

                if applied.is_err() {
                    info!(
                        room = %room_id,
                        player = %player_id,
                        "connection closed while applying effects, terminating"
                    );
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(room = %room_id, player = %player_id, "player closed connection");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(room = %room_id, player = %player_id, error = %err, "websocket error");
                break;
            }
        }
    }

    room.connections().remove(&conn_id);
    info!(room = %room_id, player = %player_id, "player disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Deliver one operation's effects: direct events, timer start, broadcast.
fn apply_effects(
    room: &Arc<RoomHandle>,
    tx: &mpsc::UnboundedSender<Message>,
    fx: Effects,
    duration_secs: u64,
) -> Result<(), SessionError> {
    for event in &fx.to_player {
        send_event(tx, event)?;
    }
    if fx.round_started {
        room_service::start_round_timer(room.clone(), duration_secs);
    }
    room.broadcast_all(&fx.broadcast);
    Ok(())
}

/// Serialize a server event and push it onto the provided writer channel.
///
/// Serialization failures are permanent (a bug in the event type) and only
/// logged; a closed writer is transient and reported to the caller.
fn send_event(tx: &mpsc::UnboundedSender<Message>, event: &ServerEvent) -> Result<(), SessionError> {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize event `{event:?}` (permanent error, not retrying)");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| SessionError::ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
