//! Wire protocol for the per-room WebSocket stream.
//!
//! Both directions are closed tagged unions over `{type, payload}` frames so
//! adding a message kind is a compile-time-checked change.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Messages accepted from arena WebSocket clients.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Register the player in the room and receive the opening question.
    Join(JoinPayload),
    /// Submit an answer against a previously issued question.
    Submit(SubmitPayload),
}

impl ClientEvent {
    /// Parse a client frame from its JSON text representation.
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Payload of a `join` frame.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    /// Client-generated identifier, stable for the session.
    pub player_id: String,
}

/// Payload of a `submit` frame.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPayload {
    /// The player's answer text, compared trimmed and case-insensitively.
    pub answer: String,
    /// Identifier of the question the answer refers to; stale ids are dropped.
    pub question_id: String,
}

/// Messages pushed from the authoritative room to its clients.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, ToSchema)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A freshly issued question for the receiving player.
    Question(Question),
    /// Outcome of the player's last submission.
    Result(AnswerResult),
    /// Probabilistic life/death resolution after a wrong answer.
    Trigger(TriggerEvent),
    /// Informational message for the receiving player.
    Notice(Notice),
    /// Authoritative room snapshot broadcast to every member.
    Room(RoomSnapshot),
    /// Terminal broadcast; the room never leaves this state.
    GameOver(GameOverEvent),
}

/// A prompt issued to one player.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Question identifier, unique within the player's sequence.
    pub id: String,
    /// Prompt text shown to the player.
    pub prompt: String,
    /// Canonical answer, compared case-insensitively.
    pub answer: String,
}

/// Result of scoring one submission.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    /// Whether the submission matched the canonical answer.
    pub correct: bool,
    /// Points awarded for this submission (10 or 0).
    pub score_delta: u32,
    /// The player's cumulative score after this submission.
    pub total_score: u32,
}

/// Life/death outcome of a trigger resolution.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOutcome {
    /// The player survived the trigger.
    Alive,
    /// The player was eliminated.
    Dead,
}

/// Trigger resolution pushed to the submitting player.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    /// Whether the player survived.
    pub outcome: TriggerOutcome,
    /// Human-readable flavor text for the overlay.
    pub message: String,
}

/// Informational notice for one player.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    /// Notice text, e.g. a difficulty change announcement.
    pub message: String,
}

/// Public projection of one roster entry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    /// Player identifier.
    pub id: String,
    /// Cumulative score.
    pub score: u32,
    /// Whether the player is still alive.
    pub alive: bool,
}

/// Authoritative room snapshot.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Identifier of the room.
    pub room_id: String,
    /// Roster in join order.
    pub players: Vec<PlayerSummary>,
    /// Number of roster entries still alive.
    pub alive_count: usize,
    /// Number of eliminated roster entries.
    pub dead_count: usize,
    /// Seconds remaining, as computed by the server.
    pub time_left: u64,
    /// Total round length in seconds.
    pub duration_seconds: u64,
    /// Server wall clock at emission, for client offset derivation.
    pub server_now_ms: u64,
    /// Wall-clock start of the round; `null` while the room is waiting.
    pub started_at_ms: Option<u64>,
}

/// Reason a room reached its terminal state.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    /// The round timer expired.
    Timeout,
    /// A kill left at most one player standing.
    LastAlive,
    /// Re-sent terminal snapshot for late joiners or idempotent reads.
    Ended,
}

/// Terminal broadcast payload.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameOverEvent {
    /// Winning player, if any.
    pub winner_id: Option<String>,
    /// Why the room ended.
    pub reason: GameOverReason,
    /// Final room snapshot, flattened into the payload.
    #[serde(flatten)]
    pub room: RoomSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_join_frame_round_trips() {
        let raw = r#"{"type":"join","payload":{"playerId":"p1"}}"#;
        let event = ClientEvent::from_json_str(raw).unwrap();
        match &event {
            ClientEvent::Join(payload) => assert_eq!(payload.player_id, "p1"),
            other => panic!("expected join, got {other:?}"),
        }
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(
            encoded,
            json!({"type":"join","payload":{"playerId":"p1"}})
        );
    }

    #[test]
    fn client_submit_frame_uses_camel_case_keys() {
        let raw = r#"{"type":"submit","payload":{"answer":"chance","questionId":"q1"}}"#;
        let event = ClientEvent::from_json_str(raw).unwrap();
        match event {
            ClientEvent::Submit(payload) => {
                assert_eq!(payload.answer, "chance");
                assert_eq!(payload.question_id, "q1");
            }
            other => panic!("expected submit, got {other:?}"),
        }
    }

    #[test]
    fn trigger_event_serializes_to_wire_shape() {
        let event = ServerEvent::Trigger(TriggerEvent {
            outcome: TriggerOutcome::Dead,
            message: "YOU DIED.".into(),
        });
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(
            encoded,
            json!({"type":"trigger","payload":{"outcome":"dead","message":"YOU DIED."}})
        );
    }

    #[test]
    fn game_over_flattens_room_fields() {
        let event = ServerEvent::GameOver(GameOverEvent {
            winner_id: Some("p1".into()),
            reason: GameOverReason::Timeout,
            room: RoomSnapshot {
                room_id: "r1".into(),
                players: vec![PlayerSummary {
                    id: "p1".into(),
                    score: 30,
                    alive: true,
                }],
                alive_count: 1,
                dead_count: 0,
                time_left: 0,
                duration_seconds: 180,
                server_now_ms: 1_000,
                started_at_ms: Some(500),
            },
        });
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["type"], "game_over");
        assert_eq!(encoded["payload"]["winnerId"], "p1");
        assert_eq!(encoded["payload"]["reason"], "timeout");
        assert_eq!(encoded["payload"]["roomId"], "r1");
        assert_eq!(encoded["payload"]["aliveCount"], 1);
        assert_eq!(encoded["payload"]["startedAtMs"], 500);
    }

    #[test]
    fn unknown_message_kind_is_rejected() {
        assert!(ClientEvent::from_json_str(r#"{"type":"emote","payload":{}}"#).is_err());
    }
}
