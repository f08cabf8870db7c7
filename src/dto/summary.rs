//! Session summary payloads recorded once a match reaches its terminal view.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::dto::validation::validate_player_id;

/// One scoreboard row inside a summary.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    /// Display label for the player.
    pub name: String,
    /// Final score.
    pub score: u32,
    /// Whether the player ended the match eliminated.
    pub dead: bool,
}

/// Session summary submitted by a client after `game_over`.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryPayload {
    /// Identifier of the player the summary belongs to.
    pub player_id: String,
    /// Seconds the player stayed in the round before it ended for them.
    pub survival_seconds: u64,
    /// Alive players at match end.
    pub alive_count: usize,
    /// Eliminated players at match end.
    pub dead_count: usize,
    /// Final scoreboard, highest score first.
    pub scores: Vec<ScoreEntry>,
}

impl Validate for SummaryPayload {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_player_id(&self.player_id) {
            errors.add("player_id", e);
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Stored summary returned by `GET /summary/{player_id}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredSummary {
    /// The submitted payload, echoed back verbatim.
    #[serde(flatten)]
    pub payload: SummaryPayload,
    /// RFC3339 timestamp of when the summary was recorded.
    pub recorded_at: String,
}

/// Acknowledgement returned by `POST /summary`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryAck {
    /// Always true when the summary was stored.
    pub ok: bool,
}
