//! In-memory storage for post-match session summaries.

use std::time::SystemTime;

use crate::{
    dto::format_system_time,
    dto::summary::{StoredSummary, SummaryPayload},
    error::ServiceError,
    state::SharedState,
};

/// Record a summary for its player, replacing any previous one.
pub fn save(state: &SharedState, payload: SummaryPayload) -> StoredSummary {
    let stored = StoredSummary {
        payload,
        recorded_at: format_system_time(SystemTime::now()),
    };
    state
        .summaries()
        .insert(stored.payload.player_id.clone(), stored.clone());
    stored
}

/// Fetch the summary recorded for `player_id`.
pub fn find(state: &SharedState, player_id: &str) -> Result<StoredSummary, ServiceError> {
    state
        .summaries()
        .get(player_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| ServiceError::NotFound(format!("no summary for player `{player_id}`")))
}
