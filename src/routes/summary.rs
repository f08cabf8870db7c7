use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::summary::{StoredSummary, SummaryAck, SummaryPayload},
    error::AppError,
    services::summary_service,
    state::SharedState,
};

/// Routes handling session summary storage and retrieval.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/summary", post(save_summary))
        .route("/summary/{player_id}", get(get_summary))
}

/// Record the submitting player's session summary.
#[utoipa::path(
    post,
    path = "/summary",
    tag = "summary",
    request_body = SummaryPayload,
    responses(
        (status = 200, description = "Summary recorded", body = SummaryAck)
    )
)]
pub async fn save_summary(
    State(state): State<SharedState>,
    Json(payload): Json<SummaryPayload>,
) -> Result<Json<SummaryAck>, AppError> {
    payload.validate()?;
    let _ = summary_service::save(&state, payload);
    Ok(Json(SummaryAck { ok: true }))
}

/// Fetch the summary previously recorded for a player.
#[utoipa::path(
    get,
    path = "/summary/{player_id}",
    tag = "summary",
    params(("player_id" = String, Path, description = "Identifier of the player")),
    responses(
        (status = 200, description = "Summary found", body = StoredSummary),
        (status = 404, description = "No summary recorded for this player")
    )
)]
pub async fn get_summary(
    State(state): State<SharedState>,
    Path(player_id): Path<String>,
) -> Result<Json<StoredSummary>, AppError> {
    let stored = summary_service::find(&state, &player_id)?;
    Ok(Json(stored))
}
