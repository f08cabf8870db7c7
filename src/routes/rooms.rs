use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use validator::Validate;

use crate::{
    dto::room::{CreateRoomRequest, RoomCreated},
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Routes handling room bootstrap operations.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms/{room_id}", post(create_or_reset_room))
        .route("/rooms/{room_id}/reset", post(reset_room))
}

/// Create the room if needed, optionally resetting it; idempotent.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Identifier of the room")),
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room bootstrapped", body = RoomCreated)
    )
)]
pub async fn create_or_reset_room(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    payload: Option<Json<CreateRoomRequest>>,
) -> Result<Json<RoomCreated>, AppError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    request.validate()?;
    let created = room_service::create_or_reset(&state, &room_id, request).await?;
    Ok(Json(created))
}

/// Discard the room's roster and timer, recreating it in `waiting`.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/reset",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Identifier of the room")),
    responses(
        (status = 200, description = "Room reset", body = RoomCreated)
    )
)]
pub async fn reset_room(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomCreated>, AppError> {
    let created = room_service::reset(&state, &room_id).await?;
    Ok(Json(created))
}
