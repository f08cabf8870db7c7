//! Room bootstrap request and response payloads.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Payload of `POST /rooms/{room_id}`.
///
/// Both fields are optional on the wire; an absent body behaves like
/// `{"reset": false}` so repeated bootstraps of a live room are idempotent.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    /// Round length override in seconds; the configured default applies when omitted.
    #[serde(default)]
    #[validate(range(min = 10, max = 3600))]
    pub duration_seconds: Option<u64>,
    /// When true, discard any prior roster and timer and recreate the room.
    #[serde(default)]
    pub reset: bool,
}

/// Response returned by the room bootstrap endpoints.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreated {
    /// Always true; bootstrap succeeds regardless of prior existence.
    pub ok: bool,
    /// Identifier of the bootstrapped room.
    pub room_id: String,
}
