use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the Roulette Arena backend.
#[openapi(
    paths(
        crate::routes::health::health,
        crate::routes::rooms::create_or_reset_room,
        crate::routes::rooms::reset_room,
        crate::routes::summary::save_summary,
        crate::routes::summary::get_summary,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::RoomCreated,
            crate::dto::summary::SummaryPayload,
            crate::dto::summary::StoredSummary,
            crate::dto::summary::SummaryAck,
            crate::dto::ws::ClientEvent,
            crate::dto::ws::ServerEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room bootstrap operations"),
        (name = "summary", description = "Session summary storage"),
        (name = "arena", description = "WebSocket operations for arena clients"),
    )
)]
pub struct ApiDoc;
