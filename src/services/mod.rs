//! Service layer sitting between the HTTP/WebSocket routes and room state.

pub mod documentation;
pub mod room_service;
pub mod summary_service;
pub mod websocket_service;
