//! Data-transfer objects: wire protocol messages and REST payloads.

use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod health;
pub mod room;
pub mod summary;
pub mod validation;
pub mod ws;

/// Render a [`SystemTime`] as an RFC3339 timestamp for API responses.
pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
