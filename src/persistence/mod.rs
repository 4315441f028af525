//! Persistence layer modules.

use chrono::{DateTime, Utc};

use crate::{AppError, Result};

pub mod application_repo;
pub mod db;
pub mod message_repo;
pub mod notification_repo;
pub mod otp_repo;
pub mod retention;
pub mod schema;
pub mod task_repo;
pub mod user_repo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

/// Parse an RFC 3339 TEXT column into a UTC timestamp.
pub(crate) fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| AppError::Db(format!("invalid {field}: {err}")))
}

/// Parse an optional RFC 3339 TEXT column.
pub(crate) fn parse_timestamp_opt(
    raw: Option<&str>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_timestamp(s, field)).transpose()
}
