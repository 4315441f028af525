//! Error types shared across the application.

use std::fmt::{Display, Formatter};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::models::task::TaskStatus;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Request payload missing required fields or malformed.
    Validation(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Caller is authenticated but not authorized for this entity/action.
    Forbidden(String),
    /// Operation is not valid for the entity's current lifecycle state.
    InvalidState(String),
    /// Requested task status transition is not in the transition table.
    InvalidTransition {
        /// Status the task is currently in.
        current: TaskStatus,
        /// Status the caller asked for.
        requested: TaskStatus,
        /// Transitions permitted from `current`.
        allowed: Vec<TaskStatus>,
    },
    /// Uniqueness violation, e.g. a duplicate application.
    Conflict(String),
    /// OTP record has passed its expiry time.
    Expired(String),
    /// OTP record was already consumed by a successful verification.
    AlreadyUsed(String),
    /// OTP verification attempts are exhausted.
    AttemptsExceeded(String),
    /// Candidate OTP code did not match.
    OtpMismatch {
        /// Verification attempts left before the record locks.
        attempts_remaining: u32,
    },
    /// Downstream dependency failure or timeout.
    Unavailable(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::InvalidTransition {
                current,
                requested,
                allowed,
            } => {
                let allowed: Vec<&str> = allowed.iter().map(TaskStatus::as_str).collect();
                write!(
                    f,
                    "invalid transition: cannot move from {} to {} (allowed: {})",
                    current.as_str(),
                    requested.as_str(),
                    allowed.join(", ")
                )
            }
            Self::Conflict(msg) => write!(f, "conflict: {msg}"),
            Self::Expired(msg) => write!(f, "expired: {msg}"),
            Self::AlreadyUsed(msg) => write!(f, "already used: {msg}"),
            Self::AttemptsExceeded(msg) => write!(f, "attempts exceeded: {msg}"),
            Self::OtpMismatch { attempts_remaining } => {
                write!(f, "invalid code: {attempts_remaining} attempt(s) remaining")
            }
            Self::Unavailable(msg) => write!(f, "unavailable: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db_err)
                if db_err.kind() == sqlx::error::ErrorKind::UniqueViolation =>
            {
                Self::Conflict("record already exists".into())
            }
            sqlx::Error::PoolTimedOut => {
                Self::Unavailable("storage did not respond in time".into())
            }
            other => Self::Db(other.to_string()),
        }
    }
}

impl AppError {
    /// HTTP status code this error maps to.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_)
            | Self::InvalidState(_)
            | Self::InvalidTransition { .. }
            | Self::Expired(_)
            | Self::AlreadyUsed(_)
            | Self::AttemptsExceeded(_)
            | Self::OtpMismatch { .. } => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) | Self::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::InvalidTransition {
                current, allowed, ..
            } => {
                let allowed: Vec<&str> = allowed.iter().map(TaskStatus::as_str).collect();
                json!({
                    "message": self.to_string(),
                    "current_status": current.as_str(),
                    "valid_transitions": allowed,
                })
            }
            Self::OtpMismatch { attempts_remaining } => json!({
                "message": self.to_string(),
                "attempts_remaining": attempts_remaining,
            }),
            _ => json!({ "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
