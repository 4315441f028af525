//! Unit tests for the error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use nearhand::models::task::TaskStatus;
use nearhand::AppError;

#[test]
fn display_formats_are_stable() {
    assert_eq!(
        AppError::NotFound("task t-1 not found".into()).to_string(),
        "not found: task t-1 not found"
    );
    assert_eq!(
        AppError::Conflict("record already exists".into()).to_string(),
        "conflict: record already exists"
    );
    assert_eq!(
        AppError::OtpMismatch {
            attempts_remaining: 3
        }
        .to_string(),
        "invalid code: 3 attempt(s) remaining"
    );
}

#[test]
fn invalid_transition_names_current_state_and_allowed_set() {
    let err = AppError::InvalidTransition {
        current: TaskStatus::Open,
        requested: TaskStatus::Completed,
        allowed: TaskStatus::Open.allowed_transitions().to_vec(),
    };
    let rendered = err.to_string();

    assert!(rendered.contains("open"), "{rendered}");
    assert!(rendered.contains("completed"), "{rendered}");
    assert!(rendered.contains("pending_approval"), "{rendered}");
    assert!(rendered.contains("cancelled"), "{rendered}");
}

#[test]
fn status_codes_follow_the_taxonomy() {
    assert_eq!(
        AppError::NotFound(String::new()).status_code(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        AppError::Forbidden(String::new()).status_code(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        AppError::Validation(String::new()).status_code(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        AppError::InvalidState(String::new()).status_code(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        AppError::InvalidTransition {
            current: TaskStatus::Open,
            requested: TaskStatus::Completed,
            allowed: vec![],
        }
        .status_code(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        AppError::Conflict(String::new()).status_code(),
        StatusCode::CONFLICT
    );
    assert_eq!(
        AppError::Expired(String::new()).status_code(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        AppError::AlreadyUsed(String::new()).status_code(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        AppError::AttemptsExceeded(String::new()).status_code(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        AppError::Unavailable(String::new()).status_code(),
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(
        AppError::Db(String::new()).status_code(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}
