//! Help-request endpoints: apply, list, approve, reject, withdraw,
//! and ETA location updates.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::geo::Point;
use crate::models::application::ApplicationStatus;
use crate::{AppError, Result};

use super::auth::AuthedUser;
use super::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct ApplyBody {
    message: Option<String>,
    current_latitude: Option<f64>,
    current_longitude: Option<f64>,
}

/// Handler for `POST /help-requests/apply/{task_id}`.
pub(crate) async fn apply(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(task_id): Path<String>,
    body: Option<Json<ApplyBody>>,
) -> Result<Json<serde_json::Value>> {
    let body = body.map(|Json(b)| b);
    let (message, location) = match body {
        Some(body) => {
            let location = match (body.current_latitude, body.current_longitude) {
                (Some(latitude), Some(longitude)) => Some(Point::new(latitude, longitude)),
                _ => None,
            };
            (body.message, location)
        }
        None => (None, None),
    };

    let application = state.ledger.apply(&task_id, &user, message, location).await?;
    Ok(Json(json!({
        "message": "Application submitted successfully",
        "help_request": application,
    })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct MyApplicationsQuery {
    status: Option<ApplicationStatus>,
    page: Option<i64>,
    limit: Option<i64>,
}

/// Handler for `GET /help-requests/my-applications`.
pub(crate) async fn my_applications(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Query(query): Query<MyApplicationsQuery>,
) -> Result<Json<serde_json::Value>> {
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let page = query.page.unwrap_or(1).max(1);
    let applications = state
        .ledger
        .list_mine(&user.id, query.status, limit, (page - 1) * limit)
        .await?;
    Ok(Json(json!({ "applications": applications })))
}

/// Handler for `GET /help-requests/task/{task_id}`. Owner-only.
pub(crate) async fn for_task(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let applications = state.ledger.list_for_task(&task_id, &user).await?;
    let total = applications.len();
    Ok(Json(json!({
        "applications": applications,
        "total": total,
    })))
}

/// Handler for `POST /help-requests/{id}/approve`.
pub(crate) async fn approve(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let outcome = state.ledger.approve(&id, &user).await?;
    Ok(Json(json!({
        "message": "Application approved successfully",
        "help_request": outcome.application,
        "task": outcome.task,
        "rejected_count": outcome.rejected.len(),
    })))
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct RejectBody {
    reason: Option<String>,
}

/// Handler for `POST /help-requests/{id}/reject`.
pub(crate) async fn reject(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<String>,
    body: Option<Json<RejectBody>>,
) -> Result<Json<serde_json::Value>> {
    let reason = body.and_then(|Json(b)| b.reason);
    let application = state.ledger.reject(&id, &user, reason).await?;
    Ok(Json(json!({
        "message": "Application rejected",
        "help_request": application,
    })))
}

/// Handler for `POST /help-requests/{id}/cancel`.
pub(crate) async fn cancel(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let application = state.ledger.cancel(&id, &user).await?;
    Ok(Json(json!({
        "message": "Application cancelled successfully",
        "help_request": application,
    })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct LocationBody {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Handler for `PUT /help-requests/{id}/location`.
pub(crate) async fn update_location(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<String>,
    Json(body): Json<LocationBody>,
) -> Result<Json<serde_json::Value>> {
    let (Some(latitude), Some(longitude)) = (body.latitude, body.longitude) else {
        return Err(AppError::Validation(
            "latitude and longitude are required".into(),
        ));
    };

    let application = state
        .ledger
        .update_location(&id, &user, Point::new(latitude, longitude))
        .await?;
    Ok(Json(json!({
        "message": "Location updated successfully",
        "distance_km": application.distance_km,
        "eta_minutes": application.eta_minutes,
        "help_request": application,
    })))
}
