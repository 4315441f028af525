//! Task endpoints: creation, reads, discovery, workflow transitions,
//! and OTP-verified completion.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::geo::Point;
use crate::lifecycle::TaskUpdate;
use crate::matching::DiscoverFilters;
use crate::models::task::{Task, TaskCategory, TaskDraft, TaskStatus, Urgency};
use crate::{AppError, Result};

use super::auth::AuthedUser;
use super::AppState;

/// Default discovery radius when the query omits one, kilometres.
const DEFAULT_DISCOVER_RADIUS_KM: f64 = 10.0;

fn page_window(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(10).clamp(1, 100);
    let page = page.unwrap_or(1).max(1);
    (limit, (page - 1) * limit)
}

/// Hide the street address from non-owners when the task asks for it.
fn redact_for(mut task: Task, viewer_id: &str) -> Task {
    if task.hide_sensitive_details && !task.is_requester(viewer_id) {
        task.address = "Address hidden for privacy".to_owned();
    }
    task
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct CreateTaskBody {
    title: Option<String>,
    description: Option<String>,
    category: Option<TaskCategory>,
    urgency: Option<Urgency>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    address: Option<String>,
    city: Option<String>,
    scheduled_for: Option<DateTime<Utc>>,
    estimated_duration_minutes: Option<u32>,
    max_helpers: Option<u32>,
    hide_sensitive_details: Option<bool>,
}

/// Handler for `POST /tasks`.
pub(crate) async fn create_task(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Json(body): Json<CreateTaskBody>,
) -> Result<Json<serde_json::Value>> {
    let (Some(title), Some(description), Some(category)) =
        (body.title, body.description, body.category)
    else {
        return Err(AppError::Validation(
            "title, description, and category are required".into(),
        ));
    };
    let (Some(latitude), Some(longitude)) = (body.latitude, body.longitude) else {
        return Err(AppError::Validation(
            "location coordinates are required".into(),
        ));
    };
    let Some(address) = body.address else {
        return Err(AppError::Validation("address is required".into()));
    };

    let draft = TaskDraft {
        title,
        description,
        category,
        urgency: body.urgency.unwrap_or(Urgency::Normal),
        location: Point::new(latitude, longitude),
        address,
        city: body.city,
        scheduled_for: body.scheduled_for,
        estimated_duration_minutes: body.estimated_duration_minutes,
        max_helpers: body.max_helpers,
        hide_sensitive_details: body.hide_sensitive_details.unwrap_or(false),
    };

    let task = state.lifecycle.create_task(&user, draft).await?;
    Ok(Json(json!({
        "message": "Task created successfully",
        "task": task,
    })))
}

/// Handler for `GET /tasks/{id}`.
pub(crate) async fn get_task(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let task = state.tasks.require(&id).await?;
    let task = redact_for(task, &user.id);
    Ok(Json(json!({ "task": task })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    status: Option<TaskStatus>,
    page: Option<i64>,
    limit: Option<i64>,
}

/// Handler for `GET /tasks/my-tasks`.
pub(crate) async fn my_tasks(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>> {
    let (limit, offset) = page_window(query.page, query.limit);
    let tasks = state
        .tasks
        .list_by_requester(&user.id, query.status, limit, offset)
        .await?;
    Ok(Json(json!({ "tasks": tasks })))
}

/// Handler for `GET /tasks/helping`.
pub(crate) async fn helping_tasks(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>> {
    let (limit, offset) = page_window(query.page, query.limit);
    let tasks = state
        .tasks
        .list_helping(&user.id, query.status, limit, offset)
        .await?;
    Ok(Json(json!({ "tasks": tasks })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DiscoverQuery {
    latitude: Option<f64>,
    longitude: Option<f64>,
    radius: Option<f64>,
    category: Option<TaskCategory>,
    urgency: Option<Urgency>,
}

/// Handler for `GET /tasks/discover`.
pub(crate) async fn discover(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Query(query): Query<DiscoverQuery>,
) -> Result<Json<serde_json::Value>> {
    let (Some(latitude), Some(longitude)) = (query.latitude, query.longitude) else {
        return Err(AppError::Validation(
            "location coordinates are required".into(),
        ));
    };
    let radius_km = query.radius.unwrap_or(DEFAULT_DISCOVER_RADIUS_KM);

    let filters = DiscoverFilters {
        category: query.category,
        urgency: query.urgency,
    };
    let tasks = state
        .matching
        .discover(Point::new(latitude, longitude), radius_km, filters, &user.id)
        .await?;

    Ok(Json(json!({
        "tasks": tasks,
        "filters": {
            "latitude": latitude,
            "longitude": longitude,
            "radius": radius_km,
        },
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct UpdateTaskBody {
    title: Option<String>,
    description: Option<String>,
    category: Option<TaskCategory>,
    urgency: Option<Urgency>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    address: Option<String>,
    city: Option<String>,
    scheduled_for: Option<DateTime<Utc>>,
    estimated_duration_minutes: Option<u32>,
    max_helpers: Option<u32>,
    hide_sensitive_details: Option<bool>,
}

/// Handler for `PUT /tasks/{id}`.
pub(crate) async fn update_task(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateTaskBody>,
) -> Result<Json<serde_json::Value>> {
    let location = match (body.latitude, body.longitude) {
        (Some(latitude), Some(longitude)) => Some(Point::new(latitude, longitude)),
        (None, None) => None,
        _ => {
            return Err(AppError::Validation(
                "latitude and longitude must be updated together".into(),
            ))
        }
    };

    let update = TaskUpdate {
        title: body.title,
        description: body.description,
        category: body.category,
        urgency: body.urgency,
        location,
        address: body.address,
        city: body.city,
        scheduled_for: body.scheduled_for,
        estimated_duration_minutes: body.estimated_duration_minutes,
        max_helpers: body.max_helpers,
        hide_sensitive_details: body.hide_sensitive_details,
    };

    let task = state.lifecycle.update_task(&id, &user, update).await?;
    Ok(Json(json!({
        "message": "Task updated successfully",
        "task": task,
    })))
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct ReasonBody {
    reason: Option<String>,
}

/// Handler for `POST /tasks/{id}/cancel`.
pub(crate) async fn cancel_task(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<String>,
    body: Option<Json<ReasonBody>>,
) -> Result<Json<serde_json::Value>> {
    let reason = body.and_then(|Json(b)| b.reason);
    let task = state.lifecycle.cancel_task(&id, &user, reason).await?;
    Ok(Json(json!({
        "message": "Task cancelled successfully",
        "task": task,
    })))
}

/// Handler for `POST /tasks/{id}/dispute`.
pub(crate) async fn dispute_task(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<String>,
    body: Option<Json<ReasonBody>>,
) -> Result<Json<serde_json::Value>> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .ok_or_else(|| AppError::Validation("dispute reason is required".into()))?;
    let task = state.lifecycle.dispute_task(&id, &user, reason).await?;
    Ok(Json(json!({
        "message": "Dispute reported successfully. Our team will review it.",
        "task": task,
    })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusBody {
    status: TaskStatus,
    reason: Option<String>,
}

/// Handler for `PATCH /tasks/{id}/status`.
pub(crate) async fn update_status(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Result<Json<serde_json::Value>> {
    let task = state
        .lifecycle
        .transition_status(&id, &user, body.status, body.reason)
        .await?;
    Ok(Json(json!({
        "message": format!("Task status updated to {}", task.status.as_str()),
        "task": task,
    })))
}

/// Handler for `POST /tasks/{id}/generate-otp`.
pub(crate) async fn generate_otp(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let (task, record) = state.lifecycle.generate_completion_otp(&id, &user).await?;
    Ok(Json(json!({
        "message": "Completion code generated",
        "otp": record.code,
        "expires_at": record.expires_at,
        "instruction": "Share this code with the helper to verify task completion",
        "task": task,
    })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyBody {
    otp: Option<String>,
}

/// Handler for `POST /tasks/{id}/verify-completion`.
pub(crate) async fn verify_completion(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<String>,
    Json(body): Json<VerifyBody>,
) -> Result<Json<serde_json::Value>> {
    let otp = body
        .otp
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::Validation("otp is required".into()))?;

    let (task, points) = state.lifecycle.verify_completion(&id, &user, &otp).await?;
    Ok(Json(json!({
        "message": "Task completed successfully!",
        "points_earned": points,
        "task": task,
    })))
}

/// Handler for `GET /tasks/{id}/messages` — chat history for
/// reconciliation after missed broadcasts. Collaborators only.
pub(crate) async fn list_messages(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let task = state.tasks.require(&id).await?;
    if !task.is_requester(&user.id) && !task.is_any_helper(&user.id) {
        return Err(AppError::Forbidden("access denied to this chat".into()));
    }

    let messages = state.messages.list_for_task(&id).await?;
    Ok(Json(json!({ "messages": messages })))
}
