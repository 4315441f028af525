//! HTTP API: shared application state, router, and handlers.

use std::sync::Arc;

use axum::routing::{get, patch, post, put};
use axum::Router;

use crate::config::GlobalConfig;
use crate::ledger::ApplicationLedger;
use crate::lifecycle::TaskLifecycle;
use crate::matching::MatchingEngine;
use crate::notify::Notifier;
use crate::otp::OtpGuard;
use crate::persistence::db::Database;
use crate::persistence::message_repo::MessageRepo;
use crate::persistence::task_repo::TaskRepo;
use crate::persistence::user_repo::UserRepo;
use crate::realtime::hub::ChannelHub;
use crate::realtime::ws;

pub mod auth;
pub mod help_requests;
pub mod tasks;

/// Shared application state handed to every handler.
///
/// Constructed once at startup; the hub in particular has no global
/// fallback — everything reaches it through this struct.
#[derive(Clone)]
pub struct AppState {
    /// Parsed configuration.
    pub config: Arc<GlobalConfig>,
    /// Shared connection pool.
    pub db: Arc<Database>,
    /// Realtime channel hub.
    pub hub: Arc<ChannelHub>,
    /// Task lifecycle service.
    pub lifecycle: TaskLifecycle,
    /// Application ledger service.
    pub ledger: ApplicationLedger,
    /// Matching engine.
    pub matching: MatchingEngine,
    /// Notification sink.
    pub notifier: Notifier,
    /// User directory access.
    pub users: UserRepo,
    /// Task reads for handlers that bypass the services.
    pub tasks: TaskRepo,
    /// Chat message history access.
    pub messages: MessageRepo,
}

impl AppState {
    /// Wire up every service over the shared pool and a fresh hub.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, db: Arc<Database>) -> Self {
        let hub = Arc::new(ChannelHub::new());
        let notifier = Notifier::new(Arc::clone(&db), Arc::clone(&hub));
        let otp = OtpGuard::new(Arc::clone(&db), config.otp.clone());

        let lifecycle = TaskLifecycle::new(
            Arc::clone(&db),
            otp,
            notifier.clone(),
            Arc::clone(&hub),
        );
        let ledger = ApplicationLedger::new(
            Arc::clone(&db),
            notifier.clone(),
            Arc::clone(&hub),
            config.matching.average_speed_kmh,
        );
        let matching = MatchingEngine::new(
            Arc::clone(&db),
            notifier.clone(),
            config.matching.clone(),
        );

        Self {
            users: UserRepo::new(Arc::clone(&db)),
            tasks: TaskRepo::new(Arc::clone(&db)),
            messages: MessageRepo::new(Arc::clone(&db)),
            config,
            db,
            hub,
            lifecycle,
            ledger,
            matching,
            notifier,
        }
    }
}

/// Handler for `GET /health` — returns 200 OK with a plain-text body.
async fn health() -> &'static str {
    "ok"
}

/// Build the full API router over `state`.
#[must_use]
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks", post(tasks::create_task))
        .route("/tasks/my-tasks", get(tasks::my_tasks))
        .route("/tasks/helping", get(tasks::helping_tasks))
        .route("/tasks/discover", get(tasks::discover))
        .route("/tasks/{id}", get(tasks::get_task).put(tasks::update_task))
        .route("/tasks/{id}/cancel", post(tasks::cancel_task))
        .route("/tasks/{id}/dispute", post(tasks::dispute_task))
        .route("/tasks/{id}/status", patch(tasks::update_status))
        .route("/tasks/{id}/generate-otp", post(tasks::generate_otp))
        .route(
            "/tasks/{id}/verify-completion",
            post(tasks::verify_completion),
        )
        .route("/tasks/{id}/messages", get(tasks::list_messages))
        .route("/help-requests/apply/{task_id}", post(help_requests::apply))
        .route(
            "/help-requests/my-applications",
            get(help_requests::my_applications),
        )
        .route(
            "/help-requests/task/{task_id}",
            get(help_requests::for_task),
        )
        .route("/help-requests/{id}/approve", post(help_requests::approve))
        .route("/help-requests/{id}/reject", post(help_requests::reject))
        .route("/help-requests/{id}/cancel", post(help_requests::cancel))
        .route(
            "/help-requests/{id}/location",
            put(help_requests::update_location),
        )
        .route("/notifications", get(notifications))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// Handler for `GET /notifications` — the caller's stored notifications,
/// newest first. The reconciliation source for missed realtime pushes.
async fn notifications(
    axum::extract::State(state): axum::extract::State<AppState>,
    auth::AuthedUser(user): auth::AuthedUser,
) -> crate::Result<axum::Json<serde_json::Value>> {
    let notifications = state.notifier.repo().list_for_user(&user.id, 100).await?;
    let total = notifications.len();
    Ok(axum::Json(serde_json::json!({
        "notifications": notifications,
        "total": total,
    })))
}
