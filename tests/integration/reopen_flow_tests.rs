//! Reopen path: a requester un-approves a task in `pending_approval`,
//! freeing the helper slots and returning it to the open pool.

use std::sync::Arc;

use nearhand::config::GlobalConfig;
use nearhand::geo::Point;
use nearhand::http::AppState;
use nearhand::models::application::ApplicationStatus;
use nearhand::models::task::{Task, TaskCategory, TaskDraft, TaskStatus, Urgency};
use nearhand::models::user::{RolePreference, UserAccount};
use nearhand::persistence::db;
use nearhand::AppError;

async fn state() -> AppState {
    let database = Arc::new(db::connect_memory().await.expect("db"));
    AppState::new(Arc::new(GlobalConfig::default()), database)
}

async fn seed_user(state: &AppState, id: &str) -> UserAccount {
    let user = UserAccount {
        id: id.to_owned(),
        username: format!("user-{id}"),
        role_preference: RolePreference::Both,
        is_guest: false,
        phone_verified: true,
        id_verified: false,
        latitude: None,
        longitude: None,
        location_updated_at: None,
        points: 0,
        tasks_helped: 0,
        tasks_requested: 0,
    };
    state.users.create(&user).await.expect("seed user")
}

async fn seed_task(state: &AppState, requester: &UserAccount) -> Task {
    state
        .lifecycle
        .create_task(
            requester,
            TaskDraft {
                title: "Tutor maths for an hour".to_owned(),
                description: "Grade 8 algebra".to_owned(),
                category: TaskCategory::TechHelp,
                urgency: Urgency::Normal,
                location: Point::new(12.9716, 77.5946),
                address: "8 Museum Road".to_owned(),
                city: None,
                scheduled_for: None,
                estimated_duration_minutes: None,
                max_helpers: None,
                hide_sensitive_details: false,
            },
        )
        .await
        .expect("seed task")
}

#[tokio::test]
async fn reopen_clears_slots_and_rejects_the_approved_application() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let helper = seed_user(&state, "helper-1").await;
    let task = seed_task(&state, &requester).await;

    let application = state
        .ledger
        .apply(&task.id, &helper, None, None)
        .await
        .expect("apply");
    let outcome = state
        .ledger
        .approve(&application.id, &requester)
        .await
        .expect("approve");
    assert_eq!(outcome.task.status, TaskStatus::PendingApproval);

    let reopened = state
        .lifecycle
        .transition_status(&task.id, &requester, TaskStatus::Open, None)
        .await
        .expect("reopen");

    assert_eq!(reopened.status, TaskStatus::Open);
    assert!(reopened.assigned_helper.is_none());
    assert!(reopened.additional_helpers.is_empty());

    let mine = state
        .ledger
        .list_mine(&helper.id, None, 10, 0)
        .await
        .expect("list");
    assert_eq!(mine[0].status, ApplicationStatus::Rejected);

    // With the active-pair constraint freed, the helper may apply again.
    state
        .ledger
        .apply(&task.id, &helper, None, None)
        .await
        .expect("re-apply after reopen");
}

#[tokio::test]
async fn reopen_is_requester_only() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let helper = seed_user(&state, "helper-1").await;
    let task = seed_task(&state, &requester).await;

    let application = state
        .ledger
        .apply(&task.id, &helper, None, None)
        .await
        .expect("apply");
    state
        .ledger
        .approve(&application.id, &requester)
        .await
        .expect("approve");

    let result = state
        .lifecycle
        .transition_status(&task.id, &helper, TaskStatus::Open, None)
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn reopen_outside_pending_approval_is_an_invalid_transition() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let task = seed_task(&state, &requester).await;

    let result = state
        .lifecycle
        .transition_status(&task.id, &requester, TaskStatus::Open, None)
        .await;
    assert!(matches!(result, Err(AppError::InvalidTransition { .. })));
}
