//! Unit tests for the application ledger: apply, approve with its
//! cascade, reject, withdraw, and location updates.

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

async fn seed_guest(state: &AppState, id: &str) -> UserAccount {
    let user = UserAccount {
        id: id.to_owned(),
        username: format!("guest-{id}"),
        role_preference: RolePreference::Both,
        is_guest: true,
        phone_verified: false,
        id_verified: false,
        latitude: None,
        longitude: None,
        location_updated_at: None,
        points: 0,
        tasks_helped: 0,
        tasks_requested: 0,
    };
    state.users.create(&user).await.expect("seed guest")
}

fn draft() -> TaskDraft {
    TaskDraft {
        title: "Carry boxes upstairs".to_owned(),
        description: "Three boxes, second floor".to_owned(),
        category: TaskCategory::HomeHelp,
        urgency: Urgency::Normal,
        location: Point::new(12.9716, 77.5946),
        address: "9 Brigade Road".to_owned(),
        city: None,
        scheduled_for: None,
        estimated_duration_minutes: None,
        max_helpers: None,
        hide_sensitive_details: false,
    }
}

async fn seed_task(state: &AppState, requester: &UserAccount) -> Task {
    state
        .lifecycle
        .create_task(requester, draft())
        .await
        .expect("seed task")
}

#[tokio::test]
async fn apply_records_distance_and_eta() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let helper = seed_user(&state, "helper-1").await;
    let task = seed_task(&state, &requester).await;

    // Roughly 2 km north of the task.
    let origin = Point::new(12.9716 + 2.0 / 111.19, 77.5946);
    let application = state
        .ledger
        .apply(&task.id, &helper, Some("On my way".to_owned()), Some(origin))
        .await
        .expect("apply");

    assert_eq!(application.status, ApplicationStatus::Pending);
    assert_eq!(application.message, "On my way");
    let distance = application.distance_km.expect("distance");
    assert!((distance - 2.0).abs() < 0.05, "got {distance}");
    assert_eq!(application.eta_minutes, Some(6));

    let fetched = state.tasks.require(&task.id).await.expect("task");
    assert_eq!(fetched.application_count, 1);
}

#[tokio::test]
async fn apply_to_missing_task_is_not_found() {
    let state = state().await;
    let helper = seed_user(&state, "helper-1").await;
    let result = state.ledger.apply("missing", &helper, None, None).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn self_apply_is_forbidden() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let task = seed_task(&state, &requester).await;

    let result = state.ledger.apply(&task.id, &requester, None, None).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn guests_cannot_apply() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let guest = seed_guest(&state, "guest-1").await;
    let task = seed_task(&state, &requester).await;

    let result = state.ledger.apply(&task.id, &guest, None, None).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn apply_to_non_open_task_is_invalid_state() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let helper = seed_user(&state, "helper-1").await;
    let task = seed_task(&state, &requester).await;
    state
        .lifecycle
        .cancel_task(&task.id, &requester, None)
        .await
        .expect("cancel");

    let result = state.ledger.apply(&task.id, &helper, None, None).await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn duplicate_apply_is_a_conflict() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let helper = seed_user(&state, "helper-1").await;
    let task = seed_task(&state, &requester).await;

    state
        .ledger
        .apply(&task.id, &helper, None, None)
        .await
        .expect("first");
    let result = state.ledger.apply(&task.id, &helper, None, None).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn approve_assigns_primary_and_cascades_rejections() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let winner = seed_user(&state, "helper-1").await;
    let loser_a = seed_user(&state, "helper-2").await;
    let loser_b = seed_user(&state, "helper-3").await;
    let task = seed_task(&state, &requester).await;

    let winning = state
        .ledger
        .apply(&task.id, &winner, None, None)
        .await
        .expect("apply");
    state
        .ledger
        .apply(&task.id, &loser_a, None, None)
        .await
        .expect("apply");
    state
        .ledger
        .apply(&task.id, &loser_b, None, None)
        .await
        .expect("apply");

    let outcome = state
        .ledger
        .approve(&winning.id, &requester)
        .await
        .expect("approve");

    assert_eq!(outcome.application.status, ApplicationStatus::Approved);
    assert!(outcome.application.responded_at.is_some());
    assert_eq!(outcome.task.status, TaskStatus::PendingApproval);
    assert_eq!(outcome.task.assigned_helper.as_deref(), Some("helper-1"));
    assert_eq!(outcome.rejected.len(), 2);

    let applications = state
        .ledger
        .list_for_task(&task.id, &requester)
        .await
        .expect("list");
    let approved = applications
        .iter()
        .filter(|a| a.status == ApplicationStatus::Approved)
        .count();
    let rejected = applications
        .iter()
        .filter(|a| a.status == ApplicationStatus::Rejected)
        .count();
    assert_eq!((approved, rejected), (1, 2));
}

#[tokio::test]
async fn approve_requires_the_requester() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let helper = seed_user(&state, "helper-1").await;
    let intruder = seed_user(&state, "intruder").await;
    let task = seed_task(&state, &requester).await;

    let application = state
        .ledger
        .apply(&task.id, &helper, None, None)
        .await
        .expect("apply");

    let result = state.ledger.approve(&application.id, &intruder).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn approve_refuses_once_slots_are_full() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let first = seed_user(&state, "helper-1").await;
    let second = seed_user(&state, "helper-2").await;
    let task = seed_task(&state, &requester).await;

    let winning = state
        .ledger
        .apply(&task.id, &first, None, None)
        .await
        .expect("apply");
    let losing = state
        .ledger
        .apply(&task.id, &second, None, None)
        .await
        .expect("apply");

    state
        .ledger
        .approve(&winning.id, &requester)
        .await
        .expect("approve");

    // The cascade already rejected it, so the second approval fails the
    // pending check — slots are full either way.
    let result = state.ledger.approve(&losing.id, &requester).await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn reject_is_requester_only_and_pending_only() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let helper = seed_user(&state, "helper-1").await;
    let task = seed_task(&state, &requester).await;

    let application = state
        .ledger
        .apply(&task.id, &helper, None, None)
        .await
        .expect("apply");

    let result = state
        .ledger
        .reject(&application.id, &helper, Some("nope".to_owned()))
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let rejected = state
        .ledger
        .reject(&application.id, &requester, Some("too far".to_owned()))
        .await
        .expect("reject");
    assert_eq!(rejected.status, ApplicationStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("too far"));

    let again = state.ledger.reject(&application.id, &requester, None).await;
    assert!(matches!(again, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn withdraw_decrements_the_counter() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let helper = seed_user(&state, "helper-1").await;
    let task = seed_task(&state, &requester).await;

    let application = state
        .ledger
        .apply(&task.id, &helper, None, None)
        .await
        .expect("apply");
    assert_eq!(
        state
            .tasks
            .require(&task.id)
            .await
            .expect("task")
            .application_count,
        1
    );

    let result = state.ledger.cancel(&application.id, &requester).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let withdrawn = state
        .ledger
        .cancel(&application.id, &helper)
        .await
        .expect("withdraw");
    assert_eq!(withdrawn.status, ApplicationStatus::Cancelled);
    assert_eq!(
        state
            .tasks
            .require(&task.id)
            .await
            .expect("task")
            .application_count,
        0
    );
}

#[tokio::test]
async fn location_update_needs_an_approved_application() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let helper = seed_user(&state, "helper-1").await;
    let task = seed_task(&state, &requester).await;

    let application = state
        .ledger
        .apply(&task.id, &helper, None, None)
        .await
        .expect("apply");

    let result = state
        .ledger
        .update_location(&application.id, &helper, Point::new(12.98, 77.60))
        .await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));

    state
        .ledger
        .approve(&application.id, &requester)
        .await
        .expect("approve");

    let updated = state
        .ledger
        .update_location(&application.id, &helper, Point::new(12.98, 77.60))
        .await
        .expect("update");
    assert!(updated.distance_km.is_some());
    assert!(updated.eta_minutes.is_some());
}

#[tokio::test]
async fn task_application_listing_is_owner_only() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let helper = seed_user(&state, "helper-1").await;
    let task = seed_task(&state, &requester).await;
    state
        .ledger
        .apply(&task.id, &helper, None, None)
        .await
        .expect("apply");

    let result = state.ledger.list_for_task(&task.id, &helper).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let mine = state
        .ledger
        .list_mine(&helper.id, None, 10, 0)
        .await
        .expect("mine");
    assert_eq!(mine.len(), 1);
}
