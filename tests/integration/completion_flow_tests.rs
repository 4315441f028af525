//! End-to-end happy path: create → apply → approve → arrive → start →
//! generate code → verify → completed, with points credited.

use std::sync::Arc;

use nearhand::config::GlobalConfig;
use nearhand::geo::Point;
use nearhand::http::AppState;
use nearhand::models::application::ApplicationStatus;
use nearhand::models::task::{TaskCategory, TaskDraft, TaskStatus, Urgency};
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
        id_verified: true,
        latitude: None,
        longitude: None,
        location_updated_at: None,
        points: 0,
        tasks_helped: 0,
        tasks_requested: 0,
    };
    state.users.create(&user).await.expect("seed user")
}

#[tokio::test]
async fn full_lifecycle_awards_points_on_verified_completion() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let winner = seed_user(&state, "helper-1").await;
    let loser = seed_user(&state, "helper-2").await;

    // Urgent medical task in central Bengaluru: 10 + 5 + 5 points.
    let task = state
        .lifecycle
        .create_task(
            &requester,
            TaskDraft {
                title: "Pick up insulin".to_owned(),
                description: "Pharmacy run, prescription ready".to_owned(),
                category: TaskCategory::Medical,
                urgency: Urgency::Urgent,
                location: Point::new(12.9716, 77.5946),
                address: "7 St Marks Road".to_owned(),
                city: Some("Bengaluru".to_owned()),
                scheduled_for: None,
                estimated_duration_minutes: Some(40),
                max_helpers: None,
                hide_sensitive_details: false,
            },
        )
        .await
        .expect("create");
    assert_eq!(task.points_reward, 20);

    // Helper applies from roughly 2 km away: ETA ≈ 6 minutes at 20 km/h.
    let origin = Point::new(12.9716 + 2.0 / 111.19, 77.5946);
    let application = state
        .ledger
        .apply(&task.id, &winner, None, Some(origin))
        .await
        .expect("apply");
    assert_eq!(application.eta_minutes, Some(6));

    let losing = state
        .ledger
        .apply(&task.id, &loser, None, None)
        .await
        .expect("apply");

    // Approval assigns the primary slot and cascades the rejection.
    let outcome = state
        .ledger
        .approve(&application.id, &requester)
        .await
        .expect("approve");
    assert_eq!(outcome.task.status, TaskStatus::PendingApproval);
    assert_eq!(outcome.task.assigned_helper.as_deref(), Some("helper-1"));

    let losing_after = state
        .ledger
        .list_mine(&loser.id, None, 10, 0)
        .await
        .expect("list")
        .into_iter()
        .find(|a| a.id == losing.id)
        .expect("exists");
    assert_eq!(losing_after.status, ApplicationStatus::Rejected);

    // Helper walks the workflow forward.
    for status in [
        TaskStatus::InProgress,
        TaskStatus::HelperArrived,
        TaskStatus::TaskStarted,
    ] {
        state
            .lifecycle
            .transition_status(&task.id, &winner, status, None)
            .await
            .expect("advance");
    }

    // Requester generates the on-site code; the task moves to
    // pending_verification.
    let (pending, record) = state
        .lifecycle
        .generate_completion_otp(&task.id, &requester)
        .await
        .expect("generate");
    assert_eq!(pending.status, TaskStatus::PendingVerification);
    assert_eq!(record.code.len(), 6);

    // A wrong guess burns an attempt without completing anything.
    let wrong = state
        .lifecycle
        .verify_completion(&task.id, &winner, "000000")
        .await;
    assert!(matches!(wrong, Err(AppError::OtpMismatch { .. })));

    // The correct code completes the task and credits the helper.
    let (completed, points) = state
        .lifecycle
        .verify_completion(&task.id, &winner, &record.code)
        .await
        .expect("verify");
    assert_eq!(completed.status, TaskStatus::Completed);
    assert_eq!(points, 20);
    assert!(completed.completed_at.is_some());
    assert!(completed.completion_otp.is_none());
    assert!(completed.otp_generated_at.is_none());

    let credited = state.users.require("helper-1").await.expect("user");
    assert_eq!(credited.points, 20);
    assert_eq!(credited.tasks_helped, 1);

    // Terminal (except the dispute escape hatch): no further workflow.
    let stuck = state
        .lifecycle
        .transition_status(&task.id, &winner, TaskStatus::InProgress, None)
        .await;
    assert!(matches!(stuck, Err(AppError::InvalidTransition { .. })));
}

#[tokio::test]
async fn verification_rejects_non_helpers_and_wrong_states() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let helper = seed_user(&state, "helper-1").await;
    let stranger = seed_user(&state, "stranger").await;

    let task = state
        .lifecycle
        .create_task(
            &requester,
            TaskDraft {
                title: "Assemble shelf".to_owned(),
                description: "Flat-pack, tools provided".to_owned(),
                category: TaskCategory::HomeHelp,
                urgency: Urgency::Normal,
                location: Point::new(12.9716, 77.5946),
                address: "3 Church Street".to_owned(),
                city: None,
                scheduled_for: None,
                estimated_duration_minutes: None,
                max_helpers: None,
                hide_sensitive_details: false,
            },
        )
        .await
        .expect("create");

    // No code before the task even has a helper.
    let early = state
        .lifecycle
        .verify_completion(&task.id, &helper, "123456")
        .await;
    assert!(matches!(early, Err(AppError::Forbidden(_))));

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
    for status in [
        TaskStatus::InProgress,
        TaskStatus::HelperArrived,
        TaskStatus::TaskStarted,
    ] {
        state
            .lifecycle
            .transition_status(&task.id, &helper, status, None)
            .await
            .expect("advance");
    }

    // task_started but no code generated yet.
    let too_soon = state
        .lifecycle
        .verify_completion(&task.id, &helper, "123456")
        .await;
    assert!(matches!(too_soon, Err(AppError::InvalidState(_))));

    let (_, record) = state
        .lifecycle
        .generate_completion_otp(&task.id, &requester)
        .await
        .expect("generate");

    // Only a helper may verify — not the requester, not a stranger.
    let requester_try = state
        .lifecycle
        .verify_completion(&task.id, &requester, &record.code)
        .await;
    assert!(matches!(requester_try, Err(AppError::Forbidden(_))));

    let stranger_try = state
        .lifecycle
        .verify_completion(&task.id, &stranger, &record.code)
        .await;
    assert!(matches!(stranger_try, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn regenerated_code_supersedes_the_first() {
    let state = state().await;
    let requester = seed_user(&state, "req-1").await;
    let helper = seed_user(&state, "helper-1").await;

    let task = state
        .lifecycle
        .create_task(
            &requester,
            TaskDraft {
                title: "Water plants".to_owned(),
                description: "Balcony garden".to_owned(),
                category: TaskCategory::Other,
                urgency: Urgency::Normal,
                location: Point::new(12.9716, 77.5946),
                address: "5 Lavelle Road".to_owned(),
                city: None,
                scheduled_for: None,
                estimated_duration_minutes: None,
                max_helpers: None,
                hide_sensitive_details: false,
            },
        )
        .await
        .expect("create");
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
    for status in [
        TaskStatus::InProgress,
        TaskStatus::HelperArrived,
        TaskStatus::TaskStarted,
    ] {
        state
            .lifecycle
            .transition_status(&task.id, &helper, status, None)
            .await
            .expect("advance");
    }

    let (_, first) = state
        .lifecycle
        .generate_completion_otp(&task.id, &requester)
        .await
        .expect("generate");

    // A fresh code supersedes the first; the stale one no longer works.
    let (_, second) = state
        .lifecycle
        .generate_completion_otp(&task.id, &requester)
        .await
        .expect("regenerate");
    assert_ne!(first.id, second.id);

    let (completed, _) = state
        .lifecycle
        .verify_completion(&task.id, &helper, &second.code)
        .await
        .expect("verify");
    assert_eq!(completed.status, TaskStatus::Completed);
}
