//! Unit tests for `ApplicationRepo`, including the storage-level
//! uniqueness constraint on active applications.

use std::sync::Arc;

use nearhand::models::application::{Application, ApplicationStatus};
use nearhand::persistence::application_repo::ApplicationRepo;
use nearhand::persistence::db;
use nearhand::AppError;

async fn repo() -> ApplicationRepo {
    let database = Arc::new(db::connect_memory().await.expect("db"));
    ApplicationRepo::new(database)
}

fn sample(task: &str, helper: &str) -> Application {
    Application::new(task.to_owned(), helper.to_owned(), None)
}

#[tokio::test]
async fn create_persists_defaults() {
    let repo = repo().await;
    let application = sample("task-1", "helper-1");
    let id = application.id.clone();

    repo.create(&application).await.expect("create");
    let fetched = repo.get_by_id(&id).await.expect("query").expect("exists");

    assert_eq!(fetched.status, ApplicationStatus::Pending);
    assert_eq!(fetched.message, "I would like to help with this task");
    assert!(fetched.responded_at.is_none());
    assert!(fetched.distance_km.is_none());
}

#[tokio::test]
async fn duplicate_active_application_is_a_conflict() {
    let repo = repo().await;
    repo.create(&sample("task-1", "helper-1"))
        .await
        .expect("first");

    let result = repo.create(&sample("task-1", "helper-1")).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn terminal_application_frees_the_pair() {
    let repo = repo().await;
    let first = sample("task-1", "helper-1");
    repo.create(&first).await.expect("first");
    repo.decide_pending_guarded(&first.id, ApplicationStatus::Cancelled, None)
        .await
        .expect("cancel");

    // The partial index only covers active statuses, so a fresh
    // application for the same pair is allowed.
    repo.create(&sample("task-1", "helper-1"))
        .await
        .expect("second apply after withdrawal");
}

#[tokio::test]
async fn decide_pending_guarded_sets_responded_at() {
    let repo = repo().await;
    let application = sample("task-1", "helper-1");
    repo.create(&application).await.expect("create");

    let decided = repo
        .decide_pending_guarded(&application.id, ApplicationStatus::Rejected, Some("too far"))
        .await
        .expect("decide");
    assert!(decided);

    let fetched = repo.require(&application.id).await.expect("fetch");
    assert_eq!(fetched.status, ApplicationStatus::Rejected);
    assert_eq!(fetched.rejection_reason.as_deref(), Some("too far"));
    assert!(fetched.responded_at.is_some());

    // Already decided: the guard refuses a second decision.
    let again = repo
        .decide_pending_guarded(&application.id, ApplicationStatus::Approved, None)
        .await
        .expect("decide");
    assert!(!again);
}

#[tokio::test]
async fn reject_other_pending_spares_the_kept_application() {
    let repo = repo().await;
    let keep = sample("task-1", "helper-1");
    let other_a = sample("task-1", "helper-2");
    let other_b = sample("task-1", "helper-3");
    repo.create(&keep).await.expect("create");
    repo.create(&other_a).await.expect("create");
    repo.create(&other_b).await.expect("create");

    let rejected = repo
        .reject_other_pending("task-1", &keep.id)
        .await
        .expect("cascade");
    assert_eq!(rejected.len(), 2);

    let kept = repo.require(&keep.id).await.expect("fetch");
    assert_eq!(kept.status, ApplicationStatus::Pending);

    for rejected_app in rejected {
        assert_eq!(rejected_app.status, ApplicationStatus::Rejected);
        assert!(rejected_app.responded_at.is_some());
    }
}

#[tokio::test]
async fn reject_all_pending_covers_the_cancellation_cascade() {
    let repo = repo().await;
    repo.create(&sample("task-1", "helper-1")).await.expect("a");
    repo.create(&sample("task-1", "helper-2")).await.expect("b");
    // An application on another task is untouched.
    repo.create(&sample("task-2", "helper-3")).await.expect("c");

    let rejected = repo.reject_all_pending("task-1").await.expect("cascade");
    assert_eq!(rejected.len(), 2);

    let untouched = repo.list_for_task("task-2").await.expect("list");
    assert_eq!(untouched[0].status, ApplicationStatus::Pending);
}

#[tokio::test]
async fn list_for_helper_filters_by_status() {
    let repo = repo().await;
    let pending = sample("task-1", "helper-1");
    let decided = sample("task-2", "helper-1");
    repo.create(&pending).await.expect("create");
    repo.create(&decided).await.expect("create");
    repo.decide_pending_guarded(&decided.id, ApplicationStatus::Rejected, None)
        .await
        .expect("decide");

    let all = repo
        .list_for_helper("helper-1", None, 10, 0)
        .await
        .expect("list");
    assert_eq!(all.len(), 2);

    let rejected = repo
        .list_for_helper("helper-1", Some(ApplicationStatus::Rejected), 10, 0)
        .await
        .expect("list");
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].id, decided.id);
}

#[tokio::test]
async fn update_location_persists_recomputed_fields() {
    let repo = repo().await;
    let application = sample("task-1", "helper-1");
    repo.create(&application).await.expect("create");

    repo.update_location(&application.id, 12.99, 77.60, 2.4, 7)
        .await
        .expect("update");

    let fetched = repo.require(&application.id).await.expect("fetch");
    assert_eq!(fetched.helper_latitude, Some(12.99));
    assert_eq!(fetched.helper_longitude, Some(77.60));
    assert_eq!(fetched.eta_minutes, Some(7));
    assert!((fetched.distance_km.unwrap() - 2.4).abs() < 1e-9);
}
