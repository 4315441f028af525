//! Unit tests for the channel hub: membership authorization and
//! at-most-once event delivery.

use nearhand::geo::Point;
use nearhand::models::task::{Task, TaskCategory, TaskDraft, TaskStatus, Urgency};
use nearhand::realtime::events::ServerEvent;
use nearhand::realtime::hub::ChannelHub;
use nearhand::AppError;

fn sample_task(requester: &str) -> Task {
    let mut task = Task::new(
        requester.to_owned(),
        TaskDraft {
            title: "Collect prescription".to_owned(),
            description: "Pharmacy pickup".to_owned(),
            category: TaskCategory::Medical,
            urgency: Urgency::Normal,
            location: Point::new(12.9716, 77.5946),
            address: "1 Hospital Road".to_owned(),
            city: None,
            scheduled_for: None,
            estimated_duration_minutes: None,
            max_helpers: Some(2),
            hide_sensitive_details: false,
        },
    );
    task.assigned_helper = Some("helper-1".to_owned());
    task.additional_helpers.push("helper-2".to_owned());
    task
}

#[tokio::test]
async fn requester_and_helpers_may_join_task_channel() {
    let hub = ChannelHub::new();
    let task = sample_task("req-1");

    assert!(hub.subscribe_task(&task, "req-1").await.is_ok());
    assert!(hub.subscribe_task(&task, "helper-1").await.is_ok());
    assert!(hub.subscribe_task(&task, "helper-2").await.is_ok());
}

#[tokio::test]
async fn strangers_are_refused() {
    let hub = ChannelHub::new();
    let task = sample_task("req-1");

    let result = hub.subscribe_task(&task, "stranger").await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn task_broadcast_reaches_all_members() {
    let hub = ChannelHub::new();
    let task = sample_task("req-1");

    let mut requester_rx = hub.subscribe_task(&task, "req-1").await.expect("join");
    let mut helper_rx = hub.subscribe_task(&task, "helper-1").await.expect("join");

    hub.broadcast_status(&task.id, TaskStatus::InProgress).await;

    for rx in [&mut requester_rx, &mut helper_rx] {
        match rx.recv().await.expect("event") {
            ServerEvent::TaskStatusChanged {
                task_id, status, ..
            } => {
                assert_eq!(task_id, task.id);
                assert_eq!(status, TaskStatus::InProgress);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}

#[tokio::test]
async fn personal_channel_is_point_to_point() {
    let hub = ChannelHub::new();
    let mut inbox = hub.subscribe_user("helper-1").await;
    let mut other_inbox = hub.subscribe_user("helper-2").await;

    hub.notify_user(
        "helper-1",
        ServerEvent::Error {
            message: "ping".to_owned(),
        },
    )
    .await;

    match inbox.recv().await.expect("event") {
        ServerEvent::Error { message } => assert_eq!(message, "ping"),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(
        other_inbox.try_recv().is_err(),
        "helper-2 must not see helper-1's event"
    );
}

#[tokio::test]
async fn publishing_with_no_subscribers_is_fire_and_forget() {
    let hub = ChannelHub::new();
    // No panic, no error: the event is simply dropped.
    hub.broadcast_status("task-with-nobody", TaskStatus::Cancelled)
        .await;
    hub.notify_user(
        "user-with-nobody",
        ServerEvent::Error {
            message: "dropped".to_owned(),
        },
    )
    .await;
}

#[tokio::test]
async fn late_subscribers_miss_earlier_events() {
    let hub = ChannelHub::new();
    let task = sample_task("req-1");

    hub.broadcast_status(&task.id, TaskStatus::InProgress).await;

    // At-most-once: events sent before the subscription are gone;
    // clients reconcile by fetching, not by replay.
    let mut rx = hub.subscribe_task(&task, "req-1").await.expect("join");
    assert!(rx.try_recv().is_err());
}
