//! Unit tests for chat message persistence, read receipts, and purge.

use std::sync::Arc;

use chrono::{Duration, Utc};
use nearhand::models::message::ChatMessage;
use nearhand::persistence::db;
use nearhand::persistence::message_repo::MessageRepo;

async fn repo() -> MessageRepo {
    let database = Arc::new(db::connect_memory().await.expect("db"));
    MessageRepo::new(database)
}

fn sample(task: &str, sender: &str, receiver: &str, content: &str) -> ChatMessage {
    ChatMessage::new(
        task.to_owned(),
        sender.to_owned(),
        receiver.to_owned(),
        content.to_owned(),
        30,
    )
}

#[tokio::test]
async fn create_and_list_in_chronological_order() {
    let repo = repo().await;
    let first = sample("task-1", "req-1", "helper-1", "On your way?");
    let mut second = sample("task-1", "helper-1", "req-1", "Five minutes out");
    second.created_at = first.created_at + Duration::seconds(10);

    repo.create(&first).await.expect("create");
    repo.create(&second).await.expect("create");

    let listed = repo.list_for_task("task-1").await.expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].content, "On your way?");
    assert_eq!(listed[1].content, "Five minutes out");
    assert!(!listed[0].read);
}

#[tokio::test]
async fn mark_read_touches_only_the_receivers_unread() {
    let repo = repo().await;
    repo.create(&sample("task-1", "req-1", "helper-1", "a"))
        .await
        .expect("create");
    repo.create(&sample("task-1", "req-1", "helper-1", "b"))
        .await
        .expect("create");
    repo.create(&sample("task-1", "helper-1", "req-1", "c"))
        .await
        .expect("create");

    let marked = repo.mark_read("task-1", "helper-1").await.expect("mark");
    assert_eq!(marked, 2);

    let listed = repo.list_for_task("task-1").await.expect("list");
    let read_count = listed.iter().filter(|m| m.read).count();
    assert_eq!(read_count, 2);
    assert!(listed
        .iter()
        .filter(|m| m.read)
        .all(|m| m.read_at.is_some()));

    // Idempotent: nothing left to mark.
    let again = repo.mark_read("task-1", "helper-1").await.expect("mark");
    assert_eq!(again, 0);
}

#[tokio::test]
async fn purge_removes_expired_messages_only() {
    let repo = repo().await;
    let mut expired = sample("task-1", "req-1", "helper-1", "old");
    expired.expires_at = Utc::now() - Duration::days(1);
    repo.create(&expired).await.expect("create");
    repo.create(&sample("task-1", "req-1", "helper-1", "new"))
        .await
        .expect("create");

    let purged = repo.purge_expired(Utc::now()).await.expect("purge");
    assert_eq!(purged, 1);

    let remaining = repo.list_for_task("task-1").await.expect("list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].content, "new");
}
