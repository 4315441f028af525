//! Pub/sub hub for per-user and per-task channels.
//!
//! One `ChannelHub` is constructed at startup and handed to every
//! handler through application state — there is no ambient global
//! registry to initialize or look up.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::models::task::{Task, TaskStatus};
use crate::{AppError, Result};

use super::events::ServerEvent;

/// Buffered events per channel before slow receivers start lagging.
const CHANNEL_CAPACITY: usize = 64;

/// Per-user and per-task broadcast channels.
///
/// Channels are created lazily on first use and delivery is
/// at-most-once: publishing to a channel nobody subscribes to simply
/// drops the event. Durable state lives in the database, never here.
pub struct ChannelHub {
    users: RwLock<HashMap<String, broadcast::Sender<ServerEvent>>>,
    tasks: RwLock<HashMap<String, broadcast::Sender<ServerEvent>>>,
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
        }
    }

    async fn sender_for(
        map: &RwLock<HashMap<String, broadcast::Sender<ServerEvent>>>,
        key: &str,
    ) -> broadcast::Sender<ServerEvent> {
        if let Some(sender) = map.read().await.get(key) {
            return sender.clone();
        }
        let mut write = map.write().await;
        write
            .entry(key.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Subscribe to a user's personal channel.
    pub async fn subscribe_user(&self, user_id: &str) -> broadcast::Receiver<ServerEvent> {
        Self::sender_for(&self.users, user_id).await.subscribe()
    }

    /// Subscribe to a task's coordination channel.
    ///
    /// Membership is restricted to the task's requester, its assigned
    /// helper, and its additional helpers.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` if `user_id` is not a collaborator
    /// on the task.
    pub async fn subscribe_task(
        &self,
        task: &Task,
        user_id: &str,
    ) -> Result<broadcast::Receiver<ServerEvent>> {
        if !task.is_requester(user_id) && !task.is_any_helper(user_id) {
            return Err(AppError::Forbidden("access denied to this task".into()));
        }
        Ok(Self::sender_for(&self.tasks, &task.id).await.subscribe())
    }

    /// Broadcast an event to a task channel. Fire-and-forget.
    pub async fn publish_task(&self, task_id: &str, event: ServerEvent) {
        let sender = Self::sender_for(&self.tasks, task_id).await;
        let delivered = sender.send(event).unwrap_or(0);
        debug!(task_id, delivered, "task channel publish");
    }

    /// Deliver an event to a user's personal channel. Fire-and-forget.
    pub async fn notify_user(&self, user_id: &str, event: ServerEvent) {
        let sender = Self::sender_for(&self.users, user_id).await;
        let delivered = sender.send(event).unwrap_or(0);
        debug!(user_id, delivered, "personal channel publish");
    }

    /// Broadcast a task status change to its channel.
    pub async fn broadcast_status(&self, task_id: &str, status: TaskStatus) {
        self.publish_task(
            task_id,
            ServerEvent::TaskStatusChanged {
                task_id: task_id.to_owned(),
                status,
                timestamp: Utc::now(),
            },
        )
        .await;
    }
}
