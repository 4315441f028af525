//! Notification sink: durable persist, then fire-and-forget delivery.

use std::sync::Arc;

use tracing::debug;

use crate::models::notification::Notification;
use crate::persistence::db::Database;
use crate::persistence::notification_repo::NotificationRepo;
use crate::realtime::events::ServerEvent;
use crate::realtime::hub::ChannelHub;
use crate::Result;

/// Persists notifications and pushes them to the recipient's personal
/// channel.
///
/// The row is stored before the push; the push itself has no delivery
/// guarantee, so clients reconcile against the stored list on connect.
#[derive(Clone)]
pub struct Notifier {
    repo: NotificationRepo,
    hub: Arc<ChannelHub>,
}

impl Notifier {
    /// Create a new notifier over the shared database and hub.
    #[must_use]
    pub fn new(db: Arc<Database>, hub: Arc<ChannelHub>) -> Self {
        Self {
            repo: NotificationRepo::new(db),
            hub,
        }
    }

    /// Store a notification, then emit `notification:new` to the
    /// recipient's personal channel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if persistence fails. Broadcast failures
    /// are not errors; nobody listening just means nothing delivered.
    pub async fn send(&self, notification: Notification) -> Result<Notification> {
        let stored = self.repo.create(&notification).await?;
        debug!(user_id = %stored.user_id, kind = stored.kind.as_str(), "notification stored");

        self.hub
            .notify_user(
                &stored.user_id,
                ServerEvent::NotificationNew {
                    notification: stored.clone(),
                },
            )
            .await;

        Ok(stored)
    }

    /// Read access to the backing repository (history endpoints).
    #[must_use]
    pub fn repo(&self) -> &NotificationRepo {
        &self.repo
    }
}
