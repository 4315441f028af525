//! Persisted notification model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why the user is being notified.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Someone applied to help with your task.
    HelpRequest,
    /// Your application was approved.
    HelperApproved,
    /// Your application was not selected.
    HelperRejected,
    /// Task status changed.
    TaskUpdate,
    /// Task was cancelled.
    TaskCancelled,
    /// New chat message.
    ChatMessage,
    /// Urgent help needed near you.
    UrgentNearby,
}

impl NotificationKind {
    /// Stable wire/storage name for the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HelpRequest => "help_request",
            Self::HelperApproved => "helper_approved",
            Self::HelperRejected => "helper_rejected",
            Self::TaskUpdate => "task_update",
            Self::TaskCancelled => "task_cancelled",
            Self::ChatMessage => "chat_message",
            Self::UrgentNearby => "urgent_nearby",
        }
    }
}

/// A notification durably stored for one user.
///
/// The realtime emit that follows persistence is at-most-once; this row
/// is what the client reconciles against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Notification {
    /// Unique record identifier.
    pub id: String,
    /// User being notified.
    pub user_id: String,
    /// Notification kind.
    pub kind: NotificationKind,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Related task, for deep linking.
    pub task_id: Option<String>,
    /// Related application, for deep linking.
    pub application_id: Option<String>,
    /// Related chat message, for deep linking.
    pub message_id: Option<String>,
    /// Whether the user has seen it.
    pub read: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Construct an unread notification with a generated identifier.
    #[must_use]
    pub fn new(user_id: String, kind: NotificationKind, title: String, body: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            kind,
            title,
            body,
            task_id: None,
            application_id: None,
            message_id: None,
            read: false,
            created_at: Utc::now(),
        }
    }

    /// Attach a related task id.
    #[must_use]
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Attach a related application id.
    #[must_use]
    pub fn with_application(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }

    /// Attach a related message id.
    #[must_use]
    pub fn with_message(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}
