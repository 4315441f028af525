//! Realtime channel event types.
//!
//! Wire names keep the `verb:noun` convention the mobile clients
//! already speak.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::message::ChatMessage;
use crate::models::notification::Notification;
use crate::models::task::TaskStatus;

/// Events a connected client may send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Join a task's coordination channel.
    #[serde(rename = "join:task")]
    JoinTask {
        /// Target task.
        task_id: String,
    },
    /// Leave a task's coordination channel.
    #[serde(rename = "leave:task")]
    LeaveTask {
        /// Target task.
        task_id: String,
    },
    /// Share a live helper location with the task channel.
    #[serde(rename = "update:location")]
    UpdateLocation {
        /// Target task.
        task_id: String,
        /// Helper latitude.
        latitude: f64,
        /// Helper longitude.
        longitude: f64,
    },
    /// Send a chat message to the task's other party.
    #[serde(rename = "send:message")]
    SendMessage {
        /// Target task.
        task_id: String,
        /// Message body.
        content: String,
    },
    /// Mark all messages addressed to the caller in a task as read.
    #[serde(rename = "messages:read")]
    MessagesRead {
        /// Target task.
        task_id: String,
    },
}

/// Events the server pushes to clients.
///
/// Delivery is at-most-once; every payload is backed by a durable row
/// the client can re-fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Acknowledges a successful task-channel join.
    #[serde(rename = "joined:task")]
    JoinedTask {
        /// Joined task.
        task_id: String,
    },
    /// Acknowledges leaving a task channel.
    #[serde(rename = "left:task")]
    LeftTask {
        /// Left task.
        task_id: String,
    },
    /// A helper's live location, broadcast to the task channel.
    #[serde(rename = "helper:location")]
    HelperLocation {
        /// Task the helper is working.
        task_id: String,
        /// Reporting helper.
        helper_id: String,
        /// Helper latitude.
        latitude: f64,
        /// Helper longitude.
        longitude: f64,
        /// When the location was reported.
        timestamp: DateTime<Utc>,
    },
    /// A freshly persisted chat message.
    #[serde(rename = "message:new")]
    MessageNew {
        /// The stored message.
        message: ChatMessage,
    },
    /// A freshly persisted notification, delivered to its recipient's
    /// personal channel.
    #[serde(rename = "notification:new")]
    NotificationNew {
        /// The stored notification.
        notification: Notification,
    },
    /// Server-initiated task status broadcast.
    #[serde(rename = "task:status")]
    TaskStatusChanged {
        /// Task that changed.
        task_id: String,
        /// New status.
        status: TaskStatus,
        /// When the change happened.
        timestamp: DateTime<Utc>,
    },
    /// Read receipts were recorded for a task's messages.
    #[serde(rename = "messages:marked_read")]
    MessagesMarkedRead {
        /// Task whose messages were read.
        task_id: String,
        /// Reader.
        user_id: String,
    },
    /// A request failed; human-readable explanation.
    #[serde(rename = "error")]
    Error {
        /// What went wrong.
        message: String,
    },
}
