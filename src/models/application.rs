//! Help-request application model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Point;

/// Lifecycle status for an application.
///
/// `Pending` is the only non-terminal state for write purposes: once an
/// application leaves it, only `responded_at`/`rejection_reason` may
/// still change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    /// Awaiting the requester's decision.
    Pending,
    /// Requester accepted; helper occupies a slot.
    Approved,
    /// Requester declined, or a sibling approval cascaded.
    Rejected,
    /// Helper withdrew before a decision.
    Cancelled,
}

impl ApplicationStatus {
    /// Stable wire/storage name for the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the application still counts toward the one-active-per-pair
    /// uniqueness rule.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

/// One helper's bid to help with one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Application {
    /// Unique record identifier.
    pub id: String,
    /// Task being applied to.
    pub task_id: String,
    /// Applying helper.
    pub helper_id: String,
    /// Current status.
    pub status: ApplicationStatus,
    /// Optional message from the helper.
    pub message: String,
    /// Helper latitude at application time, if shared.
    pub helper_latitude: Option<f64>,
    /// Helper longitude at application time, if shared.
    pub helper_longitude: Option<f64>,
    /// Great-circle distance to the task in kilometres.
    pub distance_km: Option<f64>,
    /// Estimated minutes for the helper to arrive.
    pub eta_minutes: Option<u32>,
    /// Why the application was rejected, if it was.
    pub rejection_reason: Option<String>,
    /// When the helper applied.
    pub requested_at: DateTime<Utc>,
    /// When the requester responded (approve/reject) or a cascade did.
    pub responded_at: Option<DateTime<Utc>>,
}

impl Application {
    /// Construct a pending application with a generated identifier.
    #[must_use]
    pub fn new(task_id: String, helper_id: String, message: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id,
            helper_id,
            status: ApplicationStatus::Pending,
            message: message
                .unwrap_or_else(|| "I would like to help with this task".to_owned()),
            helper_latitude: None,
            helper_longitude: None,
            distance_km: None,
            eta_minutes: None,
            rejection_reason: None,
            requested_at: Utc::now(),
            responded_at: None,
        }
    }

    /// The helper's location snapshot, if one was shared.
    #[must_use]
    pub fn helper_location(&self) -> Option<Point> {
        match (self.helper_latitude, self.helper_longitude) {
            (Some(lat), Some(lon)) => Some(Point::new(lat, lon)),
            _ => None,
        }
    }
}
