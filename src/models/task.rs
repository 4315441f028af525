//! Task model, status workflow, and reward computation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Point;

/// What kind of help a task asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Assistance for elderly people.
    ElderlyAssistance,
    /// Support for people with disabilities.
    DisabilitySupport,
    /// Medical errands or accompaniment.
    Medical,
    /// General errands.
    Errands,
    /// Help around the home.
    HomeHelp,
    /// Rides and deliveries.
    Transport,
    /// Help with phones, computers, appliances.
    TechHelp,
    /// Anything else.
    Other,
}

impl TaskCategory {
    /// Categories serving vulnerable groups earn a points bonus.
    #[must_use]
    pub fn is_vulnerability(self) -> bool {
        matches!(
            self,
            Self::ElderlyAssistance | Self::DisabilitySupport | Self::Medical
        )
    }
}

/// Urgency tier, affecting matching radius and point reward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// No time pressure.
    Normal,
    /// Needed soon.
    Urgent,
    /// Emergency; widest notification radius.
    Sos,
}

/// Lifecycle status for a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Open for helpers to apply.
    Open,
    /// A helper is assigned, awaiting kickoff.
    PendingApproval,
    /// Helper approved and on the way.
    InProgress,
    /// Helper has arrived at the location.
    HelperArrived,
    /// Task execution started.
    TaskStarted,
    /// Work done, waiting for OTP verification.
    PendingVerification,
    /// Verified and completed.
    Completed,
    /// Cancelled by requester or helper.
    Cancelled,
    /// Under dispute; requires manual resolution.
    Disputed,
}

impl TaskStatus {
    /// Stable wire/storage name for the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::PendingApproval => "pending_approval",
            Self::InProgress => "in_progress",
            Self::HelperArrived => "helper_arrived",
            Self::TaskStarted => "task_started",
            Self::PendingVerification => "pending_verification",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Disputed => "disputed",
        }
    }

    /// Transitions permitted from this status.
    ///
    /// This is the single source of truth for the workflow; every status
    /// change in the system is validated against it.
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [TaskStatus] {
        match self {
            Self::Open => &[Self::PendingApproval, Self::Cancelled],
            Self::PendingApproval => &[Self::InProgress, Self::Open, Self::Cancelled],
            Self::InProgress => &[Self::HelperArrived, Self::Cancelled, Self::Disputed],
            Self::HelperArrived => &[Self::TaskStarted, Self::Cancelled, Self::Disputed],
            Self::TaskStarted => &[Self::PendingVerification, Self::Cancelled, Self::Disputed],
            Self::PendingVerification => &[Self::Completed, Self::Disputed],
            Self::Completed => &[Self::Disputed],
            Self::Cancelled | Self::Disputed => &[],
        }
    }

    /// Determine whether a workflow transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Terminal statuses admit no further transitions except the
    /// completed → disputed escape hatch.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Disputed)
    }

    /// Statuses from which the task may still be cancelled.
    #[must_use]
    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::Open | Self::PendingApproval | Self::InProgress)
    }

    /// Statuses from which a dispute may be raised.
    #[must_use]
    pub fn is_disputable(self) -> bool {
        matches!(
            self,
            Self::InProgress
                | Self::HelperArrived
                | Self::TaskStarted
                | Self::PendingVerification
                | Self::Completed
        )
    }
}

/// Upper bound on helper slots per task.
pub const MAX_HELPERS_LIMIT: u32 = 5;

/// Base points awarded for any completed task.
const BASE_POINTS: u32 = 10;

/// Points reward for a task, fixed at creation time.
///
/// Base 10, +10 for `sos`, +5 for `urgent`, +5 when the category serves
/// a vulnerable group.
#[must_use]
pub fn compute_points_reward(urgency: Urgency, category: TaskCategory) -> u32 {
    let mut points = BASE_POINTS;
    points += match urgency {
        Urgency::Sos => 10,
        Urgency::Urgent => 5,
        Urgency::Normal => 0,
    };
    if category.is_vulnerability() {
        points += 5;
    }
    points
}

/// A request for help posted by a requester.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Task {
    /// Unique record identifier.
    pub id: String,
    /// Owning requester; immutable after creation.
    pub requester_id: String,
    /// Concise summary of the task.
    pub title: String,
    /// What needs doing.
    pub description: String,
    /// Kind of help requested.
    pub category: TaskCategory,
    /// Urgency tier.
    pub urgency: Urgency,
    /// Task location latitude.
    pub latitude: f64,
    /// Task location longitude.
    pub longitude: f64,
    /// Street address shown to collaborators.
    pub address: String,
    /// City, if provided.
    pub city: Option<String>,
    /// Current workflow status.
    pub status: TaskStatus,
    /// Primary helper occupying the main slot.
    pub assigned_helper: Option<String>,
    /// Supplementary helpers beyond the primary slot.
    pub additional_helpers: Vec<String>,
    /// Helper slot limit (1..=5).
    pub max_helpers: u32,
    /// When the task should happen, if scheduled.
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Rough duration estimate in minutes.
    pub estimated_duration_minutes: Option<u32>,
    /// When the assigned helper set off.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task was verified complete.
    pub completed_at: Option<DateTime<Utc>>,
    /// Transient completion code; cleared once consumed.
    pub completion_otp: Option<String>,
    /// When the completion code was generated.
    pub otp_generated_at: Option<DateTime<Utc>>,
    /// Redact the address from non-owners when set.
    pub hide_sensitive_details: bool,
    /// Points credited to the helper on completion.
    pub points_reward: u32,
    /// Who cancelled the task.
    pub cancelled_by: Option<String>,
    /// Why the task was cancelled.
    pub cancellation_reason: Option<String>,
    /// Why the task is disputed.
    pub dispute_reason: Option<String>,
    /// Best-effort application counter; the ledger is authoritative.
    pub application_count: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new task.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    /// Concise summary.
    pub title: String,
    /// What needs doing.
    pub description: String,
    /// Kind of help requested.
    pub category: TaskCategory,
    /// Urgency tier.
    pub urgency: Urgency,
    /// Task location.
    pub location: Point,
    /// Street address.
    pub address: String,
    /// City, if provided.
    pub city: Option<String>,
    /// Optional schedule.
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Rough duration estimate in minutes.
    pub estimated_duration_minutes: Option<u32>,
    /// Helper slot limit; clamped to 1..=5.
    pub max_helpers: Option<u32>,
    /// Redact the address from non-owners.
    pub hide_sensitive_details: bool,
}

impl Task {
    /// Construct an open task with a generated identifier and computed
    /// points reward.
    #[must_use]
    pub fn new(requester_id: String, draft: TaskDraft) -> Self {
        let now = Utc::now();
        let max_helpers = draft.max_helpers.unwrap_or(1).clamp(1, MAX_HELPERS_LIMIT);
        let points_reward = compute_points_reward(draft.urgency, draft.category);
        Self {
            id: Uuid::new_v4().to_string(),
            requester_id,
            title: draft.title,
            description: draft.description,
            category: draft.category,
            urgency: draft.urgency,
            latitude: draft.location.latitude,
            longitude: draft.location.longitude,
            address: draft.address,
            city: draft.city,
            status: TaskStatus::Open,
            assigned_helper: None,
            additional_helpers: Vec::new(),
            max_helpers,
            scheduled_for: draft.scheduled_for,
            estimated_duration_minutes: draft.estimated_duration_minutes,
            started_at: None,
            completed_at: None,
            completion_otp: None,
            otp_generated_at: None,
            hide_sensitive_details: draft.hide_sensitive_details,
            points_reward,
            cancelled_by: None,
            cancellation_reason: None,
            dispute_reason: None,
            application_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The task location as a coordinate pair.
    #[must_use]
    pub fn location(&self) -> Point {
        Point::new(self.latitude, self.longitude)
    }

    /// Helpers currently occupying slots, primary included.
    #[must_use]
    pub fn helper_count(&self) -> u32 {
        let additional = u32::try_from(self.additional_helpers.len()).unwrap_or(u32::MAX);
        u32::from(self.assigned_helper.is_some()) + additional
    }

    /// Whether another helper can still be approved.
    ///
    /// Re-derives from the actual helper set, never the application
    /// counter.
    #[must_use]
    pub fn can_accept_more_helpers(&self) -> bool {
        self.assigned_helper.is_some() && self.helper_count() < self.max_helpers
    }

    /// Whether `user_id` is the primary assigned helper.
    #[must_use]
    pub fn is_assigned_helper(&self, user_id: &str) -> bool {
        self.assigned_helper.as_deref() == Some(user_id)
    }

    /// Whether `user_id` occupies any helper slot.
    #[must_use]
    pub fn is_any_helper(&self, user_id: &str) -> bool {
        self.is_assigned_helper(user_id)
            || self.additional_helpers.iter().any(|h| h == user_id)
    }

    /// Whether `user_id` is the owning requester.
    #[must_use]
    pub fn is_requester(&self, user_id: &str) -> bool {
        self.requester_id == user_id
    }
}
