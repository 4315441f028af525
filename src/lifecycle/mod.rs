//! Task lifecycle service: creation, workflow transitions, cancellation,
//! disputes, and OTP-verified completion.
//!
//! Every status change is validated against
//! [`TaskStatus::allowed_transitions`] and applied with a conditional
//! update, so concurrent writers race safely: the loser re-reads and
//! reports the real current state.

use std::sync::Arc;

use tracing::info;

use crate::models::notification::{Notification, NotificationKind};
use crate::models::otp::{OtpPurpose, OtpRecord, OtpSubject};
use crate::models::task::{Task, TaskDraft, TaskStatus};
use crate::models::user::UserAccount;
use crate::notify::Notifier;
use crate::otp::OtpGuard;
use crate::persistence::application_repo::ApplicationRepo;
use crate::persistence::db::Database;
use crate::persistence::task_repo::TaskRepo;
use crate::persistence::user_repo::UserRepo;
use crate::realtime::hub::ChannelHub;
use crate::{AppError, Result};

/// Caller-supplied partial update for an open task.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New category.
    pub category: Option<crate::models::task::TaskCategory>,
    /// New urgency.
    pub urgency: Option<crate::models::task::Urgency>,
    /// New location.
    pub location: Option<crate::geo::Point>,
    /// New address.
    pub address: Option<String>,
    /// New city.
    pub city: Option<String>,
    /// New schedule.
    pub scheduled_for: Option<chrono::DateTime<chrono::Utc>>,
    /// New duration estimate.
    pub estimated_duration_minutes: Option<u32>,
    /// New helper slot limit.
    pub max_helpers: Option<u32>,
    /// New redaction flag.
    pub hide_sensitive_details: Option<bool>,
}

/// The state machine governing a task's status and its side effects.
#[derive(Clone)]
pub struct TaskLifecycle {
    tasks: TaskRepo,
    applications: ApplicationRepo,
    users: UserRepo,
    otp: OtpGuard,
    notifier: Notifier,
    hub: Arc<ChannelHub>,
}

impl TaskLifecycle {
    /// Create the lifecycle service over shared state.
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        otp: OtpGuard,
        notifier: Notifier,
        hub: Arc<ChannelHub>,
    ) -> Self {
        Self {
            tasks: TaskRepo::new(Arc::clone(&db)),
            applications: ApplicationRepo::new(Arc::clone(&db)),
            users: UserRepo::new(db),
            otp,
            notifier,
            hub,
        }
    }

    /// Create an open task owned by `requester`.
    ///
    /// Computes the points reward from urgency and category and counts
    /// the task against the requester's stats.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` for guests, `AppError::Validation`
    /// for missing fields, or `AppError::Db` on persistence failure.
    pub async fn create_task(&self, requester: &UserAccount, draft: TaskDraft) -> Result<Task> {
        if requester.is_guest {
            return Err(AppError::Forbidden("guests cannot create tasks".into()));
        }
        if draft.title.trim().is_empty()
            || draft.description.trim().is_empty()
            || draft.address.trim().is_empty()
        {
            return Err(AppError::Validation(
                "title, description, and address are required".into(),
            ));
        }

        let task = Task::new(requester.id.clone(), draft);
        let task = self.tasks.create(&task).await?;
        self.users.increment_tasks_requested(&requester.id).await?;

        info!(task_id = %task.id, points = task.points_reward, "task created");
        Ok(task)
    }

    /// Update an open task's editable fields. Owner-only, open-only.
    ///
    /// The points reward is fixed at creation and deliberately not
    /// recomputed here.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound`, `AppError::Forbidden`, or
    /// `AppError::InvalidState` per the checks above.
    pub async fn update_task(
        &self,
        task_id: &str,
        by: &UserAccount,
        update: TaskUpdate,
    ) -> Result<Task> {
        let mut task = self.tasks.require(task_id).await?;

        if !task.is_requester(&by.id) {
            return Err(AppError::Forbidden(
                "only the requester can update this task".into(),
            ));
        }
        if task.status != TaskStatus::Open {
            return Err(AppError::InvalidState(
                "cannot update task after it has been accepted".into(),
            ));
        }

        if let Some(title) = update.title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = description;
        }
        if let Some(category) = update.category {
            task.category = category;
        }
        if let Some(urgency) = update.urgency {
            task.urgency = urgency;
        }
        if let Some(location) = update.location {
            task.latitude = location.latitude;
            task.longitude = location.longitude;
        }
        if let Some(address) = update.address {
            task.address = address;
        }
        if let Some(city) = update.city {
            task.city = Some(city);
        }
        if let Some(scheduled_for) = update.scheduled_for {
            task.scheduled_for = Some(scheduled_for);
        }
        if let Some(duration) = update.estimated_duration_minutes {
            task.estimated_duration_minutes = Some(duration);
        }
        if let Some(max_helpers) = update.max_helpers {
            task.max_helpers = max_helpers.clamp(1, crate::models::task::MAX_HELPERS_LIMIT);
        }
        if let Some(hide) = update.hide_sensitive_details {
            task.hide_sensitive_details = hide;
        }

        self.tasks.update_details(&task).await?;
        self.tasks.require(task_id).await
    }

    /// Apply an explicit workflow transition requested by `by`.
    ///
    /// Cancellations and disputes carry their reason; other transitions
    /// ignore it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTransition` for edges outside the
    /// table, `AppError::Forbidden` for the wrong role, and the
    /// cancel/dispute-specific errors when delegating.
    pub async fn transition_status(
        &self,
        task_id: &str,
        by: &UserAccount,
        to: TaskStatus,
        reason: Option<String>,
    ) -> Result<Task> {
        let task = self.tasks.require(task_id).await?;
        let current = task.status;

        if !current.can_transition_to(to) {
            return Err(invalid_transition(current, to));
        }

        match to {
            TaskStatus::Cancelled => return self.cancel_task(task_id, by, reason).await,
            TaskStatus::Disputed => {
                let reason = reason
                    .ok_or_else(|| AppError::Validation("dispute reason is required".into()))?;
                return self.dispute_task(task_id, by, reason).await;
            }
            TaskStatus::Open => return self.reopen_task(&task, by).await,
            TaskStatus::PendingApproval => {
                return Err(AppError::Forbidden(
                    "helper assignment happens through application approval".into(),
                ));
            }
            TaskStatus::Completed => {
                return Err(AppError::Forbidden(
                    "completion requires code verification".into(),
                ));
            }
            TaskStatus::HelperArrived | TaskStatus::TaskStarted => {
                if !task.is_any_helper(&by.id) {
                    return Err(AppError::Forbidden(
                        "only an assigned helper can update to this status".into(),
                    ));
                }
            }
            TaskStatus::PendingVerification => {
                if !task.is_requester(&by.id) {
                    return Err(AppError::Forbidden(
                        "only the requester can mark the task for verification".into(),
                    ));
                }
            }
            TaskStatus::InProgress => {
                if !task.is_requester(&by.id) && !task.is_any_helper(&by.id) {
                    return Err(AppError::Forbidden(
                        "only task collaborators can update this task".into(),
                    ));
                }
            }
        }

        if !self.tasks.transition_guarded(task_id, current, to).await? {
            // Lost a race; report against the fresh state.
            let fresh = self.tasks.require(task_id).await?;
            return Err(invalid_transition(fresh.status, to));
        }

        let fresh = self.tasks.require(task_id).await?;
        self.hub.broadcast_status(task_id, fresh.status).await;
        self.notify_counterpart(&fresh, by, NotificationKind::TaskUpdate)
            .await;

        info!(from = current.as_str(), to = to.as_str(), "task transitioned");
        Ok(fresh)
    }

    /// Un-approve a task in `pending_approval`, returning it to the
    /// open pool. Requester-only.
    ///
    /// Clears every helper slot and rejects the approved applications
    /// so the pair uniqueness rule frees up for a fresh apply.
    async fn reopen_task(&self, task: &Task, by: &UserAccount) -> Result<Task> {
        if !task.is_requester(&by.id) {
            return Err(AppError::Forbidden(
                "only the requester can reopen this task".into(),
            ));
        }

        if !self.tasks.reopen_guarded(&task.id).await? {
            let fresh = self.tasks.require(&task.id).await?;
            return Err(invalid_transition(fresh.status, TaskStatus::Open));
        }

        let rejected = self.applications.reject_approved_for_task(&task.id).await?;
        for application in &rejected {
            let notification = Notification::new(
                application.helper_id.clone(),
                NotificationKind::HelperRejected,
                "Application Update".to_owned(),
                format!("Your approval for \"{}\" was withdrawn", task.title),
            )
            .with_task(task.id.clone())
            .with_application(application.id.clone());
            let _ = self.notifier.send(notification).await;
        }

        let fresh = self.tasks.require(&task.id).await?;
        self.hub.broadcast_status(&task.id, fresh.status).await;

        info!(task_id = %task.id, unassigned = rejected.len(), "task reopened");
        Ok(fresh)
    }

    /// Cancel a task. Requester or assigned helper, cancellable states
    /// only. Synchronously rejects every pending application.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` or `AppError::InvalidState` per
    /// the checks above.
    pub async fn cancel_task(
        &self,
        task_id: &str,
        by: &UserAccount,
        reason: Option<String>,
    ) -> Result<Task> {
        let task = self.tasks.require(task_id).await?;

        if !task.is_requester(&by.id) && !task.is_assigned_helper(&by.id) {
            return Err(AppError::Forbidden(
                "not authorized to cancel this task".into(),
            ));
        }
        if !task.status.is_cancellable() {
            return Err(AppError::InvalidState(format!(
                "task cannot be cancelled in status {}",
                task.status.as_str()
            )));
        }

        let reason = reason.unwrap_or_else(|| "No reason provided".to_owned());
        if !self.tasks.cancel_guarded(task_id, &by.id, &reason).await? {
            let fresh = self.tasks.require(task_id).await?;
            return Err(AppError::InvalidState(format!(
                "task cannot be cancelled in status {}",
                fresh.status.as_str()
            )));
        }

        // Cascade: every pending application is rejected within the same
        // cancellation operation, not deferred.
        let rejected = self.applications.reject_all_pending(task_id).await?;
        for application in &rejected {
            let notification = Notification::new(
                application.helper_id.clone(),
                NotificationKind::HelperRejected,
                "Application Update".to_owned(),
                format!("\"{}\" was cancelled by its requester", task.title),
            )
            .with_task(task_id.to_owned())
            .with_application(application.id.clone());
            let _ = self.notifier.send(notification).await;
        }

        let fresh = self.tasks.require(task_id).await?;
        self.hub.broadcast_status(task_id, fresh.status).await;
        self.notify_counterpart(&fresh, by, NotificationKind::TaskCancelled)
            .await;

        info!(cascaded = rejected.len(), "task cancelled");
        Ok(fresh)
    }

    /// Raise a dispute. Requester or any helper, disputable states only.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an empty reason,
    /// `AppError::Forbidden`, or `AppError::InvalidState`.
    pub async fn dispute_task(
        &self,
        task_id: &str,
        by: &UserAccount,
        reason: String,
    ) -> Result<Task> {
        if reason.trim().is_empty() {
            return Err(AppError::Validation("dispute reason is required".into()));
        }

        let task = self.tasks.require(task_id).await?;
        if !task.is_requester(&by.id) && !task.is_any_helper(&by.id) {
            return Err(AppError::Forbidden(
                "not authorized to report a dispute for this task".into(),
            ));
        }
        if !task.status.is_disputable() {
            return Err(AppError::InvalidState(format!(
                "cannot report a dispute for a task in status {}",
                task.status.as_str()
            )));
        }

        if !self.tasks.dispute_guarded(task_id, &reason).await? {
            let fresh = self.tasks.require(task_id).await?;
            return Err(AppError::InvalidState(format!(
                "cannot report a dispute for a task in status {}",
                fresh.status.as_str()
            )));
        }

        let fresh = self.tasks.require(task_id).await?;
        self.hub.broadcast_status(task_id, fresh.status).await;
        self.notify_counterpart(&fresh, by, NotificationKind::TaskUpdate)
            .await;

        info!("task disputed");
        Ok(fresh)
    }

    /// Generate a completion code for a task. Requester-only, valid in
    /// `task_started` or `pending_verification`.
    ///
    /// Generating from `task_started` advances the task to
    /// `pending_verification`; regenerating later leaves the status
    /// untouched. The code is returned to the caller, who decides how
    /// to share it with the helper in person.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` or `AppError::InvalidState` per
    /// the checks above.
    pub async fn generate_completion_otp(
        &self,
        task_id: &str,
        by: &UserAccount,
    ) -> Result<(Task, OtpRecord)> {
        let task = self.tasks.require(task_id).await?;

        if !task.is_requester(&by.id) {
            return Err(AppError::Forbidden(
                "only the requester can generate the completion code".into(),
            ));
        }
        if !matches!(
            task.status,
            TaskStatus::TaskStarted | TaskStatus::PendingVerification
        ) {
            return Err(AppError::InvalidState(
                "task is not ready for completion verification".into(),
            ));
        }

        let subject = OtpSubject::Task(task_id.to_owned());
        let ttl = self.otp.ttl_minutes_for(OtpPurpose::TaskCompletion);
        let record = self
            .otp
            .create(&subject, OtpPurpose::TaskCompletion, ttl)
            .await?;

        let advance = task.status == TaskStatus::TaskStarted;
        self.tasks
            .set_completion_otp(task_id, &record.code, advance)
            .await?;

        let fresh = self.tasks.require(task_id).await?;
        if advance {
            self.hub.broadcast_status(task_id, fresh.status).await;
        }

        info!("completion code generated");
        Ok((fresh, record))
    }

    /// Verify a completion code and finalize the task.
    ///
    /// Helper-only. Successful verification is the sole path to
    /// `completed`: it stamps the completion time, clears the transient
    /// OTP columns, and credits the verifying helper's points and task
    /// count.
    ///
    /// # Errors
    ///
    /// Propagates the OTP taxonomy (`Expired`, `AlreadyUsed`,
    /// `AttemptsExceeded`, `OtpMismatch`) plus `Forbidden` and
    /// `InvalidState`.
    pub async fn verify_completion(
        &self,
        task_id: &str,
        by: &UserAccount,
        code: &str,
    ) -> Result<(Task, u32)> {
        let task = self.tasks.require(task_id).await?;

        if !task.is_any_helper(&by.id) {
            return Err(AppError::Forbidden(
                "only an assigned helper can verify completion".into(),
            ));
        }
        if task.status != TaskStatus::PendingVerification {
            return Err(AppError::InvalidState(
                "no completion code has been generated for this task".into(),
            ));
        }

        let subject = OtpSubject::Task(task_id.to_owned());
        self.otp
            .verify(&subject, OtpPurpose::TaskCompletion, code)
            .await?;

        if !self.tasks.finalize_completion(task_id).await? {
            let fresh = self.tasks.require(task_id).await?;
            return Err(AppError::InvalidState(format!(
                "task left pending_verification (now {})",
                fresh.status.as_str()
            )));
        }

        self.users
            .credit_completion(&by.id, task.points_reward)
            .await?;

        let fresh = self.tasks.require(task_id).await?;
        self.hub.broadcast_status(task_id, fresh.status).await;

        let notification = Notification::new(
            fresh.requester_id.clone(),
            NotificationKind::TaskUpdate,
            "Task Completed".to_owned(),
            format!("\"{}\" was verified complete", fresh.title),
        )
        .with_task(task_id.to_owned());
        let _ = self.notifier.send(notification).await;

        info!(points = task.points_reward, "task completed");
        Ok((fresh, task.points_reward))
    }

    /// Notify the other party of a change `by` made.
    ///
    /// Delivery failures are swallowed; notifications are best-effort.
    async fn notify_counterpart(&self, task: &Task, by: &UserAccount, kind: NotificationKind) {
        let recipient = if task.is_requester(&by.id) {
            task.assigned_helper.clone()
        } else {
            Some(task.requester_id.clone())
        };

        if let Some(recipient) = recipient {
            let (title, body) = match kind {
                NotificationKind::TaskCancelled => (
                    "Task Cancelled".to_owned(),
                    format!("\"{}\" was cancelled", task.title),
                ),
                _ => (
                    "Task Update".to_owned(),
                    format!("\"{}\" is now {}", task.title, task.status.as_str()),
                ),
            };
            let notification = Notification::new(recipient, kind, title, body)
                .with_task(task.id.clone());
            let _ = self.notifier.send(notification).await;
        }
    }
}

fn invalid_transition(current: TaskStatus, requested: TaskStatus) -> AppError {
    AppError::InvalidTransition {
        current,
        requested,
        allowed: current.allowed_transitions().to_vec(),
    }
}
