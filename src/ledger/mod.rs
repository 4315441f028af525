//! Application ledger: one helper's bid per task, and the approval
//! flow that assigns helper slots.
//!
//! Approval is the one multi-record write in the system: claiming the
//! application, occupying a helper slot, and cascade-rejecting the
//! other pending applications happen inside a single transaction, so
//! two concurrent approvals on the same task cannot both win a slot.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::geo::{self, Point};
use crate::models::application::{Application, ApplicationStatus};
use crate::models::notification::{Notification, NotificationKind};
use crate::models::task::{Task, TaskStatus};
use crate::models::user::UserAccount;
use crate::notify::Notifier;
use crate::persistence::application_repo::ApplicationRepo;
use crate::persistence::db::Database;
use crate::persistence::task_repo::TaskRepo;
use crate::realtime::hub::ChannelHub;
use crate::{AppError, Result};

/// Result of a successful approval.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    /// The approved application.
    pub application: Application,
    /// The task after slot assignment.
    pub task: Task,
    /// Applications rejected by the cascade.
    pub rejected: Vec<RejectedApplication>,
}

/// Identity of an application swept up by the approval cascade.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RejectedApplication {
    /// Application identifier.
    pub id: String,
    /// Helper whose application was rejected.
    pub helper_id: String,
}

/// Tracks applications and enforces the helper-slot invariants.
#[derive(Clone)]
pub struct ApplicationLedger {
    db: Arc<Database>,
    tasks: TaskRepo,
    applications: ApplicationRepo,
    notifier: Notifier,
    hub: Arc<ChannelHub>,
    average_speed_kmh: f64,
}

impl ApplicationLedger {
    /// Create the ledger service over shared state.
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        notifier: Notifier,
        hub: Arc<ChannelHub>,
        average_speed_kmh: f64,
    ) -> Self {
        Self {
            tasks: TaskRepo::new(Arc::clone(&db)),
            applications: ApplicationRepo::new(Arc::clone(&db)),
            db,
            notifier,
            hub,
            average_speed_kmh,
        }
    }

    /// Apply to help with a task.
    ///
    /// Computes distance and ETA from the helper's supplied coordinates
    /// and bumps the task's display counter. The storage-level unique
    /// index rejects a second active application for the same pair.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` — task absent.
    /// - `AppError::InvalidState` — task is not open.
    /// - `AppError::Forbidden` — self-apply or guest.
    /// - `AppError::Conflict` — active application already exists.
    pub async fn apply(
        &self,
        task_id: &str,
        helper: &UserAccount,
        message: Option<String>,
        location: Option<Point>,
    ) -> Result<Application> {
        if helper.is_guest {
            return Err(AppError::Forbidden("guests cannot apply to tasks".into()));
        }

        let task = self.tasks.require(task_id).await?;
        if task.status != TaskStatus::Open {
            return Err(AppError::InvalidState(
                "task is no longer accepting applications".into(),
            ));
        }
        if task.is_requester(&helper.id) {
            return Err(AppError::Forbidden("cannot apply to your own task".into()));
        }

        let mut application = Application::new(task_id.to_owned(), helper.id.clone(), message);
        if let Some(location) = location {
            let distance = geo::haversine_km(location, task.location());
            application.helper_latitude = Some(location.latitude);
            application.helper_longitude = Some(location.longitude);
            application.distance_km = Some(distance);
            application.eta_minutes = Some(geo::eta_minutes(distance, self.average_speed_kmh));
        }

        let application = self.applications.create(&application).await?;
        self.tasks.bump_application_count(task_id, 1).await?;

        let notification = Notification::new(
            task.requester_id.clone(),
            NotificationKind::HelpRequest,
            "New Help Request".to_owned(),
            format!("{} wants to help with \"{}\"", helper.username, task.title),
        )
        .with_task(task_id.to_owned())
        .with_application(application.id.clone());
        let _ = self.notifier.send(notification).await;

        info!(application_id = %application.id, "application submitted");
        Ok(application)
    }

    /// Approve an application. Requester-only, pending-only.
    ///
    /// Claims the application, occupies a helper slot (primary first,
    /// additional slot if the primary is taken and capacity remains),
    /// and rejects every other pending application — all in one
    /// transaction. Of N concurrent approvals on the same task, exactly
    /// one commits.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` or `AppError::InvalidState` per
    /// the checks above, or `AppError::Db` on persistence failure.
    pub async fn approve(&self, application_id: &str, by: &UserAccount) -> Result<ApprovalOutcome> {
        let application = self.applications.require(application_id).await?;
        let task = self.tasks.require(&application.task_id).await?;

        if !task.is_requester(&by.id) {
            return Err(AppError::Forbidden(
                "only the requester can approve applications".into(),
            ));
        }
        if application.status != ApplicationStatus::Pending {
            return Err(AppError::InvalidState(
                "application is not in pending status".into(),
            ));
        }
        if task.assigned_helper.is_some() && !task.can_accept_more_helpers() {
            return Err(AppError::InvalidState(
                "task already has the maximum number of helpers".into(),
            ));
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.db.begin().await?;

        // Claim the application row; of two concurrent approvals of the
        // same application, one finds it already decided.
        let claimed = sqlx::query(
            "UPDATE help_request SET status = 'approved', responded_at = ?1
             WHERE id = ?2 AND status = 'pending'",
        )
        .bind(&now)
        .bind(application_id)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(AppError::InvalidState(
                "application is not in pending status".into(),
            ));
        }

        // Occupy a helper slot. The primary slot is claimed with a
        // conditional update; the additional slot re-derives capacity
        // from the row as it exists inside the transaction.
        let occupied = if task.assigned_helper.is_none() {
            sqlx::query(
                "UPDATE task SET assigned_helper = ?1, status = 'pending_approval',
                 updated_at = ?2
                 WHERE id = ?3 AND status = 'open' AND assigned_helper IS NULL",
            )
            .bind(&application.helper_id)
            .bind(&now)
            .bind(&task.id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                == 1
        } else {
            let row: Option<(String, i64)> = sqlx::query_as(
                "SELECT additional_helpers, max_helpers FROM task
                 WHERE id = ?1 AND assigned_helper IS NOT NULL",
            )
            .bind(&task.id)
            .fetch_optional(&mut *tx)
            .await?;

            match row {
                Some((raw, max_helpers)) => {
                    let mut helpers: Vec<String> = serde_json::from_str(&raw)
                        .map_err(|err| AppError::Db(format!("invalid additional_helpers: {err}")))?;
                    let occupied_slots = i64::try_from(helpers.len())
                        .map_err(|_| AppError::Db("helper count overflow".into()))?
                        + 1;
                    if occupied_slots >= max_helpers {
                        false
                    } else {
                        helpers.push(application.helper_id.clone());
                        let helpers_json = serde_json::to_string(&helpers).map_err(|err| {
                            AppError::Db(format!("serialize additional_helpers: {err}"))
                        })?;
                        sqlx::query(
                            "UPDATE task SET additional_helpers = ?1, updated_at = ?2
                             WHERE id = ?3",
                        )
                        .bind(&helpers_json)
                        .bind(&now)
                        .bind(&task.id)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected()
                            == 1
                    }
                }
                None => false,
            }
        };
        if !occupied {
            tx.rollback().await?;
            return Err(AppError::InvalidState(
                "task already has the maximum number of helpers".into(),
            ));
        }

        // Cascade: reject every other still-pending application.
        let rejected: Vec<RejectedApplication> = sqlx::query_as(
            "UPDATE help_request SET status = 'rejected', responded_at = ?1
             WHERE task_id = ?2 AND id != ?3 AND status = 'pending'
             RETURNING id, helper_id",
        )
        .bind(&now)
        .bind(&task.id)
        .bind(application_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let fresh_task = self.tasks.require(&task.id).await?;
        let fresh_application = self.applications.require(application_id).await?;

        if fresh_task.status == TaskStatus::PendingApproval && task.status == TaskStatus::Open {
            self.hub
                .broadcast_status(&fresh_task.id, fresh_task.status)
                .await;
        }

        let approved_note = Notification::new(
            fresh_application.helper_id.clone(),
            NotificationKind::HelperApproved,
            "You're Approved!".to_owned(),
            format!("You've been approved to help with \"{}\"", fresh_task.title),
        )
        .with_task(fresh_task.id.clone())
        .with_application(fresh_application.id.clone());
        let _ = self.notifier.send(approved_note).await;

        for rejected_app in &rejected {
            let notification = Notification::new(
                rejected_app.helper_id.clone(),
                NotificationKind::HelperRejected,
                "Application Update".to_owned(),
                format!("Your application for \"{}\" was not selected", fresh_task.title),
            )
            .with_task(fresh_task.id.clone())
            .with_application(rejected_app.id.clone());
            let _ = self.notifier.send(notification).await;
        }

        info!(cascaded = rejected.len(), "application approved");
        Ok(ApprovalOutcome {
            application: fresh_application,
            task: fresh_task,
            rejected,
        })
    }

    /// Reject an application. Requester-only, pending-only.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` or `AppError::InvalidState` per
    /// the checks above.
    pub async fn reject(
        &self,
        application_id: &str,
        by: &UserAccount,
        reason: Option<String>,
    ) -> Result<Application> {
        let application = self.applications.require(application_id).await?;
        let task = self.tasks.require(&application.task_id).await?;

        if !task.is_requester(&by.id) {
            return Err(AppError::Forbidden(
                "only the requester can reject applications".into(),
            ));
        }
        if application.status != ApplicationStatus::Pending {
            return Err(AppError::InvalidState(
                "application is not in pending status".into(),
            ));
        }

        if !self
            .applications
            .decide_pending_guarded(application_id, ApplicationStatus::Rejected, reason.as_deref())
            .await?
        {
            return Err(AppError::InvalidState(
                "application is not in pending status".into(),
            ));
        }

        let notification = Notification::new(
            application.helper_id.clone(),
            NotificationKind::HelperRejected,
            "Application Update".to_owned(),
            format!("Your application for \"{}\" was not selected", task.title),
        )
        .with_task(task.id.clone())
        .with_application(application_id.to_owned());
        let _ = self.notifier.send(notification).await;

        info!("application rejected");
        self.applications.require(application_id).await
    }

    /// Withdraw an application. Applying helper only, pending-only.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` or `AppError::InvalidState` per
    /// the checks above.
    pub async fn cancel(&self, application_id: &str, by: &UserAccount) -> Result<Application> {
        let application = self.applications.require(application_id).await?;

        if application.helper_id != by.id {
            return Err(AppError::Forbidden(
                "only the applying helper can withdraw this application".into(),
            ));
        }
        if application.status != ApplicationStatus::Pending {
            return Err(AppError::InvalidState(
                "can only withdraw pending applications".into(),
            ));
        }

        if !self
            .applications
            .decide_pending_guarded(application_id, ApplicationStatus::Cancelled, None)
            .await?
        {
            return Err(AppError::InvalidState(
                "can only withdraw pending applications".into(),
            ));
        }

        self.tasks
            .bump_application_count(&application.task_id, -1)
            .await?;

        info!("application withdrawn");
        self.applications.require(application_id).await
    }

    /// Refresh the helper's location on an approved application,
    /// recomputing distance and ETA to the task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` unless `by` is the applying
    /// helper, or `AppError::InvalidState` unless the application is
    /// approved.
    pub async fn update_location(
        &self,
        application_id: &str,
        by: &UserAccount,
        location: Point,
    ) -> Result<Application> {
        let application = self.applications.require(application_id).await?;

        if application.helper_id != by.id {
            return Err(AppError::Forbidden(
                "only the applying helper can update this application".into(),
            ));
        }
        if application.status != ApplicationStatus::Approved {
            return Err(AppError::InvalidState(
                "can only update location for approved applications".into(),
            ));
        }

        let task = self.tasks.require(&application.task_id).await?;
        let distance = geo::haversine_km(location, task.location());
        let eta = geo::eta_minutes(distance, self.average_speed_kmh);

        self.applications
            .update_location(
                application_id,
                location.latitude,
                location.longitude,
                distance,
                eta,
            )
            .await?;

        self.applications.require(application_id).await
    }

    /// List applications for a task. Owner-only.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` unless `by` owns the task.
    pub async fn list_for_task(&self, task_id: &str, by: &UserAccount) -> Result<Vec<Application>> {
        let task = self.tasks.require(task_id).await?;
        if !task.is_requester(&by.id) {
            return Err(AppError::Forbidden(
                "not authorized to view applications for this task".into(),
            ));
        }
        self.applications.list_for_task(task_id).await
    }

    /// List the caller's own applications.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_mine(
        &self,
        helper_id: &str,
        status: Option<ApplicationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Application>> {
        self.applications
            .list_for_helper(helper_id, status, limit, offset)
            .await
    }
}
