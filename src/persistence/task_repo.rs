//! Task repository for `SQLite` persistence.
//!
//! Slot assignment and workflow transitions use conditional updates
//! (`WHERE status = …`) so that two concurrent writers cannot both win
//! the same state change; callers treat `false` as "lost the race" and
//! re-read.

use std::sync::Arc;

use chrono::Utc;

use crate::models::task::{Task, TaskCategory, TaskStatus, Urgency};
use crate::{AppError, Result};

use super::db::Database;
use super::{parse_timestamp, parse_timestamp_opt};

/// Repository wrapper around `SQLite` for task records.
#[derive(Clone)]
pub struct TaskRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    requester_id: String,
    title: String,
    description: String,
    category: String,
    urgency: String,
    latitude: f64,
    longitude: f64,
    address: String,
    city: Option<String>,
    status: String,
    assigned_helper: Option<String>,
    additional_helpers: String,
    max_helpers: i64,
    scheduled_for: Option<String>,
    estimated_duration_minutes: Option<i64>,
    started_at: Option<String>,
    completed_at: Option<String>,
    completion_otp: Option<String>,
    otp_generated_at: Option<String>,
    hide_sensitive_details: i64,
    points_reward: i64,
    cancelled_by: Option<String>,
    cancellation_reason: Option<String>,
    dispute_reason: Option<String>,
    application_count: i64,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    /// Convert a database row into the domain model.
    fn into_task(self) -> Result<Task> {
        let category = parse_category(&self.category)?;
        let urgency = parse_urgency(&self.urgency)?;
        let status = parse_task_status(&self.status)?;
        let additional_helpers: Vec<String> = serde_json::from_str(&self.additional_helpers)
            .map_err(|err| AppError::Db(format!("invalid additional_helpers: {err}")))?;

        Ok(Task {
            id: self.id,
            requester_id: self.requester_id,
            title: self.title,
            description: self.description,
            category,
            urgency,
            latitude: self.latitude,
            longitude: self.longitude,
            address: self.address,
            city: self.city,
            status,
            assigned_helper: self.assigned_helper,
            additional_helpers,
            max_helpers: u32::try_from(self.max_helpers)
                .map_err(|_| AppError::Db("invalid max_helpers".into()))?,
            scheduled_for: parse_timestamp_opt(self.scheduled_for.as_deref(), "scheduled_for")?,
            estimated_duration_minutes: self
                .estimated_duration_minutes
                .map(|v| u32::try_from(v).map_err(|_| AppError::Db("invalid duration".into())))
                .transpose()?,
            started_at: parse_timestamp_opt(self.started_at.as_deref(), "started_at")?,
            completed_at: parse_timestamp_opt(self.completed_at.as_deref(), "completed_at")?,
            completion_otp: self.completion_otp,
            otp_generated_at: parse_timestamp_opt(
                self.otp_generated_at.as_deref(),
                "otp_generated_at",
            )?,
            hide_sensitive_details: self.hide_sensitive_details != 0,
            points_reward: u32::try_from(self.points_reward)
                .map_err(|_| AppError::Db("invalid points_reward".into()))?,
            cancelled_by: self.cancelled_by,
            cancellation_reason: self.cancellation_reason,
            dispute_reason: self.dispute_reason,
            application_count: self.application_count,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
            updated_at: parse_timestamp(&self.updated_at, "updated_at")?,
        })
    }
}

pub(crate) fn parse_category(s: &str) -> Result<TaskCategory> {
    match s {
        "elderly_assistance" => Ok(TaskCategory::ElderlyAssistance),
        "disability_support" => Ok(TaskCategory::DisabilitySupport),
        "medical" => Ok(TaskCategory::Medical),
        "errands" => Ok(TaskCategory::Errands),
        "home_help" => Ok(TaskCategory::HomeHelp),
        "transport" => Ok(TaskCategory::Transport),
        "tech_help" => Ok(TaskCategory::TechHelp),
        "other" => Ok(TaskCategory::Other),
        other => Err(AppError::Db(format!("invalid category: {other}"))),
    }
}

pub(crate) fn category_str(c: TaskCategory) -> &'static str {
    match c {
        TaskCategory::ElderlyAssistance => "elderly_assistance",
        TaskCategory::DisabilitySupport => "disability_support",
        TaskCategory::Medical => "medical",
        TaskCategory::Errands => "errands",
        TaskCategory::HomeHelp => "home_help",
        TaskCategory::Transport => "transport",
        TaskCategory::TechHelp => "tech_help",
        TaskCategory::Other => "other",
    }
}

pub(crate) fn parse_urgency(s: &str) -> Result<Urgency> {
    match s {
        "normal" => Ok(Urgency::Normal),
        "urgent" => Ok(Urgency::Urgent),
        "sos" => Ok(Urgency::Sos),
        other => Err(AppError::Db(format!("invalid urgency: {other}"))),
    }
}

pub(crate) fn urgency_str(u: Urgency) -> &'static str {
    match u {
        Urgency::Normal => "normal",
        Urgency::Urgent => "urgent",
        Urgency::Sos => "sos",
    }
}

pub(crate) fn parse_task_status(s: &str) -> Result<TaskStatus> {
    match s {
        "open" => Ok(TaskStatus::Open),
        "pending_approval" => Ok(TaskStatus::PendingApproval),
        "in_progress" => Ok(TaskStatus::InProgress),
        "helper_arrived" => Ok(TaskStatus::HelperArrived),
        "task_started" => Ok(TaskStatus::TaskStarted),
        "pending_verification" => Ok(TaskStatus::PendingVerification),
        "completed" => Ok(TaskStatus::Completed),
        "cancelled" => Ok(TaskStatus::Cancelled),
        "disputed" => Ok(TaskStatus::Disputed),
        other => Err(AppError::Db(format!("invalid task status: {other}"))),
    }
}

impl TaskRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new task record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn create(&self, task: &Task) -> Result<Task> {
        let additional_helpers = serde_json::to_string(&task.additional_helpers)
            .map_err(|err| AppError::Db(format!("serialize additional_helpers: {err}")))?;

        sqlx::query(
            "INSERT INTO task (id, requester_id, title, description, category, urgency,
             latitude, longitude, address, city, status, assigned_helper, additional_helpers,
             max_helpers, scheduled_for, estimated_duration_minutes, started_at, completed_at,
             completion_otp, otp_generated_at, hide_sensitive_details, points_reward,
             cancelled_by, cancellation_reason, dispute_reason, application_count,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
             ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)",
        )
        .bind(&task.id)
        .bind(&task.requester_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(category_str(task.category))
        .bind(urgency_str(task.urgency))
        .bind(task.latitude)
        .bind(task.longitude)
        .bind(&task.address)
        .bind(&task.city)
        .bind(task.status.as_str())
        .bind(&task.assigned_helper)
        .bind(&additional_helpers)
        .bind(i64::from(task.max_helpers))
        .bind(task.scheduled_for.map(|dt| dt.to_rfc3339()))
        .bind(task.estimated_duration_minutes.map(i64::from))
        .bind(task.started_at.map(|dt| dt.to_rfc3339()))
        .bind(task.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(&task.completion_otp)
        .bind(task.otp_generated_at.map(|dt| dt.to_rfc3339()))
        .bind(i64::from(task.hide_sensitive_details))
        .bind(i64::from(task.points_reward))
        .bind(&task.cancelled_by)
        .bind(&task.cancellation_reason)
        .bind(&task.dispute_reason)
        .bind(task.application_count)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(task.clone())
    }

    /// Retrieve a task by identifier.
    ///
    /// Returns `Ok(None)` if the task does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM task WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(TaskRow::into_task).transpose()
    }

    /// Retrieve a task, failing with `NotFound` if absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task does not exist, or
    /// `AppError::Db` if the query fails.
    pub async fn require(&self, id: &str) -> Result<Task> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task {id} not found")))
    }

    /// List tasks owned by a requester, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_requester(
        &self,
        requester_id: &str,
        status: Option<TaskStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = if let Some(status) = status {
            sqlx::query_as(
                "SELECT * FROM task WHERE requester_id = ?1 AND status = ?2
                 ORDER BY created_at DESC LIMIT ?3 OFFSET ?4",
            )
            .bind(requester_id)
            .bind(status.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(self.db.as_ref())
            .await?
        } else {
            sqlx::query_as(
                "SELECT * FROM task WHERE requester_id = ?1
                 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            )
            .bind(requester_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.db.as_ref())
            .await?
        };

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// List tasks where the user occupies a helper slot, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_helping(
        &self,
        helper_id: &str,
        status: Option<TaskStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>> {
        let membership = "(assigned_helper = ?1 OR EXISTS \
             (SELECT 1 FROM json_each(task.additional_helpers) WHERE json_each.value = ?1))";
        let rows: Vec<TaskRow> = if let Some(status) = status {
            sqlx::query_as(&format!(
                "SELECT * FROM task WHERE {membership} AND status = ?2
                 ORDER BY created_at DESC LIMIT ?3 OFFSET ?4"
            ))
            .bind(helper_id)
            .bind(status.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(self.db.as_ref())
            .await?
        } else {
            sqlx::query_as(&format!(
                "SELECT * FROM task WHERE {membership}
                 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
            ))
            .bind(helper_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.db.as_ref())
            .await?
        };

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// List all open tasks not owned by `exclude_user_id`.
    ///
    /// The geospatial radius filter is applied by the matching engine;
    /// this query only narrows by status and ownership.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_open_excluding(&self, exclude_user_id: &str) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM task WHERE status = 'open' AND requester_id != ?1",
        )
        .bind(exclude_user_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// List open tasks at the two highest urgency tiers.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_open_urgent(&self) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM task WHERE status = 'open' AND urgency IN ('urgent','sos')",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Update the caller-editable fields of an open task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_details(&self, task: &Task) -> Result<()> {
        sqlx::query(
            "UPDATE task SET title = ?1, description = ?2, category = ?3, urgency = ?4,
             latitude = ?5, longitude = ?6, address = ?7, city = ?8, scheduled_for = ?9,
             estimated_duration_minutes = ?10, max_helpers = ?11, hide_sensitive_details = ?12,
             points_reward = ?13, updated_at = ?14
             WHERE id = ?15",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(category_str(task.category))
        .bind(urgency_str(task.urgency))
        .bind(task.latitude)
        .bind(task.longitude)
        .bind(&task.address)
        .bind(&task.city)
        .bind(task.scheduled_for.map(|dt| dt.to_rfc3339()))
        .bind(task.estimated_duration_minutes.map(i64::from))
        .bind(i64::from(task.max_helpers))
        .bind(i64::from(task.hide_sensitive_details))
        .bind(i64::from(task.points_reward))
        .bind(Utc::now().to_rfc3339())
        .bind(&task.id)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Conditionally move a task from `from` to `to`.
    ///
    /// Stamps `started_at` when entering `in_progress`. Returns `false`
    /// when the task was no longer in `from` — the caller lost a race
    /// and should re-read.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn transition_guarded(
        &self,
        id: &str,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = if to == TaskStatus::InProgress {
            sqlx::query(
                "UPDATE task SET status = ?1, started_at = ?2, updated_at = ?2
                 WHERE id = ?3 AND status = ?4",
            )
            .bind(to.as_str())
            .bind(&now)
            .bind(id)
            .bind(from.as_str())
            .execute(self.db.as_ref())
            .await?
        } else {
            sqlx::query(
                "UPDATE task SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            )
            .bind(to.as_str())
            .bind(&now)
            .bind(id)
            .bind(from.as_str())
            .execute(self.db.as_ref())
            .await?
        };

        Ok(result.rows_affected() == 1)
    }

    /// Atomically claim the primary helper slot of an open task.
    ///
    /// Returns `false` if the slot was already taken or the task left
    /// `open` — exactly one of two concurrent approvals can win this.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn assign_primary_guarded(&self, id: &str, helper_id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE task SET assigned_helper = ?1, status = 'pending_approval', updated_at = ?2
             WHERE id = ?3 AND status = 'open' AND assigned_helper IS NULL",
        )
        .bind(helper_id)
        .bind(&now)
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Append an additional helper, guarded by the slot limit.
    ///
    /// `updated_at` doubles as an optimistic concurrency token: the
    /// write only lands if the row is unchanged since `task` was read.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn add_additional_helper_guarded(
        &self,
        task: &Task,
        helper_id: &str,
    ) -> Result<bool> {
        let mut helpers = task.additional_helpers.clone();
        helpers.push(helper_id.to_owned());
        let helpers_json = serde_json::to_string(&helpers)
            .map_err(|err| AppError::Db(format!("serialize additional_helpers: {err}")))?;

        let result = sqlx::query(
            "UPDATE task SET additional_helpers = ?1, updated_at = ?2
             WHERE id = ?3 AND updated_at = ?4",
        )
        .bind(&helpers_json)
        .bind(Utc::now().to_rfc3339())
        .bind(&task.id)
        .bind(task.updated_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Reopen a task from `pending_approval`, clearing all helper slots.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn reopen_guarded(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE task SET status = 'open', assigned_helper = NULL,
             additional_helpers = '[]', updated_at = ?1
             WHERE id = ?2 AND status = 'pending_approval'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Cancel a task while it is still cancellable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn cancel_guarded(
        &self,
        id: &str,
        cancelled_by: &str,
        reason: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE task SET status = 'cancelled', cancelled_by = ?1,
             cancellation_reason = ?2, updated_at = ?3
             WHERE id = ?4 AND status IN ('open','pending_approval','in_progress')",
        )
        .bind(cancelled_by)
        .bind(reason)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Mark a task disputed while it is in a disputable state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn dispute_guarded(&self, id: &str, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE task SET status = 'disputed', dispute_reason = ?1, updated_at = ?2
             WHERE id = ?3 AND status IN
             ('in_progress','helper_arrived','task_started','pending_verification','completed')",
        )
        .bind(reason)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Store a freshly generated completion code, optionally moving the
    /// task into `pending_verification`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn set_completion_otp(
        &self,
        id: &str,
        code: &str,
        advance_status: bool,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        if advance_status {
            sqlx::query(
                "UPDATE task SET completion_otp = ?1, otp_generated_at = ?2,
                 status = 'pending_verification', updated_at = ?2 WHERE id = ?3",
            )
            .bind(code)
            .bind(&now)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        } else {
            sqlx::query(
                "UPDATE task SET completion_otp = ?1, otp_generated_at = ?2, updated_at = ?2
                 WHERE id = ?3",
            )
            .bind(code)
            .bind(&now)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        }
        Ok(())
    }

    /// Finalize a verified task: `completed` status, completion stamp,
    /// transient OTP columns cleared.
    ///
    /// Returns `false` if the task was not in `pending_verification`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn finalize_completion(&self, id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE task SET status = 'completed', completed_at = ?1,
             completion_otp = NULL, otp_generated_at = NULL, updated_at = ?1
             WHERE id = ?2 AND status = 'pending_verification'",
        )
        .bind(&now)
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Adjust the denormalized application counter.
    ///
    /// Best-effort display value; never consulted for slot checks.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn bump_application_count(&self, id: &str, delta: i64) -> Result<()> {
        sqlx::query(
            "UPDATE task SET application_count = MAX(application_count + ?1, 0)
             WHERE id = ?2",
        )
        .bind(delta)
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }
}
