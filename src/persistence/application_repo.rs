//! Help-request application repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::Utc;

use crate::models::application::{Application, ApplicationStatus};
use crate::{AppError, Result};

use super::db::Database;
use super::{parse_timestamp, parse_timestamp_opt};

/// Repository wrapper around `SQLite` for application records.
#[derive(Clone)]
pub struct ApplicationRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: String,
    task_id: String,
    helper_id: String,
    status: String,
    message: String,
    helper_latitude: Option<f64>,
    helper_longitude: Option<f64>,
    distance_km: Option<f64>,
    eta_minutes: Option<i64>,
    rejection_reason: Option<String>,
    requested_at: String,
    responded_at: Option<String>,
}

impl ApplicationRow {
    /// Convert a database row into the domain model.
    fn into_application(self) -> Result<Application> {
        let status = parse_application_status(&self.status)?;

        Ok(Application {
            id: self.id,
            task_id: self.task_id,
            helper_id: self.helper_id,
            status,
            message: self.message,
            helper_latitude: self.helper_latitude,
            helper_longitude: self.helper_longitude,
            distance_km: self.distance_km,
            eta_minutes: self
                .eta_minutes
                .map(|v| u32::try_from(v).map_err(|_| AppError::Db("invalid eta".into())))
                .transpose()?,
            rejection_reason: self.rejection_reason,
            requested_at: parse_timestamp(&self.requested_at, "requested_at")?,
            responded_at: parse_timestamp_opt(self.responded_at.as_deref(), "responded_at")?,
        })
    }
}

pub(crate) fn parse_application_status(s: &str) -> Result<ApplicationStatus> {
    match s {
        "pending" => Ok(ApplicationStatus::Pending),
        "approved" => Ok(ApplicationStatus::Approved),
        "rejected" => Ok(ApplicationStatus::Rejected),
        "cancelled" => Ok(ApplicationStatus::Cancelled),
        other => Err(AppError::Db(format!("invalid application status: {other}"))),
    }
}

impl ApplicationRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new application record.
    ///
    /// The partial unique index on `(task_id, helper_id)` turns a
    /// concurrent duplicate into `AppError::Conflict`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` if an active application already
    /// exists for the pair, or `AppError::Db` on other failures.
    pub async fn create(&self, application: &Application) -> Result<Application> {
        sqlx::query(
            "INSERT INTO help_request (id, task_id, helper_id, status, message,
             helper_latitude, helper_longitude, distance_km, eta_minutes, rejection_reason,
             requested_at, responded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&application.id)
        .bind(&application.task_id)
        .bind(&application.helper_id)
        .bind(application.status.as_str())
        .bind(&application.message)
        .bind(application.helper_latitude)
        .bind(application.helper_longitude)
        .bind(application.distance_km)
        .bind(application.eta_minutes.map(i64::from))
        .bind(&application.rejection_reason)
        .bind(application.requested_at.to_rfc3339())
        .bind(application.responded_at.map(|dt| dt.to_rfc3339()))
        .execute(self.db.as_ref())
        .await?;

        Ok(application.clone())
    }

    /// Retrieve an application by identifier.
    ///
    /// Returns `Ok(None)` if the record does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Application>> {
        let row: Option<ApplicationRow> =
            sqlx::query_as("SELECT * FROM help_request WHERE id = ?1")
                .bind(id)
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map(ApplicationRow::into_application).transpose()
    }

    /// Retrieve an application, failing with `NotFound` if absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the record does not exist, or
    /// `AppError::Db` if the query fails.
    pub async fn require(&self, id: &str) -> Result<Application> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("application {id} not found")))
    }

    /// List all applications for a task, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_task(&self, task_id: &str) -> Result<Vec<Application>> {
        let rows: Vec<ApplicationRow> = sqlx::query_as(
            "SELECT * FROM help_request WHERE task_id = ?1 ORDER BY requested_at DESC",
        )
        .bind(task_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter()
            .map(ApplicationRow::into_application)
            .collect()
    }

    /// List a helper's applications, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_helper(
        &self,
        helper_id: &str,
        status: Option<ApplicationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Application>> {
        let rows: Vec<ApplicationRow> = if let Some(status) = status {
            sqlx::query_as(
                "SELECT * FROM help_request WHERE helper_id = ?1 AND status = ?2
                 ORDER BY requested_at DESC LIMIT ?3 OFFSET ?4",
            )
            .bind(helper_id)
            .bind(status.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(self.db.as_ref())
            .await?
        } else {
            sqlx::query_as(
                "SELECT * FROM help_request WHERE helper_id = ?1
                 ORDER BY requested_at DESC LIMIT ?2 OFFSET ?3",
            )
            .bind(helper_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.db.as_ref())
            .await?
        };

        rows.into_iter()
            .map(ApplicationRow::into_application)
            .collect()
    }

    /// Conditionally move a pending application to a decided status.
    ///
    /// Returns `false` when the application already left `pending` —
    /// the caller lost a race or the decision was made elsewhere.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn decide_pending_guarded(
        &self,
        id: &str,
        to: ApplicationStatus,
        rejection_reason: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE help_request SET status = ?1, responded_at = ?2, rejection_reason = ?3
             WHERE id = ?4 AND status = 'pending'",
        )
        .bind(to.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(rejection_reason)
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Reject every still-pending application for a task except `keep_id`.
    ///
    /// Runs as a single bulk update so an approval and its cascade are
    /// not interleaved with another decision on the same rows. Returns
    /// the rejected applications for notification fan-out.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn reject_other_pending(
        &self,
        task_id: &str,
        keep_id: &str,
    ) -> Result<Vec<Application>> {
        let rows: Vec<ApplicationRow> = sqlx::query_as(
            "UPDATE help_request SET status = 'rejected', responded_at = ?1
             WHERE task_id = ?2 AND id != ?3 AND status = 'pending'
             RETURNING *",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(task_id)
        .bind(keep_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter()
            .map(ApplicationRow::into_application)
            .collect()
    }

    /// Reject every still-pending application for a task (cancellation
    /// cascade). Returns the rejected applications.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn reject_all_pending(&self, task_id: &str) -> Result<Vec<Application>> {
        let rows: Vec<ApplicationRow> = sqlx::query_as(
            "UPDATE help_request SET status = 'rejected', responded_at = ?1
             WHERE task_id = ?2 AND status = 'pending'
             RETURNING *",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(task_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter()
            .map(ApplicationRow::into_application)
            .collect()
    }

    /// Mark approved applications for a task as rejected (reopen path).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn reject_approved_for_task(&self, task_id: &str) -> Result<Vec<Application>> {
        let rows: Vec<ApplicationRow> = sqlx::query_as(
            "UPDATE help_request SET status = 'rejected', responded_at = ?1
             WHERE task_id = ?2 AND status = 'approved'
             RETURNING *",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(task_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter()
            .map(ApplicationRow::into_application)
            .collect()
    }

    /// Persist a refreshed helper location with recomputed distance/ETA.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_location(
        &self,
        id: &str,
        latitude: f64,
        longitude: f64,
        distance_km: f64,
        eta_minutes: u32,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE help_request SET helper_latitude = ?1, helper_longitude = ?2,
             distance_km = ?3, eta_minutes = ?4 WHERE id = ?5",
        )
        .bind(latitude)
        .bind(longitude)
        .bind(distance_km)
        .bind(i64::from(eta_minutes))
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }
}
