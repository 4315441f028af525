//! User directory repository for `SQLite` persistence.
//!
//! The user service proper (authentication, profiles) is external; this
//! repo reads the directory slice the core needs and writes back only
//! stat credits and location refreshes.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::geo::Point;
use crate::models::user::{RolePreference, UserAccount};
use crate::{AppError, Result};

use super::db::Database;
use super::parse_timestamp_opt;

/// Repository wrapper around `SQLite` for user directory records.
#[derive(Clone)]
pub struct UserRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    role_preference: String,
    is_guest: i64,
    phone_verified: i64,
    id_verified: i64,
    latitude: Option<f64>,
    longitude: Option<f64>,
    location_updated_at: Option<String>,
    points: i64,
    tasks_helped: i64,
    tasks_requested: i64,
}

impl UserRow {
    /// Convert a database row into the domain model.
    fn into_user(self) -> Result<UserAccount> {
        let role_preference = parse_role(&self.role_preference)?;

        Ok(UserAccount {
            id: self.id,
            username: self.username,
            role_preference,
            is_guest: self.is_guest != 0,
            phone_verified: self.phone_verified != 0,
            id_verified: self.id_verified != 0,
            latitude: self.latitude,
            longitude: self.longitude,
            location_updated_at: parse_timestamp_opt(
                self.location_updated_at.as_deref(),
                "location_updated_at",
            )?,
            points: self.points,
            tasks_helped: self.tasks_helped,
            tasks_requested: self.tasks_requested,
        })
    }
}

fn parse_role(s: &str) -> Result<RolePreference> {
    match s {
        "requester" => Ok(RolePreference::Requester),
        "helper" => Ok(RolePreference::Helper),
        "both" => Ok(RolePreference::Both),
        other => Err(AppError::Db(format!("invalid role_preference: {other}"))),
    }
}

impl UserRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a directory record (seed/sync path).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn create(&self, user: &UserAccount) -> Result<UserAccount> {
        sqlx::query(
            "INSERT INTO user_account (id, username, role_preference, is_guest,
             phone_verified, id_verified, latitude, longitude, location_updated_at,
             points, tasks_helped, tasks_requested)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(user.role_preference.as_str())
        .bind(i64::from(user.is_guest))
        .bind(i64::from(user.phone_verified))
        .bind(i64::from(user.id_verified))
        .bind(user.latitude)
        .bind(user.longitude)
        .bind(user.location_updated_at.map(|dt| dt.to_rfc3339()))
        .bind(user.points)
        .bind(user.tasks_helped)
        .bind(user.tasks_requested)
        .execute(self.db.as_ref())
        .await?;

        Ok(user.clone())
    }

    /// Retrieve a user by identifier.
    ///
    /// Returns `Ok(None)` if the user does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<UserAccount>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM user_account WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(UserRow::into_user).transpose()
    }

    /// Retrieve a user, failing with `NotFound` if absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the user does not exist, or
    /// `AppError::Db` if the query fails.
    pub async fn require(&self, id: &str) -> Result<UserAccount> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
    }

    /// Credit a helper for a completed task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn credit_completion(&self, id: &str, points: u32) -> Result<()> {
        sqlx::query(
            "UPDATE user_account SET points = points + ?1, tasks_helped = tasks_helped + 1
             WHERE id = ?2",
        )
        .bind(i64::from(points))
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Count a newly posted task against the requester's stats.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn increment_tasks_requested(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE user_account SET tasks_requested = tasks_requested + 1 WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Refresh a user's last known location.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_location(&self, id: &str, location: Point) -> Result<()> {
        sqlx::query(
            "UPDATE user_account SET latitude = ?1, longitude = ?2, location_updated_at = ?3
             WHERE id = ?4",
        )
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Helpers with a location refreshed at or after `since`.
    ///
    /// Guests never match; role preference must allow helping.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_active_helpers(&self, since: DateTime<Utc>) -> Result<Vec<UserAccount>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT * FROM user_account
             WHERE role_preference IN ('helper','both') AND is_guest = 0
             AND latitude IS NOT NULL AND longitude IS NOT NULL
             AND location_updated_at >= ?1",
        )
        .bind(since.to_rfc3339())
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(UserRow::into_user).collect()
    }
}
