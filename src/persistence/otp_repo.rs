//! OTP record repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::otp::{OtpPurpose, OtpRecord, OtpSubject};
use crate::{AppError, Result};

use super::db::Database;
use super::{parse_timestamp, parse_timestamp_opt};

/// Repository wrapper around `SQLite` for OTP records.
#[derive(Clone)]
pub struct OtpRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct OtpRow {
    id: String,
    subject_kind: String,
    subject_value: String,
    purpose: String,
    code: String,
    verified: i64,
    verified_at: Option<String>,
    attempts: i64,
    max_attempts: i64,
    created_at: String,
    expires_at: String,
}

impl OtpRow {
    /// Convert a database row into the domain model.
    fn into_record(self) -> Result<OtpRecord> {
        let purpose = parse_purpose(&self.purpose)?;

        Ok(OtpRecord {
            id: self.id,
            subject_kind: self.subject_kind,
            subject_value: self.subject_value,
            purpose,
            code: self.code,
            verified: self.verified != 0,
            verified_at: parse_timestamp_opt(self.verified_at.as_deref(), "verified_at")?,
            attempts: u32::try_from(self.attempts)
                .map_err(|_| AppError::Db("invalid attempts".into()))?,
            max_attempts: u32::try_from(self.max_attempts)
                .map_err(|_| AppError::Db("invalid max_attempts".into()))?,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
            expires_at: parse_timestamp(&self.expires_at, "expires_at")?,
        })
    }
}

fn parse_purpose(s: &str) -> Result<OtpPurpose> {
    match s {
        "phone_verification" => Ok(OtpPurpose::PhoneVerification),
        "email_verification" => Ok(OtpPurpose::EmailVerification),
        "task_completion" => Ok(OtpPurpose::TaskCompletion),
        "password_reset" => Ok(OtpPurpose::PasswordReset),
        other => Err(AppError::Db(format!("invalid otp purpose: {other}"))),
    }
}

impl OtpRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new OTP record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn create(&self, record: &OtpRecord) -> Result<OtpRecord> {
        sqlx::query(
            "INSERT INTO otp (id, subject_kind, subject_value, purpose, code, verified,
             verified_at, attempts, max_attempts, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&record.id)
        .bind(&record.subject_kind)
        .bind(&record.subject_value)
        .bind(record.purpose.as_str())
        .bind(&record.code)
        .bind(i64::from(record.verified))
        .bind(record.verified_at.map(|dt| dt.to_rfc3339()))
        .bind(i64::from(record.attempts))
        .bind(i64::from(record.max_attempts))
        .bind(record.created_at.to_rfc3339())
        .bind(record.expires_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(record.clone())
    }

    /// Expire all unverified records for a (subject, purpose) pair.
    ///
    /// Creating a fresh code calls this first so at most one active
    /// record exists per pair.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn expire_active(&self, subject: &OtpSubject, purpose: OtpPurpose) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE otp SET expires_at = ?1
             WHERE subject_kind = ?2 AND subject_value = ?3 AND purpose = ?4
             AND verified = 0 AND expires_at > ?1",
        )
        .bind(&now)
        .bind(subject.kind())
        .bind(subject.value())
        .bind(purpose.as_str())
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected())
    }

    /// The most recent unverified record for a (subject, purpose) pair.
    ///
    /// Expiry is deliberately not filtered here; the guard distinguishes
    /// `Expired` from `NotFound`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn latest_unverified(
        &self,
        subject: &OtpSubject,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpRecord>> {
        let row: Option<OtpRow> = sqlx::query_as(
            "SELECT * FROM otp
             WHERE subject_kind = ?1 AND subject_value = ?2 AND purpose = ?3 AND verified = 0
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(subject.kind())
        .bind(subject.value())
        .bind(purpose.as_str())
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(OtpRow::into_record).transpose()
    }

    /// The most recent verified record for a (subject, purpose) pair.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn latest_verified(
        &self,
        subject: &OtpSubject,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpRecord>> {
        let row: Option<OtpRow> = sqlx::query_as(
            "SELECT * FROM otp
             WHERE subject_kind = ?1 AND subject_value = ?2 AND purpose = ?3 AND verified = 1
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(subject.kind())
        .bind(subject.value())
        .bind(purpose.as_str())
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(OtpRow::into_record).transpose()
    }

    /// Atomically consume one verification attempt.
    ///
    /// Returns the attempt count after the increment, or `None` when no
    /// attempt was available (already verified, or attempts exhausted).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn consume_attempt(&self, id: &str) -> Result<Option<u32>> {
        let result = sqlx::query(
            "UPDATE otp SET attempts = attempts + 1
             WHERE id = ?1 AND verified = 0 AND attempts < max_attempts",
        )
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        if result.rows_affected() != 1 {
            return Ok(None);
        }

        let attempts: i64 = sqlx::query_scalar("SELECT attempts FROM otp WHERE id = ?1")
            .bind(id)
            .fetch_one(self.db.as_ref())
            .await?;

        Ok(Some(
            u32::try_from(attempts).map_err(|_| AppError::Db("invalid attempts".into()))?,
        ))
    }

    /// Atomically flip an unverified record to verified.
    ///
    /// The `WHERE verified = 0` guard makes the read-check-set a single
    /// unit: of two concurrent verifications, exactly one returns `true`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_verified(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE otp SET verified = 1, verified_at = ?1 WHERE id = ?2 AND verified = 0",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Purge records that expired before `before`.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM otp WHERE expires_at < ?1")
            .bind(before.to_rfc3339())
            .execute(self.db.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}
