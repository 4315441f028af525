//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS` — safe to
//! re-run on every server startup. Produces a convergent result.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// Creates all six tables idempotently. Safe to call on every startup.
///
/// The partial unique index on `help_request` is the storage-level
/// enforcement of the one-active-application-per-(task, helper) rule;
/// concurrent duplicate applies lose here, not in application code.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS task (
    id                  TEXT PRIMARY KEY NOT NULL,
    requester_id        TEXT NOT NULL,
    title               TEXT NOT NULL,
    description         TEXT NOT NULL,
    category            TEXT NOT NULL CHECK(category IN ('elderly_assistance','disability_support','medical','errands','home_help','transport','tech_help','other')),
    urgency             TEXT NOT NULL CHECK(urgency IN ('normal','urgent','sos')),
    latitude            REAL NOT NULL,
    longitude           REAL NOT NULL,
    address             TEXT NOT NULL,
    city                TEXT,
    status              TEXT NOT NULL CHECK(status IN ('open','pending_approval','in_progress','helper_arrived','task_started','pending_verification','completed','cancelled','disputed')),
    assigned_helper     TEXT,
    additional_helpers  TEXT NOT NULL DEFAULT '[]',
    max_helpers         INTEGER NOT NULL DEFAULT 1,
    scheduled_for       TEXT,
    estimated_duration_minutes INTEGER,
    started_at          TEXT,
    completed_at        TEXT,
    completion_otp      TEXT,
    otp_generated_at    TEXT,
    hide_sensitive_details INTEGER NOT NULL DEFAULT 0,
    points_reward       INTEGER NOT NULL,
    cancelled_by        TEXT,
    cancellation_reason TEXT,
    dispute_reason      TEXT,
    application_count   INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS help_request (
    id                  TEXT PRIMARY KEY NOT NULL,
    task_id             TEXT NOT NULL,
    helper_id           TEXT NOT NULL,
    status              TEXT NOT NULL CHECK(status IN ('pending','approved','rejected','cancelled')),
    message             TEXT NOT NULL,
    helper_latitude     REAL,
    helper_longitude    REAL,
    distance_km         REAL,
    eta_minutes         INTEGER,
    rejection_reason    TEXT,
    requested_at        TEXT NOT NULL,
    responded_at        TEXT
);

CREATE TABLE IF NOT EXISTS otp (
    id                  TEXT PRIMARY KEY NOT NULL,
    subject_kind        TEXT NOT NULL CHECK(subject_kind IN ('phone','email','task')),
    subject_value       TEXT NOT NULL,
    purpose             TEXT NOT NULL CHECK(purpose IN ('phone_verification','email_verification','task_completion','password_reset')),
    code                TEXT NOT NULL,
    verified            INTEGER NOT NULL DEFAULT 0,
    verified_at         TEXT,
    attempts            INTEGER NOT NULL DEFAULT 0,
    max_attempts        INTEGER NOT NULL DEFAULT 5,
    created_at          TEXT NOT NULL,
    expires_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_account (
    id                  TEXT PRIMARY KEY NOT NULL,
    username            TEXT NOT NULL,
    role_preference     TEXT NOT NULL CHECK(role_preference IN ('requester','helper','both')),
    is_guest            INTEGER NOT NULL DEFAULT 0,
    phone_verified      INTEGER NOT NULL DEFAULT 0,
    id_verified         INTEGER NOT NULL DEFAULT 0,
    latitude            REAL,
    longitude           REAL,
    location_updated_at TEXT,
    points              INTEGER NOT NULL DEFAULT 0,
    tasks_helped        INTEGER NOT NULL DEFAULT 0,
    tasks_requested     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS chat_message (
    id                  TEXT PRIMARY KEY NOT NULL,
    task_id             TEXT NOT NULL,
    sender_id           TEXT NOT NULL,
    receiver_id         TEXT NOT NULL,
    content             TEXT NOT NULL,
    read                INTEGER NOT NULL DEFAULT 0,
    read_at             TEXT,
    created_at          TEXT NOT NULL,
    expires_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notification (
    id                  TEXT PRIMARY KEY NOT NULL,
    user_id             TEXT NOT NULL,
    kind                TEXT NOT NULL CHECK(kind IN ('help_request','helper_approved','helper_rejected','task_update','task_cancelled','chat_message','urgent_nearby')),
    title               TEXT NOT NULL,
    body                TEXT NOT NULL,
    task_id             TEXT,
    application_id      TEXT,
    message_id          TEXT,
    read                INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_help_request_active
    ON help_request(task_id, helper_id)
    WHERE status IN ('pending','approved');

CREATE INDEX IF NOT EXISTS idx_task_status ON task(status, created_at);
CREATE INDEX IF NOT EXISTS idx_task_requester ON task(requester_id, status);
CREATE INDEX IF NOT EXISTS idx_task_helper ON task(assigned_helper, status);
CREATE INDEX IF NOT EXISTS idx_task_urgency ON task(urgency, status);
CREATE INDEX IF NOT EXISTS idx_help_request_task ON help_request(task_id, status);
CREATE INDEX IF NOT EXISTS idx_help_request_helper ON help_request(helper_id, status);
CREATE INDEX IF NOT EXISTS idx_otp_subject ON otp(subject_kind, subject_value, purpose, verified);
CREATE INDEX IF NOT EXISTS idx_message_task ON chat_message(task_id, created_at);
CREATE INDEX IF NOT EXISTS idx_message_receiver ON chat_message(receiver_id, read);
CREATE INDEX IF NOT EXISTS idx_notification_user ON notification(user_id, read, created_at);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
