//! One-time-code record model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the code proves.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    /// Confirming ownership of a phone number.
    PhoneVerification,
    /// Confirming ownership of an email address.
    EmailVerification,
    /// Proving in-person task completion.
    TaskCompletion,
    /// Resetting a forgotten password.
    PasswordReset,
}

impl OtpPurpose {
    /// Stable wire/storage name for the purpose.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhoneVerification => "phone_verification",
            Self::EmailVerification => "email_verification",
            Self::TaskCompletion => "task_completion",
            Self::PasswordReset => "password_reset",
        }
    }
}

/// What the code is bound to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum OtpSubject {
    /// A phone number.
    Phone(String),
    /// An email address.
    Email(String),
    /// A task awaiting completion proof.
    Task(String),
}

impl OtpSubject {
    /// Storage discriminant for the subject kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Phone(_) => "phone",
            Self::Email(_) => "email",
            Self::Task(_) => "task",
        }
    }

    /// The bound value (number, address, or task id).
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Phone(v) | Self::Email(v) | Self::Task(v) => v,
        }
    }
}

/// A short-lived proof code bound to a subject and purpose.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct OtpRecord {
    /// Unique record identifier.
    pub id: String,
    /// Subject kind discriminant.
    pub subject_kind: String,
    /// Subject value.
    pub subject_value: String,
    /// What the code proves.
    pub purpose: OtpPurpose,
    /// The numeric code.
    pub code: String,
    /// Whether the code was successfully verified.
    pub verified: bool,
    /// When verification succeeded.
    pub verified_at: Option<DateTime<Utc>>,
    /// Failed/total verification attempts so far.
    pub attempts: u32,
    /// Attempts allowed before the record locks.
    pub max_attempts: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Hard expiry; the record is dead past this instant.
    pub expires_at: DateTime<Utc>,
}

impl OtpRecord {
    /// Construct an unverified record expiring `ttl_minutes` from now.
    #[must_use]
    pub fn new(
        subject: &OtpSubject,
        purpose: OtpPurpose,
        code: String,
        ttl_minutes: i64,
        max_attempts: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            subject_kind: subject.kind().to_owned(),
            subject_value: subject.value().to_owned(),
            purpose,
            code,
            verified: false,
            verified_at: None,
            attempts: 0,
            max_attempts,
            created_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
        }
    }

    /// Whether the record can still be verified at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.verified && now <= self.expires_at
    }
}
