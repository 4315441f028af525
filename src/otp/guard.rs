//! OTP guard: supersede-on-create issuance and fail-closed verification.

use std::sync::Arc;

use rand::Rng;
use tracing::info;

use crate::config::OtpConfig;
use crate::models::otp::{OtpPurpose, OtpRecord, OtpSubject};
use crate::persistence::db::Database;
use crate::persistence::otp_repo::OtpRepo;
use crate::{AppError, Result};

/// Issues and validates short-lived numeric codes bound to a subject.
#[derive(Clone)]
pub struct OtpGuard {
    repo: OtpRepo,
    config: OtpConfig,
}

impl OtpGuard {
    /// Create a new guard over the shared database.
    #[must_use]
    pub fn new(db: Arc<Database>, config: OtpConfig) -> Self {
        Self {
            repo: OtpRepo::new(db),
            config,
        }
    }

    /// Generate a fixed-length numeric code.
    fn generate_code(&self) -> String {
        let low = 10u64.pow(self.config.code_length - 1);
        let high = 10u64.pow(self.config.code_length);
        rand::thread_rng().gen_range(low..high).to_string()
    }

    /// Issue a fresh code for `(subject, purpose)`, invalidating any
    /// prior active record by expiring it immediately.
    ///
    /// The caller decides the delivery channel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if persistence fails.
    pub async fn create(
        &self,
        subject: &OtpSubject,
        purpose: OtpPurpose,
        ttl_minutes: i64,
    ) -> Result<OtpRecord> {
        let superseded = self.repo.expire_active(subject, purpose).await?;
        if superseded > 0 {
            info!(superseded, "superseded prior active codes");
        }

        let code = self.generate_code();
        let record = OtpRecord::new(
            subject,
            purpose,
            code,
            ttl_minutes,
            self.config.max_attempts,
        );
        self.repo.create(&record).await
    }

    /// Verify `candidate` against the most recent active record for
    /// `(subject, purpose)`.
    ///
    /// Fails closed: expiry and attempt exhaustion are checked before
    /// the code comparison, and the verified flag is set with a
    /// conditional update so concurrent verifications cannot both
    /// succeed.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` — no code was ever issued (or all were purged).
    /// - `AppError::AlreadyUsed` — the code was verified before.
    /// - `AppError::Expired` — past the record's TTL.
    /// - `AppError::AttemptsExceeded` — too many wrong guesses.
    /// - `AppError::OtpMismatch` — wrong code, attempts remain.
    /// - `AppError::Db` — persistence failure.
    pub async fn verify(
        &self,
        subject: &OtpSubject,
        purpose: OtpPurpose,
        candidate: &str,
    ) -> Result<OtpRecord> {
        let Some(record) = self.repo.latest_unverified(subject, purpose).await? else {
            // Distinguish a consumed code from one that never existed.
            if self.repo.latest_verified(subject, purpose).await?.is_some() {
                return Err(AppError::AlreadyUsed("code was already used".into()));
            }
            return Err(AppError::NotFound("no code issued".into()));
        };

        let now = chrono::Utc::now();
        if now > record.expires_at {
            return Err(AppError::Expired("code has expired".into()));
        }
        if record.attempts >= record.max_attempts {
            return Err(AppError::AttemptsExceeded(
                "maximum attempts exceeded".into(),
            ));
        }

        let Some(attempts) = self.repo.consume_attempt(&record.id).await? else {
            // Lost a race: another caller either verified the record or
            // burned the last attempt between our read and the update.
            if self.repo.latest_verified(subject, purpose).await?.is_some() {
                return Err(AppError::AlreadyUsed("code was already used".into()));
            }
            return Err(AppError::AttemptsExceeded(
                "maximum attempts exceeded".into(),
            ));
        };

        if record.code != candidate {
            return Err(AppError::OtpMismatch {
                attempts_remaining: record.max_attempts.saturating_sub(attempts),
            });
        }

        if !self.repo.mark_verified(&record.id).await? {
            return Err(AppError::AlreadyUsed("code was already used".into()));
        }

        info!("code verified");
        self.repo
            .latest_verified(subject, purpose)
            .await?
            .ok_or_else(|| AppError::Db("verified record vanished".into()))
    }

    /// Default TTL in minutes for a purpose.
    ///
    /// Task-completion codes have their own fixed window, independent
    /// of the contact-verification TTL.
    #[must_use]
    pub fn ttl_minutes_for(&self, purpose: OtpPurpose) -> i64 {
        match purpose {
            OtpPurpose::TaskCompletion => self.config.task_completion_ttl_minutes,
            OtpPurpose::PhoneVerification
            | OtpPurpose::EmailVerification
            | OtpPurpose::PasswordReset => self.config.contact_ttl_minutes,
        }
    }
}
