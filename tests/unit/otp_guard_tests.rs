//! Unit tests for the OTP guard.
//!
//! Validates:
//! - Create-then-verify round trip succeeds exactly once
//! - Reuse of a consumed code fails `AlreadyUsed`
//! - Expiry and attempt exhaustion fail closed
//! - A fresh code supersedes the prior active one

use std::sync::Arc;

use nearhand::config::OtpConfig;
use nearhand::models::otp::{OtpPurpose, OtpSubject};
use nearhand::otp::OtpGuard;
use nearhand::persistence::db;
use nearhand::AppError;

async fn guard() -> OtpGuard {
    let database = Arc::new(db::connect_memory().await.expect("db"));
    OtpGuard::new(database, OtpConfig::default())
}

fn task_subject(id: &str) -> OtpSubject {
    OtpSubject::Task(id.to_owned())
}

#[tokio::test]
async fn round_trip_succeeds_exactly_once() {
    let guard = guard().await;
    let subject = task_subject("task-1");

    let record = guard
        .create(&subject, OtpPurpose::TaskCompletion, 30)
        .await
        .expect("create");
    assert_eq!(record.code.len(), 6);
    assert!(record.code.chars().all(|c| c.is_ascii_digit()));

    let verified = guard
        .verify(&subject, OtpPurpose::TaskCompletion, &record.code)
        .await
        .expect("verify");
    assert!(verified.verified);
    assert!(verified.verified_at.is_some());

    // The same code cannot be consumed twice.
    let again = guard
        .verify(&subject, OtpPurpose::TaskCompletion, &record.code)
        .await;
    assert!(matches!(again, Err(AppError::AlreadyUsed(_))));
}

#[tokio::test]
async fn verify_without_issuance_is_not_found() {
    let guard = guard().await;
    let result = guard
        .verify(&task_subject("task-1"), OtpPurpose::TaskCompletion, "123456")
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn expired_code_fails_closed() {
    let guard = guard().await;
    let subject = task_subject("task-1");

    // Negative TTL puts the expiry in the past.
    let record = guard
        .create(&subject, OtpPurpose::TaskCompletion, -1)
        .await
        .expect("create");

    let result = guard
        .verify(&subject, OtpPurpose::TaskCompletion, &record.code)
        .await;
    assert!(matches!(result, Err(AppError::Expired(_))));
}

#[tokio::test]
async fn wrong_code_reports_attempts_remaining() {
    let guard = guard().await;
    let subject = task_subject("task-1");
    guard
        .create(&subject, OtpPurpose::TaskCompletion, 30)
        .await
        .expect("create");

    let result = guard
        .verify(&subject, OtpPurpose::TaskCompletion, "000000")
        .await;
    match result {
        Err(AppError::OtpMismatch { attempts_remaining }) => {
            assert_eq!(attempts_remaining, 4);
        }
        other => panic!("expected mismatch, got {other:?}"),
    }

    let result = guard
        .verify(&subject, OtpPurpose::TaskCompletion, "000000")
        .await;
    match result {
        Err(AppError::OtpMismatch { attempts_remaining }) => {
            assert_eq!(attempts_remaining, 3);
        }
        other => panic!("expected mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn attempts_exhaustion_locks_out_the_correct_code() {
    let guard = guard().await;
    let subject = task_subject("task-1");
    let record = guard
        .create(&subject, OtpPurpose::TaskCompletion, 30)
        .await
        .expect("create");

    for _ in 0..5 {
        let result = guard
            .verify(&subject, OtpPurpose::TaskCompletion, "000000")
            .await;
        assert!(matches!(
            result,
            Err(AppError::OtpMismatch { .. }) | Err(AppError::AttemptsExceeded(_))
        ));
    }

    // Even the correct code is refused once attempts are spent.
    let result = guard
        .verify(&subject, OtpPurpose::TaskCompletion, &record.code)
        .await;
    assert!(matches!(result, Err(AppError::AttemptsExceeded(_))));
}

#[tokio::test]
async fn fresh_code_supersedes_the_active_one() {
    let guard = guard().await;
    let subject = task_subject("task-1");

    let first = guard
        .create(&subject, OtpPurpose::TaskCompletion, 30)
        .await
        .expect("first");
    let second = guard
        .create(&subject, OtpPurpose::TaskCompletion, 30)
        .await
        .expect("second");
    assert_ne!(first.id, second.id);

    // The second code verifies; the first is dead even if it happens
    // to differ from the second only in value.
    let verified = guard
        .verify(&subject, OtpPurpose::TaskCompletion, &second.code)
        .await
        .expect("verify");
    assert_eq!(verified.id, second.id);
}

#[tokio::test]
async fn purposes_are_isolated_per_subject() {
    let guard = guard().await;
    let phone = OtpSubject::Phone("+15550100".to_owned());

    let phone_code = guard
        .create(&phone, OtpPurpose::PhoneVerification, 10)
        .await
        .expect("phone");
    let task_code = guard
        .create(&task_subject("task-1"), OtpPurpose::TaskCompletion, 30)
        .await
        .expect("task");

    // Verifying the task code does not consume the phone code.
    guard
        .verify(
            &task_subject("task-1"),
            OtpPurpose::TaskCompletion,
            &task_code.code,
        )
        .await
        .expect("task verify");

    guard
        .verify(&phone, OtpPurpose::PhoneVerification, &phone_code.code)
        .await
        .expect("phone verify");
}

#[tokio::test]
async fn ttl_lookup_distinguishes_completion_from_contact() {
    let database = Arc::new(db::connect_memory().await.expect("db"));
    let guard = OtpGuard::new(database, OtpConfig::default());

    assert_eq!(guard.ttl_minutes_for(OtpPurpose::TaskCompletion), 30);
    assert_eq!(guard.ttl_minutes_for(OtpPurpose::PhoneVerification), 10);
    assert_eq!(guard.ttl_minutes_for(OtpPurpose::PasswordReset), 10);
}
