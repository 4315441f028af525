//! One-time-code issuance and verification.

pub mod guard;

pub use guard::OtpGuard;
