#![forbid(unsafe_code)]

//! `nearhand` — community assistance coordination server.
//!
//! Requesters post tasks, nearby helpers apply, the requester approves,
//! both sides coordinate over realtime channels, and an in-person OTP
//! closes the loop with a verified completion.

pub mod config;
pub mod errors;
pub mod geo;
pub mod http;
pub mod ledger;
pub mod lifecycle;
pub mod matching;
pub mod models;
pub mod notify;
pub mod otp;
pub mod persistence;
pub mod realtime;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
