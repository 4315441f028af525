//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{AppError, Result};

/// Matching sweep tuning.
///
/// The sweep interval is the external periodic trigger for
/// [`crate::matching::run_urgent_sweep`]; the engine itself is
/// interval-agnostic.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct MatchingConfig {
    /// Whether the periodic urgent-task sweep runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Helpers whose location is older than this are skipped.
    #[serde(default = "default_helper_freshness")]
    pub helper_freshness_minutes: i64,
    /// Notification radius for `urgent` tasks, kilometres.
    #[serde(default = "default_urgent_radius")]
    pub urgent_radius_km: f64,
    /// Notification radius for `sos` tasks, kilometres.
    #[serde(default = "default_sos_radius")]
    pub sos_radius_km: f64,
    /// Assumed helper travel speed for ETA estimates, km/h.
    #[serde(default = "default_average_speed")]
    pub average_speed_kmh: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_seconds: default_sweep_interval(),
            helper_freshness_minutes: default_helper_freshness(),
            urgent_radius_km: default_urgent_radius(),
            sos_radius_km: default_sos_radius(),
            average_speed_kmh: default_average_speed(),
        }
    }
}

/// OTP issuance and verification tuning.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct OtpConfig {
    /// Number of digits in a generated code.
    #[serde(default = "default_code_length")]
    pub code_length: u32,
    /// TTL for task-completion codes, minutes.
    #[serde(default = "default_completion_ttl")]
    pub task_completion_ttl_minutes: i64,
    /// TTL for phone/email verification codes, minutes.
    #[serde(default = "default_contact_ttl")]
    pub contact_ttl_minutes: i64,
    /// Verification attempts allowed before a record locks.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_length: default_code_length(),
            task_completion_ttl_minutes: default_completion_ttl(),
            contact_ttl_minutes: default_contact_ttl(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Time-based purge thresholds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RetentionConfig {
    /// Days before read notifications are purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Days a chat message survives before purge.
    #[serde(default = "default_message_ttl_days")]
    pub message_ttl_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            message_ttl_days: default_message_ttl_days(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_helper_freshness() -> i64 {
    30
}

fn default_urgent_radius() -> f64 {
    5.0
}

fn default_sos_radius() -> f64 {
    10.0
}

fn default_average_speed() -> f64 {
    20.0
}

fn default_code_length() -> u32 {
    6
}

fn default_completion_ttl() -> i64 {
    30
}

fn default_contact_ttl() -> i64 {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retention_days() -> u32 {
    30
}

fn default_message_ttl_days() -> u32 {
    30
}

fn default_http_port() -> u16 {
    3000
}

fn default_db_path() -> PathBuf {
    PathBuf::from("nearhand.db")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// HTTP port for the API and WebSocket endpoint.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Path to the `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Matching sweep tuning.
    #[serde(default)]
    pub matching: MatchingConfig,
    /// OTP tuning.
    #[serde(default)]
    pub otp: OtpConfig,
    /// Purge thresholds.
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            db_path: default_db_path(),
            matching: MatchingConfig::default(),
            otp: OtpConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.otp.code_length < 4 || self.otp.code_length > 10 {
            return Err(AppError::Config(
                "otp.code_length must be between 4 and 10".into(),
            ));
        }
        if self.otp.max_attempts == 0 {
            return Err(AppError::Config(
                "otp.max_attempts must be greater than zero".into(),
            ));
        }
        if self.matching.average_speed_kmh <= 0.0 {
            return Err(AppError::Config(
                "matching.average_speed_kmh must be positive".into(),
            ));
        }
        if self.matching.urgent_radius_km <= 0.0 || self.matching.sos_radius_km <= 0.0 {
            return Err(AppError::Config(
                "matching radii must be positive".into(),
            ));
        }
        Ok(())
    }
}
