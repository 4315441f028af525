//! Unit tests for configuration parsing and validation.

use nearhand::config::GlobalConfig;
use nearhand::AppError;

#[test]
fn empty_toml_yields_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("defaults");

    assert_eq!(config.http_port, 3000);
    assert_eq!(config.matching.sweep_interval_seconds, 300);
    assert_eq!(config.matching.helper_freshness_minutes, 30);
    assert!((config.matching.urgent_radius_km - 5.0).abs() < f64::EPSILON);
    assert!((config.matching.sos_radius_km - 10.0).abs() < f64::EPSILON);
    assert!((config.matching.average_speed_kmh - 20.0).abs() < f64::EPSILON);
    assert_eq!(config.otp.code_length, 6);
    assert_eq!(config.otp.task_completion_ttl_minutes, 30);
    assert_eq!(config.otp.contact_ttl_minutes, 10);
    assert_eq!(config.otp.max_attempts, 5);
    assert_eq!(config.retention.retention_days, 30);
    assert_eq!(config.retention.message_ttl_days, 30);
}

#[test]
fn overrides_are_honored() {
    let raw = r#"
http_port = 8080
db_path = "/var/lib/nearhand/data.db"

[matching]
sweep_interval_seconds = 60
urgent_radius_km = 3.5

[otp]
code_length = 8
max_attempts = 3
"#;
    let config = GlobalConfig::from_toml_str(raw).expect("parse");

    assert_eq!(config.http_port, 8080);
    assert_eq!(config.matching.sweep_interval_seconds, 60);
    assert!((config.matching.urgent_radius_km - 3.5).abs() < f64::EPSILON);
    assert_eq!(config.otp.code_length, 8);
    assert_eq!(config.otp.max_attempts, 3);
    // Untouched sections keep defaults.
    assert_eq!(config.otp.task_completion_ttl_minutes, 30);
}

#[test]
fn code_length_out_of_range_is_rejected() {
    let result = GlobalConfig::from_toml_str("[otp]\ncode_length = 2\n");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn zero_max_attempts_is_rejected() {
    let result = GlobalConfig::from_toml_str("[otp]\nmax_attempts = 0\n");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn non_positive_speed_is_rejected() {
    let result = GlobalConfig::from_toml_str("[matching]\naverage_speed_kmh = 0.0\n");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn malformed_toml_is_a_config_error() {
    let result = GlobalConfig::from_toml_str("http_port = ");
    assert!(matches!(result, Err(AppError::Config(_))));
}
