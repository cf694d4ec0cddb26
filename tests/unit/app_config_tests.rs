/*!
 * Tests for application configuration
 */

use anyhow::Result;

use subagent::app_config::{Config, LogLevel};

/// Test that a default config carries sensible values but fails validation
/// until API keys are provided
#[test]
fn test_default_config_withoutApiKeys_shouldFailValidation() {
    let config = Config::default();
    assert_eq!(config.languages, vec!["en".to_string()]);
    assert_eq!(config.scan.concurrency, 2);
    assert_eq!(config.scan.min_movie_size, 32 * 1024 * 1024);
    assert_eq!(config.subsync.effort, 1.0);
    assert_eq!(config.log_level, LogLevel::Info);
    assert!(config.validate().is_err());
}

/// Test that a minimal JSON document fills everything else with defaults
#[test]
fn test_deserialize_withMinimalJson_shouldApplyDefaults() -> Result<()> {
    let config: Config = serde_json::from_str(
        r#"{ "opensubtitles": { "api_keys": ["key-a"] } }"#,
    )?;
    assert_eq!(config.languages, vec!["en".to_string()]);
    assert_eq!(config.subsync.binary, "subsync");
    assert_eq!(config.scan.debounce_secs, 5);
    config.validate()?;
    Ok(())
}

/// Test validation of unknown language codes
#[test]
fn test_validate_withUnknownLanguage_shouldFail() {
    let mut config = Config::default();
    config.opensubtitles.api_keys = vec!["key-a".to_string()];
    config.languages = vec!["zz".to_string()];
    assert!(config.validate().is_err());
}

/// Test validation of the effort range
#[test]
fn test_validate_withEffortOutOfRange_shouldFail() {
    let mut config = Config::default();
    config.opensubtitles.api_keys = vec!["key-a".to_string()];
    config.subsync.effort = 1.5;
    assert!(config.validate().is_err());
    config.subsync.effort = 0.5;
    assert!(config.validate().is_ok());
}

/// Test validation of scan concurrency
#[test]
fn test_validate_withZeroConcurrency_shouldFail() {
    let mut config = Config::default();
    config.opensubtitles.api_keys = vec!["key-a".to_string()];
    config.scan.concurrency = 0;
    assert!(config.validate().is_err());
}

/// Test a config round trip through JSON
#[test]
fn test_serialize_withRoundTrip_shouldPreserveValues() -> Result<()> {
    let mut config = Config::default();
    config.opensubtitles.api_keys = vec!["key-a".to_string(), "key-b".to_string()];
    config.languages = vec!["en".to_string(), "fr".to_string()];
    config.log_level = LogLevel::Debug;

    let json = serde_json::to_string_pretty(&config)?;
    let parsed: Config = serde_json::from_str(&json)?;
    assert_eq!(parsed.languages, config.languages);
    assert_eq!(parsed.opensubtitles.api_keys, config.opensubtitles.api_keys);
    assert_eq!(parsed.log_level, LogLevel::Debug);
    Ok(())
}
