//! Tests for service configuration

use super::*;

#[test]
fn test_defaults_are_valid() {
    let config = ServiceConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.bind_address(), "0.0.0.0:8080");

    let policy = config.failure_policy();
    assert_eq!(policy.threshold, 10);
    assert_eq!(policy.window, Duration::from_secs(24 * 3600));

    let dispatch = config.dispatch_config();
    assert_eq!(dispatch.deliver_timeout, Duration::from_secs(30));
    assert_eq!(dispatch.test_timeout, Duration::from_secs(10));
}

#[test]
fn test_validate_rejects_zero_values() {
    let mut config = ServiceConfig::default();
    config.policy.failure_threshold = 0;
    assert!(config.validate().is_err());

    let mut config = ServiceConfig::default();
    config.orchestrator.concurrency = 0;
    assert!(config.validate().is_err());

    let mut config = ServiceConfig::default();
    config.server.port = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_bad_api_key_entries() {
    let mut config = ServiceConfig::default();
    config.api_keys.push(ApiKeyEntry {
        key: "fr_live_abc".to_string(),
        account: "not-a-uuid".to_string(),
    });
    let error = config.validate().unwrap_err();
    assert!(error.contains("non-UUID"));
    assert!(!error.contains("fr_live_abc"), "full key never shown");
}

#[test]
fn test_api_key_entries_parse_accounts() {
    let account = uuid::Uuid::new_v4();
    let mut config = ServiceConfig::default();
    config.api_keys.push(ApiKeyEntry {
        key: "fr_live_abc".to_string(),
        account: account.to_string(),
    });
    assert!(config.validate().is_ok());

    let entries = config.api_key_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "fr_live_abc");
    assert_eq!(*entries[0].1.as_uuid(), account);
}

#[test]
fn test_config_deserializes_from_toml_fragment() {
    let parsed: ServiceConfig = config::Config::builder()
        .add_source(config::File::from_str(
            r#"
            [server]
            port = 9090

            [policy]
            failure_threshold = 5
            "#,
            config::FileFormat::Toml,
        ))
        .build()
        .unwrap()
        .try_deserialize()
        .unwrap();

    assert_eq!(parsed.server.port, 9090);
    assert_eq!(parsed.server.host, "0.0.0.0", "unset fields keep defaults");
    assert_eq!(parsed.policy.failure_threshold, 5);
    assert_eq!(parsed.policy.failure_window_hours, 24);
}
