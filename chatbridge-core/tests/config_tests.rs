//! Integration tests for configuration loading and validation

use chatbridge_core::config::{
    load_from_json, load_from_yaml, ConfigError, ValidationErrorKind,
};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Helper to create a test config file
fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_valid_yaml_config() {
    use std::env;
    env::set_var("CHATBRIDGE_YAML_FORWARD_KEY", "sk-yaml");

    let yaml = r#"
version: "0.1"
providers_dir: /srv/chatbridge/providers
default_model: qwen-max
server:
  host: 127.0.0.1
  port: 8081
upstream:
  request_timeout_ms: 30000
  connect_timeout_ms: 5000
  idle_timeout_ms: 10000
  forward_api_key: ${CHATBRIDGE_YAML_FORWARD_KEY}
  retry:
    max_retries: 3
    initial_delay_ms: 100
    max_delay_ms: 1000
"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "config.yaml", yaml);

    let config = load_from_yaml(path).unwrap();
    assert_eq!(config.providers_dir, PathBuf::from("/srv/chatbridge/providers"));
    assert_eq!(config.default_model, "qwen-max");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8081);
    assert_eq!(config.upstream.request_timeout(), Duration::from_secs(30));
    assert_eq!(config.upstream.idle_timeout(), Duration::from_secs(10));
    assert_eq!(
        config.upstream.forward_api_key.as_ref().map(|k| k.expose_secret()),
        Some("sk-yaml")
    );
    assert_eq!(config.upstream.retry.max_retries, 3);

    // secrets never show up in debug output
    assert!(!format!("{:?}", config).contains("sk-yaml"));

    env::remove_var("CHATBRIDGE_YAML_FORWARD_KEY");
}

#[test]
fn test_load_valid_json_config() {
    let json = r#"{
        "version": "0.1",
        "providers_dir": "descriptors",
        "server": {"port": 9000}
    }"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "config.json", json);

    let config = load_from_json(path).unwrap();
    assert_eq!(config.providers_dir, PathBuf::from("descriptors"));
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.host, "0.0.0.0");
    assert!(config.upstream.forward_api_key.is_none());
}

#[test]
fn test_missing_env_var_fails() {
    let yaml = "version: \"0.1\"\nupstream:\n  forward_api_key: ${CHATBRIDGE_NEVER_SET_VAR}\n";

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "config.yaml", yaml);

    match load_from_yaml(path) {
        Err(ConfigError::EnvVarNotFound { var }) => assert_eq!(var, "CHATBRIDGE_NEVER_SET_VAR"),
        other => panic!("Expected EnvVarNotFound, got {:?}", other),
    }
}

#[test]
fn test_parse_error_reports_location() {
    let yaml = "version: \"0.1\"\nserver:\n  port: [not, a, port]\n";

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "config.yaml", yaml);

    match load_from_yaml(path) {
        Err(ConfigError::ParseError { line, .. }) => assert!(line.is_some()),
        other => panic!("Expected ParseError, got {:?}", other),
    }
}

#[test]
fn test_unknown_field_rejected() {
    let json = r#"{"version": "0.1", "upstream": {"request_timeout": 5}}"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "config.json", json);

    assert!(matches!(load_from_json(path), Err(ConfigError::ParseError { .. })));
}

#[test]
fn test_wrong_version_rejected() {
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "config.yaml", "version: \"2.0\"\n");

    match load_from_yaml(path) {
        Err(ConfigError::ValidationError(err)) => {
            assert_eq!(err.field_path, "version");
            assert!(matches!(err.kind, ValidationErrorKind::InvalidVersion { .. }));
        }
        other => panic!("Expected ValidationError, got {:?}", other),
    }
}

#[test]
fn test_connect_timeout_cannot_exceed_request_timeout() {
    let yaml = r#"
version: "0.1"
upstream:
  request_timeout_ms: 1000
  connect_timeout_ms: 5000
"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "config.yaml", yaml);

    match load_from_yaml(path) {
        Err(ConfigError::ValidationError(err)) => {
            assert_eq!(err.field_path, "upstream.connect_timeout_ms");
        }
        other => panic!("Expected ValidationError, got {:?}", other),
    }
}

#[test]
fn test_invalid_retry_policy_path() {
    let yaml = r#"
version: "0.1"
upstream:
  retry:
    jitter_factor: 1.5
"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "config.yaml", yaml);

    match load_from_yaml(path) {
        Err(ConfigError::ValidationError(err)) => {
            assert_eq!(err.field_path, "upstream.retry.jitter_factor");
        }
        other => panic!("Expected ValidationError, got {:?}", other),
    }
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let result = load_from_yaml(dir.path().join("absent.yaml"));
    assert!(matches!(result, Err(ConfigError::IoError { .. })));
}
