//! Config loading from disk and error context preservation

use std::error::Error;
use std::fs;
use std::str::FromStr;
use switchyard::cli::generate_config_template;
use switchyard::config::{Config, StoreBackend};
use switchyard::error::AppError;
use tempfile::TempDir;

#[test]
fn test_config_file_read_error_preserves_io_error() {
    let err = Config::from_file("/nonexistent/path/to/config.toml").unwrap_err();

    assert!(err.to_string().contains("/nonexistent/path/to/config.toml"));
    let source = err.source().expect("should carry the io::Error");
    assert!(source.is::<std::io::Error>());
}

#[test]
fn test_config_parse_error_preserves_toml_error() {
    let err = Config::from_str("this is [[[[ not valid toml").unwrap_err();

    assert!(matches!(err, AppError::ConfigParseFailed { .. }));
    let source = err.source().expect("should carry the toml error");
    assert!(source.is::<toml::de::Error>());
}

#[test]
fn test_validation_error_names_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(
        &path,
        r#"
[server]
host = "127.0.0.1"
port = 3000

[[gateways]]
id = "g"
url = "ftp://nope"
"#,
    )
    .unwrap();

    let err = Config::from_file(&path).unwrap_err();
    match err {
        AppError::ConfigValidationFailed { path: p, reason } => {
            assert!(p.ends_with("bad.toml"));
            assert!(reason.contains("http"), "reason: {reason}");
        }
        other => panic!("expected ConfigValidationFailed, got {other:?}"),
    }
}

#[test]
fn test_generated_template_loads_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, generate_config_template()).unwrap();

    let config = Config::from_file(&path).expect("template should load");

    assert_eq!(config.gateways.len(), 2);
    assert_eq!(config.gateways[0].id(), "primary");
    assert!(config.gateways[0].priority() < config.gateways[1].priority());
    assert_eq!(config.store.backend, StoreBackend::File);
    assert_eq!(config.routing.max_retries, 3);
    assert_eq!(config.liveness.local_agent_timeout_ms, 300_000);
    assert_eq!(config.models.ids, ["auto"]);
}

#[test]
fn test_minimal_file_takes_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[server]
host = "0.0.0.0"
port = 8000

[[gateways]]
id = "only"
url = "https://gateway.internal"
"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();

    assert_eq!(config.routing.cooldown_base_ms, 30_000);
    assert_eq!(config.routing.cooldown_max_ms, 300_000);
    assert_eq!(config.routing.gateway_timeout_ms, 60_000);
    assert_eq!(config.routing.backoff_jitter, 0.0);
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert_eq!(config.gateways[0].name(), "only");
    assert_eq!(config.gateways[0].priority(), 1);
}
