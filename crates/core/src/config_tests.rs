// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn missing_setup_config_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = SetupConfig::load_from(&dir.path().join("scalyclaw.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Missing(_)));
}

#[test]
fn loads_setup_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scalyclaw.json");
    std::fs::write(
        &path,
        r#"{"homeDir":"/var/lib/scalyclaw","redis":{"host":"redis.internal","port":6380,"tls":true}}"#,
    )
    .unwrap();
    let config = SetupConfig::load_from(&path).unwrap();
    assert_eq!(config.home_dir, PathBuf::from("/var/lib/scalyclaw"));
    assert_eq!(config.redis.host, "redis.internal");
    assert_eq!(config.redis.port, 6380);
    assert!(config.redis.tls);
    assert_eq!(config.password_file(), PathBuf::from("/var/lib/scalyclaw/scalyclaw.ps"));
}

#[test]
fn redis_defaults_fill_in() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scalyclaw.json");
    std::fs::write(&path, r#"{"homeDir":"/tmp/sc"}"#).unwrap();
    let config = SetupConfig::load_from(&path).unwrap();
    assert_eq!(config.redis.host, "127.0.0.1");
    assert_eq!(config.redis.port, 6379);
    assert!(!config.redis.tls);
}

#[parameterized(
    plain = { RedisConfig { host: "h".into(), port: 1, password: None, tls: false }, "redis://h:1" },
    tls = { RedisConfig { host: "h".into(), port: 1, password: None, tls: true }, "rediss://h:1" },
    auth = { RedisConfig { host: "h".into(), port: 1, password: Some("pw".into()), tls: false }, "redis://:pw@h:1" },
)]
fn redis_url_forms(config: RedisConfig, expected: &str) {
    assert_eq!(config.url(), expected);
}

#[test]
fn parse_error_is_reported_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scalyclaw.json");
    std::fs::write(&path, "{not json").unwrap();
    let err = SetupConfig::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn worker_settings_default_concurrency() {
    let raw = r#"{"nodeUrl":"http://127.0.0.1:4100","authToken":"t"}"#;
    let settings: WorkerSettings = serde_json::from_str(raw).unwrap();
    assert_eq!(settings.concurrency, 2);
    assert!(settings.workspace_dir.is_none());
}
