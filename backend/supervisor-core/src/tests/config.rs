use crate::config::{AppConfig, ConfigStore, CoreProfile};
use crate::controller::parse_external_controller;
use crate::error::ErrorKind;
use crate::error::config::ConfigError;

use models::{CoreMode, RoutingMode};

use std::path::Path;

// ============================================================================
// AppConfig
// ============================================================================

#[test]
fn given_defaults_when_validate_then_ok() {
    let config = AppConfig::default();

    assert!(config.validate().is_ok());
    assert_eq!(config.mode.preferred, CoreMode::User);
    assert_eq!(config.mode.routing, RoutingMode::Rule);
    assert_eq!(config.health.interval_secs, 30);
}

/// **VALUE**: A zero port never reaches the spawn or proxy code.
///
/// **BUG THIS CATCHES**: Enabling a system proxy pointing at port 0, which
/// breaks all browsing until the user fixes it by hand.
#[test]
fn given_zero_proxy_port_when_validate_then_validation_error() {
    // GIVEN
    let mut config = AppConfig::default();
    config.network.proxy_port = 0;

    // WHEN
    let result = config.validate();

    // THEN
    match result {
        Err(ConfigError::ValidationError { reason, .. }) => {
            assert!(reason.contains("network.proxy_port"));
        }
        other => panic!("Expected ValidationError, got {other:?}"),
    }
}

#[test]
fn given_hostname_as_tun_dns_when_validate_then_rejected() {
    let mut config = AppConfig::default();
    config.network.tun_dns = "dns.example.com".to_string();

    let err = config.validate().unwrap_err();

    assert!(err.to_string().contains("tun_dns"));
    assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
}

#[test]
fn given_future_version_when_validate_then_rejected() {
    let mut config = AppConfig::default();
    config.version = 99;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError { .. })
    ));
}

#[test]
fn given_missing_file_when_load_then_defaults() {
    let dir = tempfile::tempdir().unwrap();

    let config = AppConfig::load(dir.path()).unwrap();

    assert_eq!(config, AppConfig::default());
}

/// **VALUE**: Preferences survive a restart.
///
/// **BUG THIS CATCHES**: Serde renames or skipped fields that silently drop
/// the user's mode or routing choice on the next launch.
#[test]
fn given_saved_config_when_load_then_preferences_kept() {
    // GIVEN
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.mode.preferred = CoreMode::Service;
    config.mode.tun_enabled = true;
    config.mode.routing = RoutingMode::Global;
    config.network.proxy_port = 7897;

    // WHEN
    config.save(dir.path()).unwrap();
    let loaded = AppConfig::load(dir.path()).unwrap();

    // THEN
    assert_eq!(loaded, config);
    assert!(!dir.path().join("config.json.tmp").exists());
}

#[test]
fn given_corrupt_file_when_load_then_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.json"), "{ not json").unwrap();

    let result = AppConfig::load(dir.path());

    assert!(matches!(result, Err(ConfigError::ParseError { .. })));
}

#[test]
fn given_partial_file_when_load_then_missing_fields_defaulted() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.json"),
        r#"{ "version": 1, "mode": { "preferred": "service" } }"#,
    )
    .unwrap();

    let config = AppConfig::load(dir.path()).unwrap();

    assert_eq!(config.mode.preferred, CoreMode::Service);
    assert_eq!(config.network.proxy_port, AppConfig::default().network.proxy_port);
}

// ============================================================================
// ConfigStore
// ============================================================================

#[tokio::test]
async fn given_store_when_update_then_memory_and_disk_agree() {
    // GIVEN
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path().to_path_buf(), AppConfig::default());

    // WHEN
    let updated = store
        .update(|c| c.mode.routing = RoutingMode::Direct)
        .await
        .unwrap();

    // THEN
    assert_eq!(updated.mode.routing, RoutingMode::Direct);
    assert_eq!(store.get().await.mode.routing, RoutingMode::Direct);
    assert_eq!(
        AppConfig::load(dir.path()).unwrap().mode.routing,
        RoutingMode::Direct
    );
}

/// **VALUE**: An invalid edit is rejected atomically.
///
/// **BUG THIS CATCHES**: The in-memory copy being mutated before validation,
/// leaving the running app with a config that was never persisted.
#[tokio::test]
async fn given_invalid_edit_when_update_then_nothing_changes() {
    // GIVEN
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path().to_path_buf(), AppConfig::default());

    // WHEN
    let result = store.update(|c| c.core.api_port = 0).await;

    // THEN
    assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    assert_eq!(store.get().await, AppConfig::default());
    assert!(!dir.path().join("config.json").exists());
}

// ============================================================================
// CoreProfile
// ============================================================================

#[test]
fn given_full_profile_when_parse_then_keys_extracted() {
    // GIVEN
    let yaml = "mixed-port: 7897\nexternal-controller: 0.0.0.0:9090\nsecret: s3cret\ntun:\n  enable: true\n  stack: system\n";

    // WHEN
    let profile = CoreProfile::parse(Path::new("config.yaml"), yaml).unwrap();

    // THEN
    assert_eq!(
        profile.external_controller,
        Some(("127.0.0.1".to_string(), 9090))
    );
    assert_eq!(profile.secret.as_ref().map(|s| s.expose()), Some("s3cret"));
    assert_eq!(profile.proxy_port, Some(7897));
    assert!(profile.tun_enabled);
}

#[test]
fn given_minimal_profile_when_parse_then_fallbacks_apply() {
    let profile = CoreProfile::parse(Path::new("config.yaml"), "port: 8080\n").unwrap();

    assert_eq!(profile.proxy_port, Some(8080));
    assert!(profile.secret.is_none());
    assert!(!profile.tun_enabled);
    assert_eq!(
        profile.controller_endpoint("127.0.0.1", 29090),
        ("127.0.0.1".to_string(), 29090)
    );
}

#[test]
fn given_empty_secret_when_parse_then_no_secret() {
    let profile = CoreProfile::parse(Path::new("config.yaml"), "secret: ''\n").unwrap();

    assert!(profile.secret.is_none());
}

#[test]
fn given_list_document_when_parse_then_profile_error() {
    let result = CoreProfile::parse(Path::new("config.yaml"), "- a\n- b\n");

    assert!(matches!(result, Err(ConfigError::ProfileError { .. })));
}

#[test]
fn given_missing_file_when_load_profile_then_config_invalid() {
    let dir = tempfile::tempdir().unwrap();

    let err = CoreProfile::load(&dir.path().join("absent.yaml")).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
}

/// **VALUE**: Profile errors point at the code that asked for the profile.
///
/// **WHY THIS MATTERS**: Several call sites load profiles (start, restart,
/// reload); a location inside the loader says nothing about which one failed.
///
/// **BUG THIS CATCHES**: `#[track_caller]` missing on `load`.
#[test]
fn given_missing_file_when_load_profile_then_location_is_caller() {
    // GIVEN
    let dir = tempfile::tempdir().unwrap();

    // WHEN
    let err = CoreProfile::load(&dir.path().join("absent.yaml")).unwrap_err();

    // THEN
    let message = err.to_string();
    assert!(message.contains("config.rs"), "{message}");
    assert!(!message.contains("core_profile.rs"), "{message}");
}

#[test]
fn given_controller_values_when_parse_external_controller_then_normalized() {
    assert_eq!(
        parse_external_controller("127.0.0.1:9090"),
        Some(("127.0.0.1".to_string(), 9090))
    );
    assert_eq!(
        parse_external_controller(":9090"),
        Some(("127.0.0.1".to_string(), 9090))
    );
    assert_eq!(
        parse_external_controller("[::1]:9090"),
        Some(("::1".to_string(), 9090))
    );
    assert_eq!(parse_external_controller("127.0.0.1:0"), None);
    assert_eq!(parse_external_controller("127.0.0.1:http"), None);
    assert_eq!(parse_external_controller("localhost"), None);
}
