// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the configuration system.

use nhislink_config::diagnostic::ConfigError;
use nhislink_config::model::AuthMode;
use nhislink_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with every section deserializes successfully.
#[test]
fn valid_toml_deserializes_into_config() {
    let toml = r#"
[agent]
name = "nhis-test"
log_level = "debug"

[storage]
database_path = "/tmp/nhis.db"
wal_mode = false

[hyphen]
base_url = "http://localhost:9999"
auth_mode = "oauth"
access_token = "tok-123"
use_gustation = true
timeout_secs = 15

[hyphen.endpoints]
medical = "/custom/medical"

[fetch]
high_cost_targets_enabled = true
default_year_limit = 2
max_year_limit = 4
force_refresh_cooldown_secs = 90

[cache]
summary_ttl_minutes = 60

[budget]
max_fresh_fetches = 10

[gateway]
host = "0.0.0.0"
port = 8080
bearer_token = "secret"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "nhis-test");
    assert_eq!(config.agent.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/nhis.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.hyphen.auth_mode, AuthMode::Oauth);
    assert_eq!(config.hyphen.access_token.as_deref(), Some("tok-123"));
    assert!(config.hyphen.use_gustation);
    assert_eq!(config.hyphen.endpoints.medical, "/custom/medical");
    assert_eq!(config.hyphen.endpoints.medication, "/in0002000984");
    assert!(config.fetch.high_cost_targets_enabled);
    assert_eq!(config.fetch.default_year_limit, 2);
    assert_eq!(config.fetch.force_refresh_cooldown_secs, 90);
    assert_eq!(config.cache.summary_ttl_minutes, 60);
    assert_eq!(config.cache.detail_ttl_minutes, 4320);
    assert_eq!(config.budget.max_fresh_fetches, 10);
    assert_eq!(config.gateway.port, 8080);
    assert_eq!(config.gateway.bearer_token.as_deref(), Some("secret"));
}

/// Empty TOML falls back to defaults everywhere.
#[test]
fn empty_toml_uses_defaults() {
    let config = load_and_validate_str("").expect("defaults should validate");
    assert_eq!(config.agent.name, "nhislink");
    assert_eq!(config.fetch.default_year_limit, 3);
    assert_eq!(config.hyphen.base_url, "https://api.hyphen.im");
}

/// Typos produce an UnknownKey diagnostic with a suggestion.
#[test]
fn unknown_field_suggests_correction() {
    let toml = r#"
[fetch]
max_yaer_limit = 3
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "max_yaer_limit");
            assert_eq!(suggestion.as_deref(), Some("max_year_limit"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

/// Wrong value types are reported as InvalidType.
#[test]
fn wrong_type_produces_invalid_type() {
    let toml = r#"
[gateway]
port = "not-a-number"
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(
        matches!(&errors[0], ConfigError::InvalidType { key, .. } if key.contains("port")),
        "got: {errors:?}"
    );
}

/// Semantic violations surface after successful deserialization.
#[test]
fn year_limit_ordering_is_validated() {
    let toml = r#"
[fetch]
default_year_limit = 5
max_year_limit = 2
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(errors
        .iter()
        .any(|e| e.to_string().contains("fetch.default_year_limit")));
}

/// Unknown auth modes are rejected at deserialization.
#[test]
fn unknown_auth_mode_is_rejected() {
    let toml = r#"
[hyphen]
auth_mode = "magic"
"#;
    assert!(load_and_validate_str(toml).is_err());
}
