// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./nhislink.toml` > `~/.config/nhislink/nhislink.toml` >
//! `/etc/nhislink/nhislink.toml` with environment variable overrides via `NHISLINK_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::NhisConfig;

/// Environment prefixes that map to config sections, most specific first.
const ENV_SECTIONS: &[&str] = &[
    "hyphen_endpoints",
    "agent",
    "storage",
    "hyphen",
    "fetch",
    "cache",
    "budget",
    "gateway",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/nhislink/nhislink.toml` (system-wide)
/// 3. `~/.config/nhislink/nhislink.toml` (user XDG config)
/// 4. `./nhislink.toml` (local directory)
/// 5. `NHISLINK_*` environment variables
pub fn load_config() -> Result<NhisConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<NhisConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NhisConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<NhisConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NhisConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(NhisConfig::default()))
        .merge(Toml::file("/etc/nhislink/nhislink.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("nhislink/nhislink.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("nhislink.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `NHISLINK_FETCH_MAX_YEAR_LIMIT` must become
/// `fetch.max_year_limit`, not `fetch.max.year.limit`.
fn env_provider() -> Env {
    Env::prefixed("NHISLINK_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a prefix-stripped env var name to a dotted config path.
///
/// Figment passes the name in its original case, so it is lowercased first.
pub(crate) fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{}.{rest}", section.replace('_', "."));
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(map_env_key("fetch_max_year_limit"), "fetch.max_year_limit");
        assert_eq!(
            map_env_key("fetch_force_refresh_cache_guard_secs"),
            "fetch.force_refresh_cache_guard_secs"
        );
        assert_eq!(map_env_key("hyphen_hkey"), "hyphen.hkey");
        assert_eq!(
            map_env_key("hyphen_endpoints_medical"),
            "hyphen.endpoints.medical"
        );
        assert_eq!(map_env_key("cache_hash_salt"), "cache.hash_salt");
        assert_eq!(map_env_key("unknown"), "unknown");
    }

    #[test]
    fn env_keys_are_matched_case_insensitively() {
        assert_eq!(map_env_key("FETCH_MAX_YEAR_LIMIT"), "fetch.max_year_limit");
        assert_eq!(map_env_key("HYPHEN_HKEY"), "hyphen.hkey");
        assert_eq!(map_env_key("Gateway_Port"), "gateway.port");
    }

    #[test]
    fn env_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "nhislink.toml",
                r#"
[fetch]
max_year_limit = 4
"#,
            )?;
            jail.set_env("NHISLINK_FETCH_MAX_YEAR_LIMIT", "2");
            jail.set_env("NHISLINK_GATEWAY_PORT", "9000");
            jail.set_env("NHISLINK_HYPHEN_HKEY", "env-hkey");

            let config = load_config_from_path(Path::new("nhislink.toml"))?;
            assert_eq!(config.fetch.max_year_limit, 2);
            assert_eq!(config.gateway.port, 9000);
            assert_eq!(config.hyphen.hkey.as_deref(), Some("env-hkey"));
            Ok(())
        });
    }
}
