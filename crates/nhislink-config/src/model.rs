// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the NHIS fetch orchestrator.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NhisConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Upstream relay settings.
    #[serde(default)]
    pub hyphen: HyphenConfig,

    /// Target, year-limit and cooldown policy.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Fetch cache fingerprinting and TTLs.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Rolling fetch budget.
    #[serde(default)]
    pub budget: BudgetConfig,

    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "nhislink".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("nhislink").join("nhislink.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("nhislink.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// How requests to the relay are authenticated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// `User-Id` and `Hkey` headers.
    #[default]
    Header,
    /// `Authorization: Bearer <access_token>`.
    Oauth,
}

/// Upstream relay configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HyphenConfig {
    /// Base URL of the relay API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Authentication scheme.
    #[serde(default)]
    pub auth_mode: AuthMode,

    /// Relay user id for header auth.
    #[serde(default)]
    pub user_id: Option<String>,

    /// Relay key for header auth.
    #[serde(default)]
    pub hkey: Option<String>,

    /// Access token for OAuth auth.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Send `Hyphen-Gustation: Y` on every request.
    #[serde(default)]
    pub use_gustation: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Provider name stored with links, caches and attempts.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Endpoint path per fetch target.
    #[serde(default)]
    pub endpoints: EndpointConfig,
}

impl std::fmt::Debug for HyphenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyphenConfig")
            .field("base_url", &self.base_url)
            .field("auth_mode", &self.auth_mode)
            .field("user_id", &self.user_id)
            .field("hkey", &self.hkey.as_ref().map(|_| "[redacted]"))
            .field("access_token", &self.access_token.as_ref().map(|_| "[redacted]"))
            .field("use_gustation", &self.use_gustation)
            .field("timeout_secs", &self.timeout_secs)
            .field("provider", &self.provider)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl Default for HyphenConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_mode: AuthMode::default(),
            user_id: None,
            hkey: None,
            access_token: None,
            use_gustation: false,
            timeout_secs: default_timeout_secs(),
            provider: default_provider(),
            endpoints: EndpointConfig::default(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.hyphen.im".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_provider() -> String {
    nhislink_core::DEFAULT_PROVIDER.to_string()
}

/// Relay endpoint path for each fetch target.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    #[serde(default = "default_medical_endpoint")]
    pub medical: String,
    #[serde(default = "default_medication_endpoint")]
    pub medication: String,
    #[serde(default = "default_checkup_list_endpoint")]
    pub checkup_list: String,
    #[serde(default = "default_checkup_yearly_endpoint")]
    pub checkup_yearly: String,
    #[serde(default = "default_checkup_overview_endpoint")]
    pub checkup_overview: String,
    #[serde(default = "default_health_age_endpoint")]
    pub health_age: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            medical: default_medical_endpoint(),
            medication: default_medication_endpoint(),
            checkup_list: default_checkup_list_endpoint(),
            checkup_yearly: default_checkup_yearly_endpoint(),
            checkup_overview: default_checkup_overview_endpoint(),
            health_age: default_health_age_endpoint(),
        }
    }
}

fn default_medical_endpoint() -> String {
    "/in0002000983".to_string()
}

fn default_medication_endpoint() -> String {
    "/in0002000984".to_string()
}

fn default_checkup_list_endpoint() -> String {
    "/in0002000977".to_string()
}

fn default_checkup_yearly_endpoint() -> String {
    "/in0002000979".to_string()
}

fn default_checkup_overview_endpoint() -> String {
    "/in0002000978".to_string()
}

fn default_health_age_endpoint() -> String {
    "/in0002000982".to_string()
}

/// Target, year-limit and cooldown policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    /// Allow high-cost targets (medical, checkup list/yearly, health age).
    #[serde(default)]
    pub high_cost_targets_enabled: bool,

    /// Year limit applied when a detail target is requested without one.
    #[serde(default = "default_year_limit")]
    pub default_year_limit: u32,

    /// Upper bound for any requested year limit.
    #[serde(default = "default_max_year_limit")]
    pub max_year_limit: u32,

    /// Minimum seconds between forced refreshes.
    #[serde(default = "default_force_refresh_cooldown_secs")]
    pub force_refresh_cooldown_secs: u64,

    /// A forced refresh within this many seconds of the newest cache entry is served from it.
    #[serde(default = "default_force_refresh_cache_guard_secs")]
    pub force_refresh_cache_guard_secs: u64,

    /// Maximum checkup detail lookups per fetch.
    #[serde(default = "default_max_yearly_detail_requests")]
    pub max_yearly_detail_requests: usize,

    /// Relay `subjectType` sent with every request.
    #[serde(default = "default_subject_type")]
    pub subject_type: String,

    /// Width of the requested date window, in years back from today.
    #[serde(default = "default_request_window_years")]
    pub request_window_years: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            high_cost_targets_enabled: false,
            default_year_limit: default_year_limit(),
            max_year_limit: default_max_year_limit(),
            force_refresh_cooldown_secs: default_force_refresh_cooldown_secs(),
            force_refresh_cache_guard_secs: default_force_refresh_cache_guard_secs(),
            max_yearly_detail_requests: default_max_yearly_detail_requests(),
            subject_type: default_subject_type(),
            request_window_years: default_request_window_years(),
        }
    }
}

fn default_year_limit() -> u32 {
    3
}

fn default_max_year_limit() -> u32 {
    5
}

fn default_force_refresh_cooldown_secs() -> u64 {
    120
}

fn default_force_refresh_cache_guard_secs() -> u64 {
    30
}

fn default_max_yearly_detail_requests() -> usize {
    3
}

fn default_subject_type() -> String {
    "00".to_string()
}

fn default_request_window_years() -> u32 {
    10
}

/// Fetch cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Salt mixed into identity and request fingerprints.
    #[serde(default = "default_hash_salt")]
    pub hash_salt: String,

    /// TTL for complete summary-only results.
    #[serde(default = "default_summary_ttl_minutes")]
    pub summary_ttl_minutes: u32,

    /// TTL for complete results that include detail targets.
    #[serde(default = "default_detail_ttl_minutes")]
    pub detail_ttl_minutes: u32,

    /// TTL for partial results.
    #[serde(default = "default_partial_ttl_minutes")]
    pub partial_ttl_minutes: u32,

    /// TTL for failed results.
    #[serde(default = "default_failure_ttl_minutes")]
    pub failure_ttl_minutes: u32,

    /// Entries kept by the in-process cache in front of the database.
    #[serde(default = "default_memory_max_entries")]
    pub memory_max_entries: usize,

    /// How long an expired in-process entry stays usable as history.
    #[serde(default = "default_memory_history_grace_minutes")]
    pub memory_history_grace_minutes: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hash_salt: default_hash_salt(),
            summary_ttl_minutes: default_summary_ttl_minutes(),
            detail_ttl_minutes: default_detail_ttl_minutes(),
            partial_ttl_minutes: default_partial_ttl_minutes(),
            failure_ttl_minutes: default_failure_ttl_minutes(),
            memory_max_entries: default_memory_max_entries(),
            memory_history_grace_minutes: default_memory_history_grace_minutes(),
        }
    }
}

fn default_hash_salt() -> String {
    "nhislink-fetch-cache-v1".to_string()
}

fn default_summary_ttl_minutes() -> u32 {
    60 * 12
}

fn default_detail_ttl_minutes() -> u32 {
    60 * 24 * 3
}

fn default_partial_ttl_minutes() -> u32 {
    60 * 2
}

fn default_failure_ttl_minutes() -> u32 {
    10
}

fn default_memory_max_entries() -> usize {
    1200
}

fn default_memory_history_grace_minutes() -> u32 {
    60 * 24 * 90
}

/// Rolling fetch budget configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    /// Length of the rolling window in hours.
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,

    /// Uncached non-forced fetches allowed per window.
    #[serde(default = "default_max_fresh_fetches")]
    pub max_fresh_fetches: u32,

    /// Uncached forced refreshes allowed per window.
    #[serde(default = "default_max_force_refreshes")]
    pub max_force_refreshes: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            max_fresh_fetches: default_max_fresh_fetches(),
            max_force_refreshes: default_max_force_refreshes(),
        }
    }
}

fn default_window_hours() -> u32 {
    24
}

fn default_max_fresh_fetches() -> u32 {
    6
}

fn default_max_force_refreshes() -> u32 {
    2
}

/// HTTP gateway configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token required on API routes. `None` disables the check.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3180
}
