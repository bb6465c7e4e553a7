//! Configuration data structures for the dashgate gateway.
//!
//! This module defines the schema for the application settings: the HTTP
//! listener, the route guard's path table, the hosted auth backend, the
//! upstream dashboard origin and the offline cache worker.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use serde::{Deserialize, Serialize};

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP server settings (host, port, workers).
    #[serde(default)]
    pub server: ServerConfig,

    /// Route guard path table.
    #[serde(default)]
    pub guard: GuardConfig,

    /// Hosted auth/data backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Dashboard origin the gateway fronts.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Offline cache worker settings.
    #[serde(default)]
    pub offline: OfflineConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Performance and resource management settings.
    #[serde(default)]
    pub performance: PerformanceConfig,
}

/// Settings for the built-in HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The IP address or hostname the server should bind to.
    /// Default: `127.0.0.1`
    #[serde(default = "default_host")]
    pub host: String,

    /// The port number the server should listen on.
    /// Default: `8080`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads for the Tokio runtime.
    /// Default: Number of logical CPU cores.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bearer token for the operator endpoints (`/sw/register`,
    /// `/sw/push`). Empty disables them.
    #[serde(default)]
    pub operator_token: String,
}

/// Paths consulted by the route guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Where unauthenticated visitors are sent.
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Where authenticated visitors of auth pages are sent.
    #[serde(default = "default_dashboard_path")]
    pub dashboard_path: String,

    /// Public prefix holding login/signup pages.
    #[serde(default = "default_auth_prefix")]
    pub auth_prefix: String,

    /// Prefix of the two-factor challenge pages.
    #[serde(default = "default_two_factor_prefix")]
    pub two_factor_prefix: String,

    /// Redirect target for sessions that still owe a second factor.
    #[serde(default = "default_two_factor_challenge_path")]
    pub two_factor_challenge_path: String,

    /// Endpoint that verifies a submitted code. Always reachable.
    #[serde(default = "default_two_factor_verify_endpoint")]
    pub two_factor_verify_endpoint: String,

    /// Prefixes the guard never looks at (static assets, worker endpoints).
    #[serde(default = "default_bypass_prefixes")]
    pub bypass_prefixes: Vec<String>,
}

/// Settings for the hosted auth/data backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the hosted backend project.
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Public (anon) API key sent as the `apikey` header.
    #[serde(default)]
    pub api_key: String,

    /// Cookie carrying the session access token.
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    /// Table holding per-user two-factor flags.
    #[serde(default = "default_profiles_table")]
    pub profiles_table: String,

    /// Request timeout in seconds.
    /// Default: `10`
    #[serde(default = "default_backend_timeout")]
    pub timeout_seconds: u64,
}

/// Settings for the dashboard origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the dashboard web origin.
    /// Default: `http://127.0.0.1:3000`
    #[serde(default = "default_upstream_url")]
    pub url: String,

    /// Connection and request timeout in seconds.
    /// Default: `30`
    #[serde(default = "default_upstream_timeout")]
    pub timeout_seconds: u64,
}

/// Settings for the offline cache worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineConfig {
    /// Name of the current cache generation. Change it to invalidate.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// URLs pre-cached at install time.
    #[serde(default = "default_static_assets")]
    pub static_assets: Vec<String>,

    /// Page served to HTML requests when the network is unreachable.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Path prefixes that always go to the network.
    #[serde(default = "default_network_only_prefixes")]
    pub network_only_prefixes: Vec<String>,

    /// Hosts (backend database, auth) that always go to the network.
    #[serde(default)]
    pub network_only_hosts: Vec<String>,

    /// Background sync tag that triggers a pending-data broadcast.
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,

    /// Largest body stored in the cache, in bytes.
    /// Default: `5242880` (5 MiB)
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: usize,

    /// Icon shown on push notifications.
    #[serde(default = "default_notification_icon")]
    pub notification_icon: String,

    /// Badge shown on push notifications.
    #[serde(default = "default_notification_badge")]
    pub notification_badge: String,

    /// Answer given when notification permission is requested.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub allow_notifications: bool,

    /// Promote a freshly installed worker without waiting for the old one.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub skip_waiting_on_install: bool,

    /// Install the static assets when the server starts.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub precache_on_start: bool,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Whether to mask session tokens and API keys in logs.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub sanitize_tokens: bool,
}

/// Settings for tuning application performance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum number of idle connections to keep in the HTTP pool.
    /// Default: `100`
    #[serde(default = "default_pool_size")]
    pub connection_pool_size: usize,

    /// Whether to enable GZIP compression for HTTP responses.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub enable_compression: bool,

    /// Largest request body accepted, in bytes.
    /// Default: `10485760` (10 MiB)
    #[serde(default = "default_body_limit")]
    pub max_body_bytes: usize,
}

// Default trait implementations linking to custom logic

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
            operator_token: String::new(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            login_path: default_login_path(),
            dashboard_path: default_dashboard_path(),
            auth_prefix: default_auth_prefix(),
            two_factor_prefix: default_two_factor_prefix(),
            two_factor_challenge_path: default_two_factor_challenge_path(),
            two_factor_verify_endpoint: default_two_factor_verify_endpoint(),
            bypass_prefixes: default_bypass_prefixes(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            api_key: String::new(),
            session_cookie: default_session_cookie(),
            profiles_table: default_profiles_table(),
            timeout_seconds: default_backend_timeout(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            timeout_seconds: default_upstream_timeout(),
        }
    }
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            static_assets: default_static_assets(),
            offline_page: default_offline_page(),
            network_only_prefixes: default_network_only_prefixes(),
            network_only_hosts: Vec::new(),
            sync_tag: default_sync_tag(),
            max_entry_bytes: default_max_entry_bytes(),
            notification_icon: default_notification_icon(),
            notification_badge: default_notification_badge(),
            allow_notifications: true,
            skip_waiting_on_install: true,
            precache_on_start: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            sanitize_tokens: true,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            connection_pool_size: default_pool_size(),
            enable_compression: true,
            max_body_bytes: default_body_limit(),
        }
    }
}

// Helper functions for serde defaults and shared constants
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

fn default_dashboard_path() -> String {
    "/dashboard".to_string()
}

fn default_auth_prefix() -> String {
    "/auth".to_string()
}

fn default_two_factor_prefix() -> String {
    "/2fa".to_string()
}

fn default_two_factor_challenge_path() -> String {
    "/2fa/verify".to_string()
}

fn default_two_factor_verify_endpoint() -> String {
    "/api/auth/verify-2fa".to_string()
}

fn default_bypass_prefixes() -> Vec<String> {
    [
        "/_next/static",
        "/_next/image",
        "/icons",
        "/favicon.ico",
        "/manifest.json",
        "/sw.js",
        "/offline.html",
        "/health",
        "/metrics",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_backend_url() -> String {
    "http://127.0.0.1:54321".to_string()
}

fn default_session_cookie() -> String {
    "sb-access-token".to_string()
}

fn default_profiles_table() -> String {
    "profiles".to_string()
}

fn default_backend_timeout() -> u64 {
    10
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_upstream_timeout() -> u64 {
    30
}

fn default_cache_name() -> String {
    "case-dashboard-v1".to_string()
}

fn default_static_assets() -> Vec<String> {
    ["/", "/dashboard", "/offline.html", "/manifest.json", "/icons/icon-192x192.png", "/icons/icon-512x512.png"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_offline_page() -> String {
    "/offline.html".to_string()
}

fn default_network_only_prefixes() -> Vec<String> {
    ["/api/", "/auth/v1/", "/rest/v1/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_sync_tag() -> String {
    "sync-pending-data".to_string()
}

fn default_max_entry_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_notification_icon() -> String {
    "/icons/icon-192x192.png".to_string()
}

fn default_notification_badge() -> String {
    "/icons/badge-72x72.png".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_pool_size() -> usize {
    100
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024
}
