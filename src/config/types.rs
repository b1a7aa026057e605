// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// Directory of `*.toml` overlays applied after the main file
    #[serde(default)]
    pub config_dir: Option<PathBuf>,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub server_name: String,
    pub enable_cors: bool,
    pub max_body_size: u64,
}

/// Token authentication configuration
#[derive(Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Minimum accepted token version, as "major.minor"
    pub token_version: String,
    /// Access token validity in seconds
    pub token_validity: u64,
    /// Refresh token validity in seconds
    pub refresh_token_validity: u64,
    /// Refresh tokens closer than this to expiry are rotated (seconds)
    pub refresh_token_margin: u64,
    /// JSON file mapping user name to password hash
    pub passwords: PathBuf,
}

// Keeps the secret out of debug output and logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_version", &self.token_version)
            .field("token_validity", &self.token_validity)
            .field("refresh_token_validity", &self.refresh_token_validity)
            .field("refresh_token_margin", &self.refresh_token_margin)
            .field("passwords", &self.passwords)
            .finish()
    }
}

/// Function dispatcher configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// URL prefix the dispatcher is mounted under
    #[serde(default = "default_api_prefix")]
    pub prefix: String,
    /// Require a bearer token on dispatcher routes
    #[serde(default)]
    pub require_auth: bool,
    /// Directory of recorded function results
    #[serde(default)]
    pub fixtures_dir: Option<PathBuf>,
    /// Replaces the built-in allow-list when set
    #[serde(default)]
    pub allow: Option<Vec<AllowRule>>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_api_prefix() -> String {
    "/".to_string()
}

impl ApiConfig {
    /// Configured allow-list, or the built-in one when none is set
    pub fn allow_rules(&self) -> Vec<AllowRule> {
        self.allow
            .clone()
            .unwrap_or_else(crate::dispatch::allowlist::default_rules)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: default_api_prefix(),
            require_auth: false,
            fixtures_dir: None,
            allow: None,
        }
    }
}

/// One allow-list entry: a dotted module path and its function globs
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct AllowRule {
    pub module: String,
    pub functions: Vec<String>,
}
