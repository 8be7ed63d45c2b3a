use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Shared key for `api_key` auth
    #[serde(default)]
    pub api_key: Option<String>,
    /// HS256 secret for `jwt` auth
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// Required `iss` claim, if set
    #[serde(default)]
    pub jwt_issuer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
    Jwt,
}

impl AuthMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::ApiKey => "api_key",
            AuthMethod::Jwt => "jwt",
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Per-call store timeout, also used as the SQLite busy timeout
    #[serde(default = "default_db_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            timeout_ms: default_db_timeout_ms(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("assetlog.db")
}

fn default_db_timeout_ms() -> u64 {
    5000
}

/// History ticket policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    /// Tickets older than this can no longer be deleted
    #[serde(default = "default_delete_window_hours")]
    pub delete_window_hours: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            delete_window_hours: default_delete_window_hours(),
        }
    }
}

fn default_delete_window_hours() -> u32 {
    24
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub api_key_configured: bool,
    pub jwt_secret_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_issuer: Option<String>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: config.auth.method.as_str().to_string(),
                api_key_configured: config.auth.api_key.is_some(),
                jwt_secret_configured: config.auth.jwt_secret.is_some(),
                jwt_issuer: config.auth.jwt_issuer.clone(),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            history: config.history.clone(),
        }
    }
}
