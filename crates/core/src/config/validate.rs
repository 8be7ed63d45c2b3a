use super::{
    types::{AuthMethod, Config},
    ConfigError,
};

/// Shortest accepted HS256 secret, in bytes.
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Longest accepted delete window: ten years.
pub const MAX_DELETE_WINDOW_HOURS: u32 = 24 * 365 * 10;

/// Validate configuration
/// Currently validates:
/// - Auth section exists (enforced by serde)
/// - Credentials required by the chosen auth method are present
/// - Server port is not 0
/// - Database timeout is not 0
/// - Delete window is at most [`MAX_DELETE_WINDOW_HOURS`]
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    match config.auth.method {
        AuthMethod::None => {}
        AuthMethod::ApiKey => {
            if config.auth.api_key.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::ValidationError(
                    "auth.api_key must be set when auth.method = \"api_key\"".to_string(),
                ));
            }
        }
        AuthMethod::Jwt => {
            let secret_len = config.auth.jwt_secret.as_deref().map_or(0, str::len);
            if secret_len < MIN_JWT_SECRET_LEN {
                return Err(ConfigError::ValidationError(format!(
                    "auth.jwt_secret must be at least {} bytes when auth.method = \"jwt\"",
                    MIN_JWT_SECRET_LEN
                )));
            }
        }
    }

    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.database.timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "database.timeout_ms cannot be 0".to_string(),
        ));
    }

    if config.history.delete_window_hours > MAX_DELETE_WINDOW_HOURS {
        return Err(ConfigError::ValidationError(format!(
            "history.delete_window_hours cannot exceed {}",
            MAX_DELETE_WINDOW_HOURS
        )));
    }

    Ok(())
}
