mod api_key;
mod jwt;
mod none;
mod traits;
mod types;

pub use api_key::*;
pub use jwt::*;
pub use none::*;
pub use traits::*;
pub use types::*;

use crate::config::{AuthConfig, AuthMethod};

/// Factory function to create authenticator from config
pub fn create_authenticator(config: &AuthConfig) -> Result<Box<dyn Authenticator>, AuthError> {
    match config.method {
        AuthMethod::None => Ok(Box::new(NoneAuthenticator::new())),
        AuthMethod::ApiKey => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                AuthError::ConfigurationError(
                    "api_key must be set when using ApiKey auth method".to_string(),
                )
            })?;
            Ok(Box::new(ApiKeyAuthenticator::new(api_key)))
        }
        AuthMethod::Jwt => {
            let secret = config.jwt_secret.as_deref().ok_or_else(|| {
                AuthError::ConfigurationError(
                    "jwt_secret must be set when using Jwt auth method".to_string(),
                )
            })?;
            Ok(Box::new(JwtAuthenticator::new(
                secret,
                config.jwt_issuer.as_deref(),
            )))
        }
    }
}
