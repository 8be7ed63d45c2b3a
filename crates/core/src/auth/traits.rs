use async_trait::async_trait;
use thiserror::Error;

use super::types::{AuthRequest, Identity};

/// Why a request could not be tied to a caller.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credentials were presented.
    #[error("Authentication required")]
    NotAuthenticated,

    /// Credentials were presented but rejected (bad key, bad or expired token).
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl AuthError {
    /// Label used for the auth failure counter.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::NotAuthenticated => "not_authenticated",
            AuthError::InvalidCredentials(_) => "invalid_credentials",
            AuthError::ConfigurationError(_) => "configuration_error",
        }
    }

    /// True when the caller is at fault, as opposed to the server.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, AuthError::ConfigurationError(_))
    }
}

/// Resolves the caller behind a history request.
///
/// The identity feeds the actor fields of tickets and audit events, and its
/// roles gate deletion.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError>;

    /// Value of `auth.method` this authenticator serves.
    fn method_name(&self) -> &'static str;
}
