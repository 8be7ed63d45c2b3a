//! Bearer JWT authentication (HS256).
//!
//! Tokens are issued elsewhere; this only verifies them.

use std::collections::HashMap;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Claims read from an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// User id
    pub sub: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Single-role form used by some issuers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl JwtClaims {
    fn into_identity(self) -> Identity {
        let mut roles = self.roles;
        if let Some(role) = self.role {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }

        let mut claims = HashMap::new();
        claims.insert("exp".to_string(), serde_json::json!(self.exp));
        if let Some(iss) = self.iss {
            claims.insert("iss".to_string(), serde_json::json!(iss));
        }

        Identity {
            name: self.name.unwrap_or_else(|| self.sub.clone()),
            user_id: self.sub,
            method: "jwt".to_string(),
            roles,
            claims,
        }
    }
}

/// Authenticator that verifies `Authorization: Bearer <jwt>` tokens.
pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    /// `issuer`, when set, must match the token's `iss` claim.
    pub fn new(secret: &str, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["sub", "exp"]);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let token = request.bearer_token().ok_or(AuthError::NotAuthenticated)?;

        let data = decode::<JwtClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => {
                    AuthError::InvalidCredentials("Token expired".to_string())
                }
                ErrorKind::InvalidSignature => {
                    AuthError::InvalidCredentials("Invalid token signature".to_string())
                }
                ErrorKind::InvalidIssuer => {
                    AuthError::InvalidCredentials("Invalid token issuer".to_string())
                }
                _ => AuthError::InvalidCredentials(format!("Invalid token: {}", e)),
            },
        )?;

        Ok(data.claims.into_identity())
    }

    fn method_name(&self) -> &'static str {
        "jwt"
    }
}
