//! Shared-key authentication for service clients such as dashboards and the
//! report renderer.

use std::collections::HashMap;

use async_trait::async_trait;
use sha2::{digest::Output, Digest, Sha256};

use super::{AuthError, AuthRequest, Authenticator, Identity, ADMIN_ROLE};

/// User id recorded as the actor for API key callers.
pub const API_KEY_USER_ID: &str = "api_key_user";

/// Accepts `Authorization: Bearer <key>` or `X-API-Key: <key>`.
///
/// Only a SHA-256 digest of the configured key is kept, and presented keys
/// are compared digest to digest so timing reveals neither content nor
/// length. The key is a service credential and carries the admin role.
pub struct ApiKeyAuthenticator {
    key_digest: Output<Sha256>,
}

impl ApiKeyAuthenticator {
    pub fn new(api_key: impl AsRef<[u8]>) -> Self {
        Self {
            key_digest: Sha256::digest(api_key),
        }
    }

    fn accepts(&self, presented: &str) -> bool {
        let digest = Sha256::digest(presented);
        digest
            .iter()
            .zip(self.key_digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let presented = request
            .bearer_token()
            .or_else(|| request.headers.get("x-api-key").map(String::as_str))
            .ok_or(AuthError::NotAuthenticated)?;

        if !self.accepts(presented) {
            return Err(AuthError::InvalidCredentials("Invalid API key".to_string()));
        }

        Ok(Identity {
            user_id: API_KEY_USER_ID.to_string(),
            name: "API client".to_string(),
            method: self.method_name().to_string(),
            roles: vec![ADMIN_ROLE.to_string()],
            claims: HashMap::new(),
        })
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}
