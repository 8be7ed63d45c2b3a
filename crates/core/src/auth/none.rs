use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Authentication turned off (`auth.method = "none"`).
///
/// Every caller is anonymous; ticket actors then come from the request body.
/// Only used when configured explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneAuthenticator;

impl NoneAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, _request: &AuthRequest) -> Result<Identity, AuthError> {
        Ok(Identity::anonymous())
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}
