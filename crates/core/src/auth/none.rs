use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity, ANONYMOUS_USER};

/// Authenticator that accepts all requests.
///
/// The user id comes from the `X-User-Id` header when present, so separate
/// callers still get separate exposure histories. Must be explicitly
/// configured.
pub struct NoneAuthenticator;

impl NoneAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoneAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let user_id = request.user_id_or(ANONYMOUS_USER)?;
        Ok(Identity::new(user_id, self.method_name()))
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}
