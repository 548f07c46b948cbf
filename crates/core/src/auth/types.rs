use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

use super::AuthError;

/// Header naming the end user a request acts for.
///
/// Per-user state (exposure history, cursors) is partitioned by this id.
pub const USER_HEADER: &str = "x-user-id";

/// User id when the request names none.
pub const ANONYMOUS_USER: &str = "anonymous";

const MAX_USER_ID_LEN: usize = 128;

/// Request information for authentication
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

impl AuthRequest {
    /// User id from [`USER_HEADER`], or `fallback` when absent.
    pub fn user_id_or(&self, fallback: &str) -> Result<String, AuthError> {
        match self.headers.get(USER_HEADER) {
            Some(raw) => validate_user_id(raw.trim()).map(str::to_string),
            None => Ok(fallback.to_string()),
        }
    }
}

/// Accept ids made of ASCII alphanumerics and `._@-`, up to 128 chars.
pub fn validate_user_id(user_id: &str) -> Result<&str, AuthError> {
    let valid = !user_id.is_empty()
        && user_id.len() <= MAX_USER_ID_LEN
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-'));
    if valid {
        Ok(user_id)
    } else {
        Err(AuthError::InvalidCredentials(format!(
            "invalid {} header",
            USER_HEADER
        )))
    }
}

/// Authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub method: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, method: &str) -> Self {
        Self {
            user_id: user_id.into(),
            method: method.to_string(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_USER, "none")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(user: Option<&str>) -> AuthRequest {
        let mut headers = HashMap::new();
        if let Some(user) = user {
            headers.insert(USER_HEADER.to_string(), user.to_string());
        }
        AuthRequest {
            headers,
            source_ip: "127.0.0.1".parse().unwrap(),
        }
    }

    #[test]
    fn test_anonymous_identity() {
        let identity = Identity::anonymous();
        assert_eq!(identity.user_id, "anonymous");
        assert_eq!(identity.method, "none");
    }

    #[test]
    fn test_user_header() {
        assert_eq!(request(Some("alice")).user_id_or("x").unwrap(), "alice");
        assert_eq!(
            request(Some(" bob@example.com ")).user_id_or("x").unwrap(),
            "bob@example.com"
        );
        assert_eq!(request(None).user_id_or("fallback").unwrap(), "fallback");
    }

    #[test]
    fn test_invalid_user_header() {
        let long = "x".repeat(129);
        for bad in ["", "a b", "../etc", long.as_str()] {
            assert!(matches!(
                request(Some(bad)).user_id_or("x"),
                Err(AuthError::InvalidCredentials(_))
            ));
        }
    }

    #[test]
    fn test_identity_serialization() {
        let identity = Identity::new("user123", "api_key");
        let json = serde_json::to_string(&identity).unwrap();
        let deserialized: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, identity);
    }
}
