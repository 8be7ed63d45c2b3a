use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// Role allowed to delete history tickets.
pub const ADMIN_ROLE: &str = "admin";

/// Request information for authentication
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// Header names are lower-cased
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

impl AuthRequest {
    /// Token from `Authorization: Bearer <token>`, either case of "bearer".
    pub fn bearer_token(&self) -> Option<&str> {
        let header = self.headers.get("authorization")?;
        header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
    }
}

/// Authenticated identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    /// Display name recorded as `created_by`/`updated_by` on tickets
    pub name: String,
    pub method: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub claims: HashMap<String, serde_json::Value>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            name: "Anonymous".to_string(),
            method: "none".to_string(),
            roles: Vec::new(),
            claims: HashMap::new(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// Deletion needs the admin role, except when authentication is off.
    pub fn can_delete_history(&self) -> bool {
        self.method == "none" || self.has_role(ADMIN_ROLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_identity() {
        let identity = Identity::anonymous();
        assert_eq!(identity.user_id, "anonymous");
        assert_eq!(identity.method, "none");
        assert!(identity.roles.is_empty());
        assert!(identity.can_delete_history());
    }

    #[test]
    fn test_roles() {
        let identity = Identity {
            user_id: "u-1".to_string(),
            name: "Ari Setiawan".to_string(),
            method: "jwt".to_string(),
            roles: vec!["Admin".to_string()],
            claims: HashMap::new(),
        };
        assert!(identity.has_role("admin"));
        assert!(identity.can_delete_history());

        let technician = Identity {
            roles: vec!["technician".to_string()],
            ..identity
        };
        assert!(!technician.has_role(ADMIN_ROLE));
        assert!(!technician.can_delete_history());
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), "bearer abc".to_string());
        let request = AuthRequest {
            headers,
            source_ip: "127.0.0.1".parse::<IpAddr>().unwrap(),
        };
        assert_eq!(request.bearer_token(), Some("abc"));

        let request = AuthRequest {
            headers: HashMap::new(),
            source_ip: "127.0.0.1".parse::<IpAddr>().unwrap(),
        };
        assert_eq!(request.bearer_token(), None);
    }

    #[test]
    fn test_identity_serialization() {
        let identity = Identity {
            user_id: "user123".to_string(),
            name: "Budi".to_string(),
            method: "jwt".to_string(),
            roles: vec!["technician".to_string()],
            claims: {
                let mut map = HashMap::new();
                map.insert("iss".to_string(), serde_json::json!("assetlog-auth"));
                map
            },
        };

        let json = serde_json::to_string(&identity).unwrap();
        let deserialized: Identity = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.user_id, "user123");
        assert_eq!(deserialized.roles, vec!["technician".to_string()]);
        assert_eq!(
            deserialized.claims.get("iss"),
            Some(&serde_json::json!("assetlog-auth"))
        );
    }
}
