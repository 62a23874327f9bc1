//! Caller identity
//!
//! Who is invoking an operation and with what capability. Authorization is
//! an explicit input to every engine operation rather than a cross-cutting
//! framework concern, so the contracts stay visible and testable.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capability level of a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "USER" => Some(Role::User),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The authenticated caller of an operation.
///
/// Resolved by the API layer from an opaque token; the engine itself never
/// authenticates, it only consumes this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// ID of the calling user
    pub user_id: i64,

    /// Capability of the calling user
    pub role: Role,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl Identity {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id,
            role: Role::User,
            correlation_id: None,
        }
    }

    pub fn admin(user_id: i64) -> Self {
        Self {
            user_id,
            role: Role::Admin,
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        assert_eq!(Role::from_str_opt("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::from_str_opt("USER"), Some(Role::User));
        assert_eq!(Role::from_str_opt("ROOT"), None);
        assert_eq!(Role::Admin.as_str(), "ADMIN");
    }

    #[test]
    fn test_identity_builder() {
        let correlation_id = Uuid::new_v4();
        let identity = Identity::user(7).with_correlation_id(correlation_id);

        assert_eq!(identity.user_id, 7);
        assert!(!identity.is_admin());
        assert_eq!(identity.correlation_id, Some(correlation_id));
        assert!(Identity::admin(1).is_admin());
    }
}
