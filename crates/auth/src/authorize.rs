use thiserror::Error;

use opsdesk_core::{TenantId, UserId};

use crate::{Permission, PermissionSet, UserRole};

/// A fully resolved principal for authorization decisions.
///
/// Construction is intentionally decoupled from storage and transport: the
/// API layer assembles this from the token claims plus the user directory
/// (direct grants ∪ department-inherited grants).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub role: UserRole,
    pub permissions: PermissionSet,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal for a single required permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
///
/// Admin principals and wildcard grants short-circuit to allow.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.role.is_admin() || principal.permissions.has_wildcard() {
        return Ok(());
    }

    if principal.permissions.contains(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: UserRole, perms: &[&'static str]) -> Principal {
        Principal {
            user_id: UserId::new(),
            tenant_id: TenantId::new(),
            role,
            permissions: perms.iter().copied().map(Permission::from).collect(),
        }
    }

    #[test]
    fn direct_grant_allows() {
        let p = principal(UserRole::Employee, &["change_user"]);
        assert!(authorize(&p, &Permission::new("change_user")).is_ok());
    }

    #[test]
    fn missing_grant_denies_with_codename() {
        let p = principal(UserRole::Employee, &["view_user"]);
        let err = authorize(&p, &Permission::new("delete_user")).unwrap_err();
        assert_eq!(err, AuthzError::Forbidden("delete_user".to_string()));
    }

    #[test]
    fn admin_role_short_circuits() {
        let p = principal(UserRole::Admin, &[]);
        assert!(authorize(&p, &Permission::new("delete_organisation")).is_ok());
    }

    #[test]
    fn wildcard_grant_short_circuits() {
        let p = principal(UserRole::Employee, &["*"]);
        assert!(authorize(&p, &Permission::new("delete_organisation")).is_ok());
    }
}
