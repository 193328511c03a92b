use opsdesk_auth::UserRole;
use opsdesk_core::{TenantId, UserId};

/// Tenant context for a request.
///
/// Immutable, derived from the verified token, and present on every
/// authenticated route.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Principal context for a request (authenticated identity + claimed role).
///
/// The role here is the token's claim; where a user record exists in the
/// directory, the stored role takes precedence during authorization.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    claimed_role: UserRole,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, claimed_role: UserRole) -> Self {
        Self {
            user_id,
            claimed_role,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn claimed_role(&self) -> UserRole {
        self.claimed_role
    }
}
