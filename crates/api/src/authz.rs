//! API-side authorization guard.
//!
//! Permission checks read the user directory, not the token: a grant or a
//! membership change takes effect on the next request without re-issuing
//! tokens. A principal's effective set is direct grants ∪ permissions
//! inherited through department membership; the admin role and the wildcard
//! grant short-circuit every check.

use opsdesk_auth::{AuthzError, Permission, Principal, authorize};

use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

/// Assemble the fully resolved principal for the current request.
///
/// Principals without a directory record (bootstrap tokens) fall back to the
/// claimed role and its default permission set; stored users use the stored
/// role.
pub fn resolve_principal(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
) -> Principal {
    let tenant_id = tenant.tenant_id();
    let user_id = principal.user_id();

    match services.users.get(tenant_id, &user_id) {
        Some(user) => {
            let inherited = services.departments.inherited_for(tenant_id, &user_id);
            Principal {
                user_id,
                tenant_id,
                role: user.role,
                permissions: user.direct_permissions.union(&inherited),
            }
        }
        None => Principal {
            user_id,
            tenant_id,
            role: principal.claimed_role(),
            permissions: principal.claimed_role().default_permissions(),
        },
    }
}

/// Check every required permission before touching a handler body.
pub fn require(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    required: &[Permission],
) -> Result<(), AuthzError> {
    let resolved = resolve_principal(services, tenant, principal);
    for perm in required {
        authorize(&resolved, perm)?;
    }
    Ok(())
}
