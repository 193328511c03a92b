use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;

use opsdesk_auth::{Permission, PermissionRegistry, PermissionSet, resolve_source_of_truth};
use opsdesk_core::UserId;
use opsdesk_identity::DepartmentId;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new().route("/source-of-truth", get(source_of_truth))
}

#[derive(Debug, Deserialize)]
pub struct SourceOfTruthQuery {
    pub user: Option<String>,
    pub department: Option<String>,
}

/// Provenance report over the full declared catalogue for one subject.
///
/// For a user, `inherited` marks codenames that reach the user only through
/// department membership. Departments have no inheritance of their own, so
/// their report never sets the flag.
pub async fn source_of_truth(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<SourceOfTruthQuery>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("change_user"), Permission::new("change_department")],
    ) {
        return errors::forbidden(e);
    }

    let (direct, inherited) = match (query.user, query.department) {
        (Some(user), None) => {
            let user_id: UserId = match user.parse() {
                Ok(v) => v,
                Err(_) => return errors::invalid_id("user"),
            };
            let Some(rm) = services.users.get(tenant.tenant_id(), &user_id) else {
                return errors::not_found();
            };
            let inherited = services
                .departments
                .inherited_for(tenant.tenant_id(), &user_id);
            (rm.direct_permissions, inherited)
        }
        (None, Some(department)) => {
            let department_id: DepartmentId = match department.parse() {
                Ok(v) => v,
                Err(_) => return errors::invalid_id("department"),
            };
            let Some(rm) = services.departments.get(tenant.tenant_id(), &department_id) else {
                return errors::not_found();
            };
            (rm.permissions, PermissionSet::new())
        }
        // No subject: the full declared catalogue, nothing active.
        (None, None) => (PermissionSet::new(), PermissionSet::new()),
        (Some(_), Some(_)) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_query",
                "at most one of ?user= or ?department= may be given",
            );
        }
    };

    let registry = PermissionRegistry::declared();
    let report = resolve_source_of_truth(&registry, &direct, &inherited);
    (StatusCode::OK, Json(report)).into_response()
}
