use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use opsdesk_auth::Permission;
use opsdesk_core::AggregateId;
use opsdesk_identity::{
    AddMembers, CreateDepartment, DeleteDepartment, Department, DepartmentCommand, DepartmentId,
    GrantDepartmentPermissions, RemoveMembers, RenameDepartment, RevokeDepartmentPermissions,
};

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_department).get(list_departments))
        .route(
            "/:id",
            get(get_department)
                .put(rename_department)
                .patch(rename_department)
                .delete(delete_department),
        )
        .route("/:id/permissions/grant", post(grant_permissions))
        .route("/:id/permissions/revoke", post(revoke_permissions))
        .route("/:id/members/add", post(add_members))
        .route("/:id/members/remove", post(remove_members))
}

pub async fn list_departments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("view_department")],
    ) {
        return errors::forbidden(e);
    }
    let items = services
        .departments
        .list(tenant.tenant_id())
        .into_iter()
        .map(dto::department_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn create_department(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateDepartmentRequest>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("add_department")],
    ) {
        return errors::forbidden(e);
    }

    let department_id = DepartmentId::new();
    match services.dispatch::<Department>(
        tenant.tenant_id(),
        AggregateId::from(department_id),
        "identity.department",
        DepartmentCommand::Create(CreateDepartment {
            tenant_id: tenant.tenant_id(),
            department_id,
            name: body.name,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Department::empty(aggregate_id.into()),
    ) {
        Ok(committed) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": department_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_department(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("view_department")],
    ) {
        return errors::forbidden(e);
    }

    let department_id: DepartmentId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("department"),
    };
    match services.departments.get(tenant.tenant_id(), &department_id) {
        Some(rm) => (StatusCode::OK, Json(dto::department_to_json(rm))).into_response(),
        None => errors::not_found(),
    }
}

pub async fn rename_department(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RenameDepartmentRequest>,
) -> axum::response::Response {
    let department_id: DepartmentId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("department"),
    };
    dispatch_change(
        services,
        tenant,
        principal,
        department_id,
        DepartmentCommand::Rename(RenameDepartment {
            tenant_id: tenant.tenant_id(),
            department_id,
            name: body.name,
            occurred_at: Utc::now(),
        }),
    )
}

pub async fn delete_department(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("delete_department")],
    ) {
        return errors::forbidden(e);
    }

    let department_id: DepartmentId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("department"),
    };
    match services.dispatch::<Department>(
        tenant.tenant_id(),
        AggregateId::from(department_id),
        "identity.department",
        DepartmentCommand::Delete(DeleteDepartment {
            tenant_id: tenant.tenant_id(),
            department_id,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Department::empty(aggregate_id.into()),
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn grant_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PermissionsRequest>,
) -> axum::response::Response {
    let department_id: DepartmentId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("department"),
    };
    dispatch_change(
        services,
        tenant,
        principal,
        department_id,
        DepartmentCommand::GrantPermissions(GrantDepartmentPermissions {
            tenant_id: tenant.tenant_id(),
            department_id,
            permissions: common::parse_permissions(body.permissions),
            occurred_at: Utc::now(),
        }),
    )
}

pub async fn revoke_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PermissionsRequest>,
) -> axum::response::Response {
    let department_id: DepartmentId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("department"),
    };
    dispatch_change(
        services,
        tenant,
        principal,
        department_id,
        DepartmentCommand::RevokePermissions(RevokeDepartmentPermissions {
            tenant_id: tenant.tenant_id(),
            department_id,
            permissions: common::parse_permissions(body.permissions),
            occurred_at: Utc::now(),
        }),
    )
}

pub async fn add_members(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::MembersRequest>,
) -> axum::response::Response {
    let department_id: DepartmentId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("department"),
    };
    let user_ids = match common::parse_user_ids(&body.user_ids) {
        Ok(ids) => ids.into_iter().collect(),
        Err(resp) => return resp,
    };
    dispatch_change(
        services,
        tenant,
        principal,
        department_id,
        DepartmentCommand::AddMembers(AddMembers {
            tenant_id: tenant.tenant_id(),
            department_id,
            user_ids,
            occurred_at: Utc::now(),
        }),
    )
}

pub async fn remove_members(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::MembersRequest>,
) -> axum::response::Response {
    let department_id: DepartmentId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("department"),
    };
    let user_ids = match common::parse_user_ids(&body.user_ids) {
        Ok(ids) => ids.into_iter().collect(),
        Err(resp) => return resp,
    };
    dispatch_change(
        services,
        tenant,
        principal,
        department_id,
        DepartmentCommand::RemoveMembers(RemoveMembers {
            tenant_id: tenant.tenant_id(),
            department_id,
            user_ids,
            occurred_at: Utc::now(),
        }),
    )
}

/// All mutations on an existing department sit behind `change_department`.
fn dispatch_change(
    services: Arc<AppServices>,
    tenant: TenantContext,
    principal: PrincipalContext,
    department_id: DepartmentId,
    cmd: DepartmentCommand,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("change_department")],
    ) {
        return errors::forbidden(e);
    }

    match services.dispatch::<Department>(
        tenant.tenant_id(),
        AggregateId::from(department_id),
        "identity.department",
        cmd,
        |_t, aggregate_id| Department::empty(aggregate_id.into()),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": department_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
