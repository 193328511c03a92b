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
use opsdesk_core::{AggregateId, UserId};
use opsdesk_identity::{
    ChangeRole, CreateUser, DeleteUser, GrantPermissions, RevokePermissions, UpdateUser, User,
    UserCommand,
};
use opsdesk_organisation::{AddUsers, Organisation, OrganisationCommand, OrganisationId};

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/unsafe-create", post(unsafe_create_user))
        .route("/my-permissions", get(my_permissions))
        .route(
            "/:id",
            get(get_user)
                .put(update_user)
                .patch(update_user)
                .delete(delete_user),
        )
        .route("/:id/permissions", get(user_permissions))
        .route("/:id/permissions/grant", post(grant_user_permissions))
        .route("/:id/permissions/revoke", post(revoke_user_permissions))
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let items = services
        .users
        .list(tenant.tenant_id())
        .into_iter()
        .map(dto::user_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateUserRequest>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("add_user")],
    ) {
        return errors::forbidden(e);
    }

    let user_id = UserId::new();
    match dispatch_create(&services, &tenant, user_id, body) {
        Ok(committed) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": user_id.to_string(),
                "events_committed": committed,
            })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

/// Create a user and enrol them in the caller's organisation in one step.
pub async fn unsafe_create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateUserRequest>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("add_user")],
    ) {
        return errors::forbidden(e);
    }

    let Some(org) = services.organisations.get_by_tenant(tenant.tenant_id()) else {
        return errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "caller has no organisation",
        );
    };

    let user_id = UserId::new();
    let committed = match dispatch_create(&services, &tenant, user_id, body) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let org_id: OrganisationId = org.organisation_id;
    if let Err(e) = services.dispatch::<Organisation>(
        tenant.tenant_id(),
        AggregateId::from(org_id),
        "organisation",
        OrganisationCommand::AddUsers(AddUsers {
            organisation_id: org_id,
            user_ids: vec![user_id],
            occurred_at: Utc::now(),
        }),
        |_t, id| Organisation::empty(OrganisationId::from(id)),
    ) {
        return errors::dispatch_error_to_response(e);
    }

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": user_id.to_string(),
            "organisation_id": org_id.to_string(),
            "events_committed": committed,
        })),
    )
        .into_response()
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("view_user")],
    ) {
        return errors::forbidden(e);
    }

    let user_id: UserId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("user"),
    };
    match services.users.get(tenant.tenant_id(), &user_id) {
        Some(rm) => (StatusCode::OK, Json(dto::user_to_json(rm))).into_response(),
        None => errors::not_found(),
    }
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateUserRequest>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("change_user")],
    ) {
        return errors::forbidden(e);
    }

    let user_id: UserId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("user"),
    };

    let mut committed = 0usize;

    match services.dispatch::<User>(
        tenant.tenant_id(),
        AggregateId::from(user_id),
        "identity.user",
        UserCommand::Update(UpdateUser {
            tenant_id: tenant.tenant_id(),
            user_id,
            email: body.email,
            first_name: body.first_name,
            last_name: body.last_name,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| User::empty(aggregate_id.into()),
    ) {
        Ok(c) => committed += c.len(),
        Err(e) => return errors::dispatch_error_to_response(e),
    }

    if let Some(role) = body.role {
        match services.dispatch::<User>(
            tenant.tenant_id(),
            AggregateId::from(user_id),
            "identity.user",
            UserCommand::ChangeRole(ChangeRole {
                tenant_id: tenant.tenant_id(),
                user_id,
                role,
                occurred_at: Utc::now(),
            }),
            |_t, aggregate_id| User::empty(aggregate_id.into()),
        ) {
            Ok(c) => committed += c.len(),
            Err(e) => return errors::dispatch_error_to_response(e),
        }
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": user_id.to_string(),
            "events_committed": committed,
        })),
    )
        .into_response()
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("delete_user")],
    ) {
        return errors::forbidden(e);
    }

    let user_id: UserId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("user"),
    };
    match services.dispatch::<User>(
        tenant.tenant_id(),
        AggregateId::from(user_id),
        "identity.user",
        UserCommand::Delete(DeleteUser {
            tenant_id: tenant.tenant_id(),
            user_id,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| User::empty(aggregate_id.into()),
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Effective permission codenames for the caller.
pub async fn my_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let effective = services
        .effective_permissions(tenant.tenant_id(), &principal.user_id())
        .unwrap_or_else(|| principal.claimed_role().default_permissions());

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "permissions": effective.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
        })),
    )
        .into_response()
}

/// Effective permission codenames for one user. Callers may always inspect
/// themselves; inspecting anyone else is a management-role operation.
pub async fn user_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let user_id: UserId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("user"),
    };

    if user_id != principal.user_id() {
        let resolved = crate::authz::resolve_principal(&services, &tenant, &principal);
        if !resolved.role.is_management() {
            return errors::json_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                "only managers and admins may inspect other users' permissions",
            );
        }
    }

    match services.effective_permissions(tenant.tenant_id(), &user_id) {
        Some(effective) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "user_id": user_id.to_string(),
                "permissions": effective.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        None => errors::not_found(),
    }
}

pub async fn grant_user_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PermissionsRequest>,
) -> axum::response::Response {
    user_permission_change(services, tenant, principal, id, body, true).await
}

pub async fn revoke_user_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PermissionsRequest>,
) -> axum::response::Response {
    user_permission_change(services, tenant, principal, id, body, false).await
}

async fn user_permission_change(
    services: Arc<AppServices>,
    tenant: TenantContext,
    principal: PrincipalContext,
    id: String,
    body: dto::PermissionsRequest,
    grant: bool,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("change_user")],
    ) {
        return errors::forbidden(e);
    }

    let user_id: UserId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("user"),
    };
    let permissions = common::parse_permissions(body.permissions);

    let cmd = if grant {
        UserCommand::GrantPermissions(GrantPermissions {
            tenant_id: tenant.tenant_id(),
            user_id,
            permissions,
            occurred_at: Utc::now(),
        })
    } else {
        UserCommand::RevokePermissions(RevokePermissions {
            tenant_id: tenant.tenant_id(),
            user_id,
            permissions,
            occurred_at: Utc::now(),
        })
    };

    match services.dispatch::<User>(
        tenant.tenant_id(),
        AggregateId::from(user_id),
        "identity.user",
        cmd,
        |_t, aggregate_id| User::empty(aggregate_id.into()),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": user_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Create + seed role-default grants. Returns the total committed count.
fn dispatch_create(
    services: &AppServices,
    tenant: &TenantContext,
    user_id: UserId,
    body: dto::CreateUserRequest,
) -> Result<usize, axum::response::Response> {
    let role = body.role.unwrap_or_default();
    let mut committed = 0usize;

    let created = services
        .dispatch::<User>(
            tenant.tenant_id(),
            AggregateId::from(user_id),
            "identity.user",
            UserCommand::Create(CreateUser {
                tenant_id: tenant.tenant_id(),
                user_id,
                email: body.email,
                first_name: body.first_name,
                last_name: body.last_name,
                role,
                occurred_at: Utc::now(),
            }),
            |_t, aggregate_id| User::empty(aggregate_id.into()),
        )
        .map_err(errors::dispatch_error_to_response)?;
    committed += created.len();

    // Role defaults materialize as direct grants so the provenance report
    // can tell them apart from department inheritance.
    let seeded = services
        .dispatch::<User>(
            tenant.tenant_id(),
            AggregateId::from(user_id),
            "identity.user",
            UserCommand::GrantPermissions(GrantPermissions {
                tenant_id: tenant.tenant_id(),
                user_id,
                permissions: role.default_permissions().iter().cloned().collect(),
                occurred_at: Utc::now(),
            }),
            |_t, aggregate_id| User::empty(aggregate_id.into()),
        )
        .map_err(errors::dispatch_error_to_response)?;
    committed += seeded.len();

    Ok(committed)
}
