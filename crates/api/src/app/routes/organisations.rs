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
use opsdesk_core::{AggregateId, TenantId, UserId};
use opsdesk_identity::{GrantPermissions, User, UserCommand};
use opsdesk_organisation::{
    AddUsers, CreateOrganisation, DeleteOrganisation, Organisation, OrganisationCommand,
    OrganisationId, RemoveUsers, UpdateOrganisation,
};

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_organisation).get(list_organisations))
        .route("/add-users", post(add_users))
        .route("/remove-users", post(remove_users))
        .route(
            "/:id",
            get(get_organisation)
                .put(update_organisation)
                .patch(update_organisation)
                .delete(delete_organisation),
        )
}

/// Creating an organisation provisions a fresh tenant and enrols the caller
/// as the first member.
pub async fn create_organisation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateOrganisationRequest>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("add_organisation")],
    ) {
        return errors::forbidden(e);
    }

    let organisation_id = OrganisationId::new();
    let new_tenant = TenantId::new();
    match services.dispatch::<Organisation>(
        new_tenant,
        AggregateId::from(organisation_id),
        "organisation",
        OrganisationCommand::Create(CreateOrganisation {
            organisation_id,
            tenant_id: new_tenant,
            name: body.name,
            created_by: principal.user_id(),
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Organisation::empty(aggregate_id.into()),
    ) {
        Ok(committed) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": organisation_id.to_string(),
                "tenant_id": new_tenant.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Cross-tenant listing: plain `view_organisation` is deliberately not
/// enough here.
pub async fn list_organisations(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("custom_view_all_organisations")],
    ) {
        return errors::forbidden(e);
    }
    let items = services
        .organisations
        .list_all()
        .into_iter()
        .map(dto::organisation_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_organisation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("view_organisation")],
    ) {
        return errors::forbidden(e);
    }

    let organisation_id: OrganisationId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("organisation"),
    };
    let Some(record) = services.organisations.get(&organisation_id) else {
        return errors::not_found();
    };

    // Other tenants' organisations are visible only with the cross-tenant
    // listing permission; absence and lack of access look the same.
    if record.tenant_id != tenant.tenant_id()
        && crate::authz::require(
            &services,
            &tenant,
            &principal,
            &[Permission::new("custom_view_all_organisations")],
        )
        .is_err()
    {
        return errors::not_found();
    }

    (StatusCode::OK, Json(dto::organisation_to_json(record))).into_response()
}

pub async fn update_organisation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateOrganisationRequest>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("change_organisation")],
    ) {
        return errors::forbidden(e);
    }

    let organisation_id: OrganisationId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("organisation"),
    };
    match services.dispatch::<Organisation>(
        tenant.tenant_id(),
        AggregateId::from(organisation_id),
        "organisation",
        OrganisationCommand::Update(UpdateOrganisation {
            organisation_id,
            name: body.name,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Organisation::empty(aggregate_id.into()),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": organisation_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn delete_organisation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("delete_organisation")],
    ) {
        return errors::forbidden(e);
    }

    let organisation_id: OrganisationId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("organisation"),
    };
    match services.dispatch::<Organisation>(
        tenant.tenant_id(),
        AggregateId::from(organisation_id),
        "organisation",
        OrganisationCommand::Delete(DeleteOrganisation {
            organisation_id,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Organisation::empty(aggregate_id.into()),
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Bulk-enrol users into the caller's organisation. Newly enrolled users are
/// seeded with their role's default permission set.
pub async fn add_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::OrganisationUsersRequest>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("custom_update_users")],
    ) {
        return errors::forbidden(e);
    }

    let Some(record) = services.organisations.get_by_tenant(tenant.tenant_id()) else {
        return errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "caller has no organisation",
        );
    };

    let batch = match common::parse_user_ids(&body.user_ids) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };
    let (added, exist): (Vec<UserId>, Vec<UserId>) = batch
        .iter()
        .copied()
        .partition(|id| !record.members.contains(id));

    if !added.is_empty() {
        if let Err(e) = services.dispatch::<Organisation>(
            tenant.tenant_id(),
            AggregateId::from(record.organisation_id),
            "organisation",
            OrganisationCommand::AddUsers(AddUsers {
                organisation_id: record.organisation_id,
                user_ids: added.clone(),
                occurred_at: Utc::now(),
            }),
            |_t, aggregate_id| Organisation::empty(aggregate_id.into()),
        ) {
            return errors::dispatch_error_to_response(e);
        }
    }

    for &user_id in &added {
        let Some(user) = services.users.get(tenant.tenant_id(), &user_id) else {
            tracing::warn!(user_id = %user_id, "enrolled user has no directory record; skipping default grants");
            continue;
        };
        if let Err(e) = services.dispatch::<User>(
            tenant.tenant_id(),
            AggregateId::from(user_id),
            "identity.user",
            UserCommand::GrantPermissions(GrantPermissions {
                tenant_id: tenant.tenant_id(),
                user_id,
                permissions: user.role.default_permissions().iter().cloned().collect(),
                occurred_at: Utc::now(),
            }),
            |_t, aggregate_id| User::empty(aggregate_id.into()),
        ) {
            return errors::dispatch_error_to_response(e);
        }
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "added": added.len(),
            "exist": exist.len(),
        })),
    )
        .into_response()
}

pub async fn remove_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::OrganisationUsersRequest>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("custom_update_users")],
    ) {
        return errors::forbidden(e);
    }

    let Some(record) = services.organisations.get_by_tenant(tenant.tenant_id()) else {
        return errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "caller has no organisation",
        );
    };

    let batch = match common::parse_user_ids(&body.user_ids) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };
    let (removed, nonexistent): (Vec<UserId>, Vec<UserId>) = batch
        .iter()
        .copied()
        .partition(|id| record.members.contains(id));

    if !removed.is_empty() {
        if let Err(e) = services.dispatch::<Organisation>(
            tenant.tenant_id(),
            AggregateId::from(record.organisation_id),
            "organisation",
            OrganisationCommand::RemoveUsers(RemoveUsers {
                organisation_id: record.organisation_id,
                user_ids: removed.clone(),
                occurred_at: Utc::now(),
            }),
            |_t, aggregate_id| Organisation::empty(aggregate_id.into()),
        ) {
            return errors::dispatch_error_to_response(e);
        }
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "removed": removed.len(),
            "nonexistent": nonexistent.len(),
        })),
    )
        .into_response()
}
