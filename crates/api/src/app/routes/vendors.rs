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
use opsdesk_purchase::{
    CreateVendor, DeleteVendor, UpdateVendor, Vendor, VendorCommand, VendorId,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_vendor).get(list_vendors))
        .route(
            "/:id",
            get(get_vendor)
                .put(update_vendor)
                .patch(update_vendor)
                .delete(delete_vendor),
        )
}

pub async fn list_vendors(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("view_vendor")],
    ) {
        return errors::forbidden(e);
    }
    let items = services
        .vendors
        .list(tenant.tenant_id())
        .into_iter()
        .map(dto::vendor_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn create_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::VendorRequest>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("add_vendor")],
    ) {
        return errors::forbidden(e);
    }

    let vendor_id = VendorId::new();
    match services.dispatch::<Vendor>(
        tenant.tenant_id(),
        AggregateId::from(vendor_id),
        "purchase.vendor",
        VendorCommand::Create(CreateVendor {
            tenant_id: tenant.tenant_id(),
            vendor_id,
            profile: body.into_profile(),
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Vendor::empty(aggregate_id.into()),
    ) {
        Ok(committed) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": vendor_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("view_vendor")],
    ) {
        return errors::forbidden(e);
    }

    let vendor_id: VendorId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("vendor"),
    };
    match services.vendors.get(tenant.tenant_id(), &vendor_id) {
        Some(rm) => (StatusCode::OK, Json(dto::vendor_to_json(rm))).into_response(),
        None => errors::not_found(),
    }
}

pub async fn update_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::VendorRequest>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("change_vendor")],
    ) {
        return errors::forbidden(e);
    }

    let vendor_id: VendorId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("vendor"),
    };
    match services.dispatch::<Vendor>(
        tenant.tenant_id(),
        AggregateId::from(vendor_id),
        "purchase.vendor",
        VendorCommand::Update(UpdateVendor {
            tenant_id: tenant.tenant_id(),
            vendor_id,
            profile: body.into_profile(),
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Vendor::empty(aggregate_id.into()),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": vendor_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn delete_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("delete_vendor")],
    ) {
        return errors::forbidden(e);
    }

    let vendor_id: VendorId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("vendor"),
    };
    match services.dispatch::<Vendor>(
        tenant.tenant_id(),
        AggregateId::from(vendor_id),
        "purchase.vendor",
        VendorCommand::Delete(DeleteVendor {
            tenant_id: tenant.tenant_id(),
            vendor_id,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Vendor::empty(aggregate_id.into()),
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
