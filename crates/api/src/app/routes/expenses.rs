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
    CreateExpense, DeleteExpense, Expense, ExpenseCommand, ExpenseDetails, ExpenseId,
    UpdateExpense, VendorId,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_expense).get(list_expenses))
        .route(
            "/:id",
            get(get_expense)
                .put(update_expense)
                .patch(update_expense)
                .delete(delete_expense),
        )
}

fn parse_details(body: dto::ExpenseRequest) -> Result<ExpenseDetails, axum::response::Response> {
    let vendor_id = match body.vendor_id {
        Some(raw) => Some(raw.parse::<VendorId>().map_err(|_| errors::invalid_id("vendor"))?),
        None => None,
    };
    Ok(ExpenseDetails {
        amount_minor: body.amount_minor,
        tax_inclusive: body.tax_inclusive,
        date: body.date,
        notes: body.notes,
        account_id: body.account_id,
        paid_through_id: body.paid_through_id,
        vendor_id,
    })
}

pub async fn list_expenses(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("view_expense")],
    ) {
        return errors::forbidden(e);
    }
    let items = services
        .expenses
        .list(tenant.tenant_id())
        .into_iter()
        .map(dto::expense_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn create_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::ExpenseRequest>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("add_expense")],
    ) {
        return errors::forbidden(e);
    }

    let details = match parse_details(body) {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    let expense_id = ExpenseId::new();
    match services.dispatch::<Expense>(
        tenant.tenant_id(),
        AggregateId::from(expense_id),
        "purchase.expense",
        ExpenseCommand::Create(CreateExpense {
            tenant_id: tenant.tenant_id(),
            expense_id,
            details,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Expense::empty(aggregate_id.into()),
    ) {
        Ok(committed) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": expense_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("view_expense")],
    ) {
        return errors::forbidden(e);
    }

    let expense_id: ExpenseId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("expense"),
    };
    match services.expenses.get(tenant.tenant_id(), &expense_id) {
        Some(rm) => (StatusCode::OK, Json(dto::expense_to_json(rm))).into_response(),
        None => errors::not_found(),
    }
}

pub async fn update_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ExpenseRequest>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("change_expense")],
    ) {
        return errors::forbidden(e);
    }

    let expense_id: ExpenseId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("expense"),
    };
    let details = match parse_details(body) {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    match services.dispatch::<Expense>(
        tenant.tenant_id(),
        AggregateId::from(expense_id),
        "purchase.expense",
        ExpenseCommand::Update(UpdateExpense {
            tenant_id: tenant.tenant_id(),
            expense_id,
            details,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Expense::empty(aggregate_id.into()),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": expense_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn delete_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(
        &services,
        &tenant,
        &principal,
        &[Permission::new("delete_expense")],
    ) {
        return errors::forbidden(e);
    }

    let expense_id: ExpenseId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("expense"),
    };
    match services.dispatch::<Expense>(
        tenant.tenant_id(),
        AggregateId::from(expense_id),
        "purchase.expense",
        ExpenseCommand::Delete(DeleteExpense {
            tenant_id: tenant.tenant_id(),
            expense_id,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Expense::empty(aggregate_id.into()),
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
