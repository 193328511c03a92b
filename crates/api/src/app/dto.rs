use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use opsdesk_auth::UserRole;
use opsdesk_infra::projections::{
    DepartmentReadModel, ExpenseReadModel, UserReadModel, VendorReadModel,
};
use opsdesk_infra::read_model::OrganisationRecord;
use opsdesk_purchase::{ExpenseDetails, VendorProfile};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<UserRole>,
}

/// Shared by PUT and PATCH: omitted fields are untouched.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionsRequest {
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDepartmentRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameDepartmentRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct MembersRequest {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrganisationRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrganisationRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct OrganisationUsersRequest {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct VendorRequest {
    pub display_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub shipping_address: Option<String>,
}

impl VendorRequest {
    pub fn into_profile(self) -> VendorProfile {
        VendorProfile {
            display_name: self.display_name,
            email: self.email,
            phone: self.phone,
            shipping_address: self.shipping_address,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExpenseRequest {
    pub amount_minor: i64,
    pub tax_inclusive: bool,
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub account_id: Uuid,
    pub paid_through_id: Uuid,
    pub vendor_id: Option<String>,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn user_to_json(rm: UserReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.user_id.to_string(),
        "email": rm.email,
        "first_name": rm.first_name,
        "last_name": rm.last_name,
        "role": rm.role.as_str(),
        "direct_permissions": rm.direct_permissions.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
        "created_at": rm.created_at.to_rfc3339(),
        "updated_at": rm.updated_at.to_rfc3339(),
    })
}

pub fn department_to_json(rm: DepartmentReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.department_id.to_string(),
        "name": rm.name,
        "permissions": rm.permissions.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
        "members": rm.members.iter().map(|u| u.to_string()).collect::<Vec<_>>(),
        "created_at": rm.created_at.to_rfc3339(),
        "updated_at": rm.updated_at.to_rfc3339(),
    })
}

pub fn organisation_to_json(rm: OrganisationRecord) -> serde_json::Value {
    serde_json::json!({
        "id": rm.organisation_id.to_string(),
        "tenant_id": rm.tenant_id.to_string(),
        "name": rm.name,
        "slug": rm.slug.as_str(),
        "members": rm.members.iter().map(|u| u.to_string()).collect::<Vec<_>>(),
        "created_at": rm.created_at.to_rfc3339(),
        "updated_at": rm.updated_at.to_rfc3339(),
    })
}

pub fn vendor_to_json(rm: VendorReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.vendor_id.to_string(),
        "display_name": rm.profile.display_name,
        "email": rm.profile.email,
        "phone": rm.profile.phone,
        "shipping_address": rm.profile.shipping_address,
        "created_at": rm.created_at.to_rfc3339(),
        "updated_at": rm.updated_at.to_rfc3339(),
    })
}

pub fn expense_to_json(rm: ExpenseReadModel) -> serde_json::Value {
    let ExpenseDetails {
        amount_minor,
        tax_inclusive,
        date,
        notes,
        account_id,
        paid_through_id,
        vendor_id,
    } = rm.details;
    serde_json::json!({
        "id": rm.expense_id.to_string(),
        "amount_minor": amount_minor,
        "tax_inclusive": tax_inclusive,
        "date": date.to_string(),
        "notes": notes,
        "account_id": account_id.to_string(),
        "paid_through_id": paid_through_id.to_string(),
        "vendor_id": vendor_id.map(|v| v.to_string()),
        "created_at": rm.created_at.to_rfc3339(),
        "updated_at": rm.updated_at.to_rfc3339(),
    })
}
