//! Users projection: the per-tenant user directory.
//!
//! Carries each user's profile, role and *direct* permission set. Inherited
//! permissions are not materialized here; they come from the departments
//! projection so that membership changes take effect without touching user
//! records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use opsdesk_auth::{PermissionSet, UserRole};
use opsdesk_core::{TenantId, UserId};
use opsdesk_events::EventEnvelope;
use opsdesk_identity::UserEvent;

use crate::read_model::TenantStore;

/// User read model for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserReadModel {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub direct_permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Projection that maintains the user directory per tenant.
pub struct UsersProjection<S> {
    store: S,
}

impl<S> UsersProjection<S>
where
    S: TenantStore<UserId, UserReadModel>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<serde_json::Value>,
    ) -> Result<(), anyhow::Error> {
        if envelope.aggregate_type() != "identity.user" {
            return Ok(());
        }

        let event: UserEvent = serde_json::from_value(envelope.payload().clone())?;
        let tenant_id = envelope.tenant_id();

        match event {
            UserEvent::Created(e) => {
                let model = UserReadModel {
                    user_id: e.user_id,
                    tenant_id: e.tenant_id,
                    email: e.email,
                    first_name: e.first_name,
                    last_name: e.last_name,
                    role: e.role,
                    direct_permissions: PermissionSet::new(),
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                };
                self.store.upsert(tenant_id, e.user_id, model);
            }
            UserEvent::Updated(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &e.user_id) {
                    if let Some(email) = e.email {
                        model.email = email;
                    }
                    if let Some(first) = e.first_name {
                        model.first_name = first;
                    }
                    if let Some(last) = e.last_name {
                        model.last_name = last;
                    }
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.user_id, model);
                }
            }
            UserEvent::RoleChanged(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &e.user_id) {
                    model.role = e.role;
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.user_id, model);
                }
            }
            UserEvent::PermissionsGranted(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &e.user_id) {
                    model.direct_permissions.extend(e.permissions);
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.user_id, model);
                }
            }
            UserEvent::PermissionsRevoked(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &e.user_id) {
                    for perm in &e.permissions {
                        model.direct_permissions.remove(perm);
                    }
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.user_id, model);
                }
            }
            UserEvent::Deleted(e) => {
                self.store.remove(tenant_id, &e.user_id);
            }
        }

        Ok(())
    }

    pub fn get(&self, tenant_id: TenantId, user_id: &UserId) -> Option<UserReadModel> {
        self.store.get(tenant_id, user_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<UserReadModel> {
        let mut users = self.store.list(tenant_id);
        users.sort_by(|a, b| a.email.cmp(&b.email));
        users
    }

    /// Get a user by email (linear scan).
    pub fn get_by_email(&self, tenant_id: TenantId, email: &str) -> Option<UserReadModel> {
        let normalized = email.trim().to_lowercase();
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|u| u.email == normalized)
    }
}
