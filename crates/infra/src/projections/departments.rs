//! Departments projection.
//!
//! Besides the per-department view this projection answers the inheritance
//! question: the permissions a user inherits are the union of the direct
//! permission sets of every department the user belongs to.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use opsdesk_auth::PermissionSet;
use opsdesk_core::{TenantId, UserId};
use opsdesk_events::EventEnvelope;
use opsdesk_identity::{DepartmentEvent, DepartmentId};

use crate::read_model::TenantStore;

/// Department read model for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentReadModel {
    pub department_id: DepartmentId,
    pub tenant_id: TenantId,
    pub name: String,
    pub permissions: PermissionSet,
    pub members: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Projection that maintains departments per tenant.
pub struct DepartmentsProjection<S> {
    store: S,
}

impl<S> DepartmentsProjection<S>
where
    S: TenantStore<DepartmentId, DepartmentReadModel>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<serde_json::Value>,
    ) -> Result<(), anyhow::Error> {
        if envelope.aggregate_type() != "identity.department" {
            return Ok(());
        }

        let event: DepartmentEvent = serde_json::from_value(envelope.payload().clone())?;
        let tenant_id = envelope.tenant_id();

        match event {
            DepartmentEvent::Created(e) => {
                let model = DepartmentReadModel {
                    department_id: e.department_id,
                    tenant_id: e.tenant_id,
                    name: e.name,
                    permissions: PermissionSet::new(),
                    members: BTreeSet::new(),
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                };
                self.store.upsert(tenant_id, e.department_id, model);
            }
            DepartmentEvent::Renamed(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &e.department_id) {
                    model.name = e.name;
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.department_id, model);
                }
            }
            DepartmentEvent::PermissionsGranted(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &e.department_id) {
                    model.permissions.extend(e.permissions);
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.department_id, model);
                }
            }
            DepartmentEvent::PermissionsRevoked(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &e.department_id) {
                    for perm in &e.permissions {
                        model.permissions.remove(perm);
                    }
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.department_id, model);
                }
            }
            DepartmentEvent::MembersAdded(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &e.department_id) {
                    model.members.extend(e.user_ids.iter().copied());
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.department_id, model);
                }
            }
            DepartmentEvent::MembersRemoved(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &e.department_id) {
                    for id in &e.user_ids {
                        model.members.remove(id);
                    }
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.department_id, model);
                }
            }
            DepartmentEvent::Deleted(e) => {
                self.store.remove(tenant_id, &e.department_id);
            }
        }

        Ok(())
    }

    pub fn get(&self, tenant_id: TenantId, department_id: &DepartmentId) -> Option<DepartmentReadModel> {
        self.store.get(tenant_id, department_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<DepartmentReadModel> {
        let mut departments = self.store.list(tenant_id);
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        departments
    }

    /// Union of the direct permission sets of every department the user is a
    /// member of. Empty set if the user belongs to no department.
    pub fn inherited_for(&self, tenant_id: TenantId, user_id: &UserId) -> PermissionSet {
        let mut inherited = PermissionSet::new();
        for dept in self.store.list(tenant_id) {
            if dept.members.contains(user_id) {
                inherited = inherited.union(&dept.permissions);
            }
        }
        inherited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use opsdesk_auth::Permission;
    use opsdesk_core::AggregateId;
    use opsdesk_events::Event;
    use opsdesk_identity::{
        DepartmentCreated, DepartmentPermissionsGranted, MembersAdded, MembersRemoved,
    };
    use uuid::Uuid;

    use crate::read_model::InMemoryTenantStore;

    fn envelope(
        tenant_id: TenantId,
        department_id: DepartmentId,
        event: DepartmentEvent,
    ) -> EventEnvelope<serde_json::Value> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            AggregateId::from(department_id),
            "identity.department",
            event.event_type(),
            1,
            serde_json::to_value(&event).unwrap(),
        )
    }

    fn seed_department(
        projection: &DepartmentsProjection<Arc<InMemoryTenantStore<DepartmentId, DepartmentReadModel>>>,
        tenant_id: TenantId,
        name: &str,
        perms: &[&'static str],
        members: &[UserId],
    ) -> DepartmentId {
        let department_id = DepartmentId::new();
        projection
            .apply_envelope(&envelope(
                tenant_id,
                department_id,
                DepartmentEvent::Created(DepartmentCreated {
                    tenant_id,
                    department_id,
                    name: name.to_string(),
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                tenant_id,
                department_id,
                DepartmentEvent::PermissionsGranted(DepartmentPermissionsGranted {
                    tenant_id,
                    department_id,
                    permissions: perms.iter().copied().map(Permission::from).collect(),
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                tenant_id,
                department_id,
                DepartmentEvent::MembersAdded(MembersAdded {
                    tenant_id,
                    department_id,
                    user_ids: members.to_vec(),
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();
        department_id
    }

    #[test]
    fn inherited_is_union_over_memberships() {
        let projection = DepartmentsProjection::new(Arc::new(InMemoryTenantStore::new()));
        let tenant_id = TenantId::new();
        let alice = UserId::new();
        let bob = UserId::new();

        seed_department(&projection, tenant_id, "Procurement", &["view_vendor"], &[alice, bob]);
        seed_department(&projection, tenant_id, "Finance", &["view_expense"], &[alice]);

        let alice_inherited = projection.inherited_for(tenant_id, &alice);
        assert!(alice_inherited.contains_codename("view_vendor"));
        assert!(alice_inherited.contains_codename("view_expense"));

        let bob_inherited = projection.inherited_for(tenant_id, &bob);
        assert!(bob_inherited.contains_codename("view_vendor"));
        assert!(!bob_inherited.contains_codename("view_expense"));
    }

    #[test]
    fn removing_member_drops_inheritance() {
        let projection = DepartmentsProjection::new(Arc::new(InMemoryTenantStore::new()));
        let tenant_id = TenantId::new();
        let alice = UserId::new();

        let department_id =
            seed_department(&projection, tenant_id, "Procurement", &["view_vendor"], &[alice]);

        projection
            .apply_envelope(&envelope(
                tenant_id,
                department_id,
                DepartmentEvent::MembersRemoved(MembersRemoved {
                    tenant_id,
                    department_id,
                    user_ids: vec![alice],
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        assert!(projection.inherited_for(tenant_id, &alice).is_empty());
    }
}
