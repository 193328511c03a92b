use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use opsdesk_auth::PermissionSet;
use opsdesk_core::{Aggregate, AggregateId, DomainError, TenantId, UserId};
use opsdesk_events::{EventBus, EventEnvelope, InMemoryEventBus};
use opsdesk_identity::DepartmentId;
use opsdesk_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{InMemoryEventStore, StoredEvent},
    projections::{
        DepartmentReadModel, DepartmentsProjection, ExpenseReadModel, ExpensesProjection,
        OrganisationsProjection, UserReadModel, UsersProjection, VendorReadModel,
        VendorsProjection,
    },
    read_model::{InMemoryTenantStore, OrganisationDirectory},
};
use opsdesk_purchase::{ExpenseId, VendorId};

type InMemoryDispatcher = CommandDispatcher<
    Arc<InMemoryEventStore>,
    Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>,
>;

/// Shared application services: dispatcher plus the read side.
///
/// Projections are kept current by a background task draining the bus, so
/// reads immediately after a command may lag by a beat (tests poll).
pub struct AppServices {
    dispatcher: Arc<InMemoryDispatcher>,
    pub users: Arc<UsersProjection<Arc<InMemoryTenantStore<UserId, UserReadModel>>>>,
    pub departments:
        Arc<DepartmentsProjection<Arc<InMemoryTenantStore<DepartmentId, DepartmentReadModel>>>>,
    pub organisations: Arc<OrganisationDirectory>,
    pub vendors: Arc<VendorsProjection<Arc<InMemoryTenantStore<VendorId, VendorReadModel>>>>,
    pub expenses: Arc<ExpensesProjection<Arc<InMemoryTenantStore<ExpenseId, ExpenseReadModel>>>>,
}

impl AppServices {
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: opsdesk_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatcher
            .dispatch(tenant_id, aggregate_id, aggregate_type, command, make_aggregate)
    }

    /// Effective permission set for a stored user: direct ∪ inherited.
    /// `None` when the user has no directory record in this tenant.
    pub fn effective_permissions(
        &self,
        tenant_id: TenantId,
        user_id: &UserId,
    ) -> Option<PermissionSet> {
        let user = self.users.get(tenant_id, user_id)?;
        let inherited = self.departments.inherited_for(tenant_id, user_id);
        Some(user.direct_permissions.union(&inherited))
    }
}

pub fn build_services() -> AppServices {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());

    let users_store: Arc<InMemoryTenantStore<UserId, UserReadModel>> =
        Arc::new(InMemoryTenantStore::new());
    let users: Arc<UsersProjection<_>> = Arc::new(UsersProjection::new(users_store));

    let departments_store: Arc<InMemoryTenantStore<DepartmentId, DepartmentReadModel>> =
        Arc::new(InMemoryTenantStore::new());
    let departments: Arc<DepartmentsProjection<_>> =
        Arc::new(DepartmentsProjection::new(departments_store));

    let organisations: Arc<OrganisationDirectory> = Arc::new(OrganisationDirectory::new());
    let organisations_projection = OrganisationsProjection::new(organisations.clone());

    let vendors_store: Arc<InMemoryTenantStore<VendorId, VendorReadModel>> =
        Arc::new(InMemoryTenantStore::new());
    let vendors: Arc<VendorsProjection<_>> = Arc::new(VendorsProjection::new(vendors_store));

    let expenses_store: Arc<InMemoryTenantStore<ExpenseId, ExpenseReadModel>> =
        Arc::new(InMemoryTenantStore::new());
    let expenses: Arc<ExpensesProjection<_>> = Arc::new(ExpensesProjection::new(expenses_store));

    // Background subscriber: bus -> projections.
    {
        let sub = bus.subscribe();
        let users = users.clone();
        let departments = departments.clone();
        let vendors = vendors.clone();
        let expenses = expenses.clone();
        tokio::task::spawn_blocking(move || {
            loop {
                match sub.recv() {
                    Ok(env) => {
                        let applied = match env.aggregate_type() {
                            "identity.user" => {
                                users.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            "identity.department" => {
                                departments.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            "organisation" => organisations_projection
                                .apply_envelope(&env)
                                .map_err(|e| e.to_string()),
                            "purchase.vendor" => {
                                vendors.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            "purchase.expense" => {
                                expenses.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            _ => Ok(()),
                        };

                        if let Err(e) = applied {
                            tracing::warn!(
                                event_type = env.event_type(),
                                "projection apply failed: {e}"
                            );
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }

    let dispatcher: Arc<InMemoryDispatcher> =
        Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));

    AppServices {
        dispatcher,
        users,
        departments,
        organisations,
        vendors,
        expenses,
    }
}
