//! Vendors projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use opsdesk_core::TenantId;
use opsdesk_events::EventEnvelope;
use opsdesk_purchase::{VendorEvent, VendorId, VendorProfile};

use crate::read_model::TenantStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorReadModel {
    pub vendor_id: VendorId,
    pub tenant_id: TenantId,
    pub profile: VendorProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct VendorsProjection<S> {
    store: S,
}

impl<S> VendorsProjection<S>
where
    S: TenantStore<VendorId, VendorReadModel>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<serde_json::Value>,
    ) -> Result<(), anyhow::Error> {
        if envelope.aggregate_type() != "purchase.vendor" {
            return Ok(());
        }

        let event: VendorEvent = serde_json::from_value(envelope.payload().clone())?;
        let tenant_id = envelope.tenant_id();

        match event {
            VendorEvent::Created(e) => {
                self.store.upsert(
                    tenant_id,
                    e.vendor_id,
                    VendorReadModel {
                        vendor_id: e.vendor_id,
                        tenant_id: e.tenant_id,
                        profile: e.profile,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            VendorEvent::Updated(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &e.vendor_id) {
                    model.profile = e.profile;
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.vendor_id, model);
                }
            }
            VendorEvent::Deleted(e) => {
                self.store.remove(tenant_id, &e.vendor_id);
            }
        }

        Ok(())
    }

    pub fn get(&self, tenant_id: TenantId, vendor_id: &VendorId) -> Option<VendorReadModel> {
        self.store.get(tenant_id, vendor_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<VendorReadModel> {
        let mut vendors = self.store.list(tenant_id);
        vendors.sort_by(|a, b| a.profile.display_name.cmp(&b.profile.display_name));
        vendors
    }
}
