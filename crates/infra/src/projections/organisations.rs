//! Organisations projection.
//!
//! Folds organisation events into the global [`OrganisationDirectory`].
//! Deleting an organisation drops its directory record, which is what
//! "removing the tenant record" means on the read side.

use std::sync::Arc;

use opsdesk_events::EventEnvelope;
use opsdesk_organisation::OrganisationEvent;

use crate::read_model::{OrganisationDirectory, OrganisationRecord};

pub struct OrganisationsProjection {
    directory: Arc<OrganisationDirectory>,
}

impl OrganisationsProjection {
    pub fn new(directory: Arc<OrganisationDirectory>) -> Self {
        Self { directory }
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<serde_json::Value>,
    ) -> Result<(), anyhow::Error> {
        if envelope.aggregate_type() != "organisation" {
            return Ok(());
        }

        let event: OrganisationEvent = serde_json::from_value(envelope.payload().clone())?;

        match event {
            OrganisationEvent::Created(e) => {
                let mut members = std::collections::BTreeSet::new();
                members.insert(e.created_by);
                self.directory.upsert(OrganisationRecord {
                    organisation_id: e.organisation_id,
                    tenant_id: e.tenant_id,
                    name: e.name,
                    slug: e.slug,
                    members,
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                });
            }
            OrganisationEvent::Updated(e) => {
                if let Some(mut record) = self.directory.get(&e.organisation_id) {
                    record.name = e.name;
                    record.slug = e.slug;
                    record.updated_at = e.occurred_at;
                    self.directory.upsert(record);
                }
            }
            OrganisationEvent::UsersAdded(e) => {
                if let Some(mut record) = self.directory.get(&e.organisation_id) {
                    record.members.extend(e.user_ids.iter().copied());
                    record.updated_at = e.occurred_at;
                    self.directory.upsert(record);
                }
            }
            OrganisationEvent::UsersRemoved(e) => {
                if let Some(mut record) = self.directory.get(&e.organisation_id) {
                    for id in &e.user_ids {
                        record.members.remove(id);
                    }
                    record.updated_at = e.occurred_at;
                    self.directory.upsert(record);
                }
            }
            OrganisationEvent::Deleted(e) => {
                self.directory.remove(&e.organisation_id);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use opsdesk_core::{AggregateId, Slug, TenantId, UserId};
    use opsdesk_events::Event;
    use opsdesk_organisation::{
        OrganisationCreated, OrganisationDeleted, OrganisationId, OrganisationUpdated, UsersAdded,
    };
    use uuid::Uuid;

    fn envelope(
        tenant_id: TenantId,
        organisation_id: OrganisationId,
        event: OrganisationEvent,
    ) -> EventEnvelope<serde_json::Value> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            AggregateId::from(organisation_id),
            "organisation",
            event.event_type(),
            1,
            serde_json::to_value(&event).unwrap(),
        )
    }

    #[test]
    fn created_then_members_then_deleted() {
        let directory = Arc::new(OrganisationDirectory::new());
        let projection = OrganisationsProjection::new(directory.clone());

        let tenant_id = TenantId::new();
        let organisation_id = OrganisationId::new();
        let creator = UserId::new();

        projection
            .apply_envelope(&envelope(
                tenant_id,
                organisation_id,
                OrganisationEvent::Created(OrganisationCreated {
                    organisation_id,
                    tenant_id,
                    name: "Acme".to_string(),
                    slug: Slug::derive("Acme").unwrap(),
                    created_by: creator,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        let newcomer = UserId::new();
        projection
            .apply_envelope(&envelope(
                tenant_id,
                organisation_id,
                OrganisationEvent::UsersAdded(UsersAdded {
                    organisation_id,
                    tenant_id,
                    user_ids: vec![newcomer],
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        let record = directory.get_by_tenant(tenant_id).unwrap();
        assert_eq!(record.members.len(), 2);
        assert!(record.members.contains(&creator));

        projection
            .apply_envelope(&envelope(
                tenant_id,
                organisation_id,
                OrganisationEvent::Deleted(OrganisationDeleted {
                    organisation_id,
                    tenant_id,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();
        assert!(directory.get_by_tenant(tenant_id).is_none());
    }

    #[test]
    fn rename_resyncs_name_and_slug() {
        let directory = Arc::new(OrganisationDirectory::new());
        let projection = OrganisationsProjection::new(directory.clone());

        let tenant_id = TenantId::new();
        let organisation_id = OrganisationId::new();

        projection
            .apply_envelope(&envelope(
                tenant_id,
                organisation_id,
                OrganisationEvent::Created(OrganisationCreated {
                    organisation_id,
                    tenant_id,
                    name: "Acme Widgets".to_string(),
                    slug: Slug::derive("Acme Widgets").unwrap(),
                    created_by: UserId::new(),
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        projection
            .apply_envelope(&envelope(
                tenant_id,
                organisation_id,
                OrganisationEvent::Updated(OrganisationUpdated {
                    organisation_id,
                    tenant_id,
                    name: "Acme Holdings Ltd".to_string(),
                    slug: Slug::derive("Acme Holdings Ltd").unwrap(),
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        let record = directory.get_by_tenant(tenant_id).unwrap();
        assert_eq!(record.name, "Acme Holdings Ltd");
        assert_eq!(record.slug.as_str(), "acme-holdings-ltd");
    }
}
