//! Global organisation directory.
//!
//! Organisations are the one read model that is *not* tenant-scoped: an
//! organisation defines its tenant, and the list-all view deliberately spans
//! tenants (it sits behind its own permission at the API layer). The
//! directory therefore keeps its own map keyed by organisation id with a
//! tenant index on the side.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use opsdesk_core::{Slug, TenantId, UserId};
use opsdesk_organisation::OrganisationId;

/// Directory record for one organisation (and its tenant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganisationRecord {
    pub organisation_id: OrganisationId,
    pub tenant_id: TenantId,
    pub name: String,
    pub slug: Slug,
    pub members: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct DirectoryInner {
    by_id: HashMap<OrganisationId, OrganisationRecord>,
    by_tenant: HashMap<TenantId, OrganisationId>,
}

/// In-memory cross-tenant organisation registry.
#[derive(Debug, Default)]
pub struct OrganisationDirectory {
    inner: RwLock<DirectoryInner>,
}

impl OrganisationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, record: OrganisationRecord) {
        if let Ok(mut inner) = self.inner.write() {
            inner.by_tenant.insert(record.tenant_id, record.organisation_id);
            inner.by_id.insert(record.organisation_id, record);
        }
    }

    pub fn remove(&self, organisation_id: &OrganisationId) {
        if let Ok(mut inner) = self.inner.write() {
            if let Some(record) = inner.by_id.remove(organisation_id) {
                inner.by_tenant.remove(&record.tenant_id);
            }
        }
    }

    pub fn get(&self, organisation_id: &OrganisationId) -> Option<OrganisationRecord> {
        let inner = self.inner.read().ok()?;
        inner.by_id.get(organisation_id).cloned()
    }

    /// The organisation backing a tenant, if any.
    pub fn get_by_tenant(&self, tenant_id: TenantId) -> Option<OrganisationRecord> {
        let inner = self.inner.read().ok()?;
        let id = inner.by_tenant.get(&tenant_id)?;
        inner.by_id.get(id).cloned()
    }

    /// All organisations across all tenants, name-ordered.
    pub fn list_all(&self) -> Vec<OrganisationRecord> {
        let inner = match self.inner.read() {
            Ok(i) => i,
            Err(_) => return vec![],
        };
        let mut records: Vec<_> = inner.by_id.values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name).then(a.organisation_id.cmp(&b.organisation_id)));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> OrganisationRecord {
        let now = Utc::now();
        OrganisationRecord {
            organisation_id: OrganisationId::new(),
            tenant_id: TenantId::new(),
            name: name.to_string(),
            slug: Slug::derive(name).unwrap(),
            members: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn tenant_index_follows_upserts_and_removes() {
        let dir = OrganisationDirectory::new();
        let rec = record("Acme");
        let tenant_id = rec.tenant_id;
        let org_id = rec.organisation_id;

        dir.upsert(rec);
        assert_eq!(dir.get_by_tenant(tenant_id).unwrap().organisation_id, org_id);

        dir.remove(&org_id);
        assert!(dir.get(&org_id).is_none());
        assert!(dir.get_by_tenant(tenant_id).is_none());
    }

    #[test]
    fn list_all_spans_tenants_in_name_order() {
        let dir = OrganisationDirectory::new();
        dir.upsert(record("Zenith"));
        dir.upsert(record("Acme"));

        let names: Vec<_> = dir.list_all().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Acme", "Zenith"]);
    }
}
