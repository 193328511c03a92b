//! Expenses projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use opsdesk_core::TenantId;
use opsdesk_events::EventEnvelope;
use opsdesk_purchase::{ExpenseDetails, ExpenseEvent, ExpenseId};

use crate::read_model::TenantStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseReadModel {
    pub expense_id: ExpenseId,
    pub tenant_id: TenantId,
    pub details: ExpenseDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct ExpensesProjection<S> {
    store: S,
}

impl<S> ExpensesProjection<S>
where
    S: TenantStore<ExpenseId, ExpenseReadModel>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<serde_json::Value>,
    ) -> Result<(), anyhow::Error> {
        if envelope.aggregate_type() != "purchase.expense" {
            return Ok(());
        }

        let event: ExpenseEvent = serde_json::from_value(envelope.payload().clone())?;
        let tenant_id = envelope.tenant_id();

        match event {
            ExpenseEvent::Created(e) => {
                self.store.upsert(
                    tenant_id,
                    e.expense_id,
                    ExpenseReadModel {
                        expense_id: e.expense_id,
                        tenant_id: e.tenant_id,
                        details: e.details,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            ExpenseEvent::Updated(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &e.expense_id) {
                    model.details = e.details;
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.expense_id, model);
                }
            }
            ExpenseEvent::Deleted(e) => {
                self.store.remove(tenant_id, &e.expense_id);
            }
        }

        Ok(())
    }

    pub fn get(&self, tenant_id: TenantId, expense_id: &ExpenseId) -> Option<ExpenseReadModel> {
        self.store.get(tenant_id, expense_id)
    }

    /// Newest expense date first.
    pub fn list(&self, tenant_id: TenantId) -> Vec<ExpenseReadModel> {
        let mut expenses = self.store.list(tenant_id);
        expenses.sort_by(|a, b| b.details.date.cmp(&a.details.date).then(a.expense_id.cmp(&b.expense_id)));
        expenses
    }
}
