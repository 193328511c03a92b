//! Expense aggregate.
//!
//! Amounts are stored in minor units (e.g. cents) to keep arithmetic exact;
//! `tax_inclusive` records whether the amount already contains tax. The
//! account and paid-through references are opaque ledger identifiers; the
//! vendor reference is optional (cash expenses have none).

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use opsdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use opsdesk_events::Event;

use crate::vendor::VendorId;

/// Identifier of an expense.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpenseId(Uuid);

impl ExpenseId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExpenseId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ExpenseId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("ExpenseId: {e}")))?;
        Ok(Self(uuid))
    }
}

impl From<ExpenseId> for AggregateId {
    fn from(value: ExpenseId) -> Self {
        AggregateId::from_uuid(value.0)
    }
}

impl From<AggregateId> for ExpenseId {
    fn from(value: AggregateId) -> Self {
        Self(*value.as_uuid())
    }
}

/// Expense detail fields shared by create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseDetails {
    pub amount_minor: i64,
    pub tax_inclusive: bool,
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub account_id: Uuid,
    pub paid_through_id: Uuid,
    pub vendor_id: Option<VendorId>,
}

#[derive(Debug, Clone)]
pub struct Expense {
    pub id: ExpenseId,
    pub tenant_id: Option<TenantId>,
    pub details: Option<ExpenseDetails>,
    pub version: u64,
    pub created: bool,
    pub deleted: bool,
}

impl Default for Expense {
    fn default() -> Self {
        Self {
            id: ExpenseId::new(),
            tenant_id: None,
            details: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }
}

impl Expense {
    pub fn empty(id: ExpenseId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }

    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for Expense {
    type Id = ExpenseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExpense {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub details: ExpenseDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateExpense {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub details: ExpenseDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteExpense {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExpenseCommand {
    Create(CreateExpense),
    Update(UpdateExpense),
    Delete(DeleteExpense),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseCreated {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub details: ExpenseDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseUpdated {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub details: ExpenseDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseDeleted {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExpenseEvent {
    Created(ExpenseCreated),
    Updated(ExpenseUpdated),
    Deleted(ExpenseDeleted),
}

impl Event for ExpenseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ExpenseEvent::Created(_) => "purchase.expense.created",
            ExpenseEvent::Updated(_) => "purchase.expense.updated",
            ExpenseEvent::Deleted(_) => "purchase.expense.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ExpenseEvent::Created(e) => e.occurred_at,
            ExpenseEvent::Updated(e) => e.occurred_at,
            ExpenseEvent::Deleted(e) => e.occurred_at,
        }
    }
}

fn validate_details(details: &ExpenseDetails) -> Result<(), DomainError> {
    if details.amount_minor <= 0 {
        return Err(DomainError::validation("expense amount must be positive"));
    }
    if details.account_id == details.paid_through_id {
        return Err(DomainError::validation(
            "expense account and paid-through account must differ",
        ));
    }
    Ok(())
}

impl Aggregate for Expense {
    type Command = ExpenseCommand;
    type Event = ExpenseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ExpenseEvent::Created(e) => {
                self.id = e.expense_id;
                self.tenant_id = Some(e.tenant_id);
                self.details = Some(e.details.clone());
                self.created = true;
            }
            ExpenseEvent::Updated(e) => self.details = Some(e.details.clone()),
            ExpenseEvent::Deleted(_) => self.deleted = true,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ExpenseCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::invariant("expense already exists"));
                }
                validate_details(&cmd.details)?;
                Ok(vec![ExpenseEvent::Created(ExpenseCreated {
                    tenant_id: cmd.tenant_id,
                    expense_id: cmd.expense_id,
                    details: cmd.details.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            ExpenseCommand::Update(cmd) => {
                self.ensure_exists()?;
                self.ensure_tenant(cmd.tenant_id)?;
                validate_details(&cmd.details)?;
                if Some(&cmd.details) == self.details.as_ref() {
                    return Ok(vec![]);
                }
                Ok(vec![ExpenseEvent::Updated(ExpenseUpdated {
                    tenant_id: cmd.tenant_id,
                    expense_id: cmd.expense_id,
                    details: cmd.details.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            ExpenseCommand::Delete(cmd) => {
                self.ensure_exists()?;
                self.ensure_tenant(cmd.tenant_id)?;
                Ok(vec![ExpenseEvent::Deleted(ExpenseDeleted {
                    tenant_id: cmd.tenant_id,
                    expense_id: cmd.expense_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
