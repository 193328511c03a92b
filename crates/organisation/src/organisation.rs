//! Organisation aggregate (event-sourced).
//!
//! Unlike users and departments, an organisation is not scoped *inside* a
//! tenant; it *defines* one. The `Created` event carries the freshly minted
//! `TenantId` along with the slug derived from the organisation name, and
//! `Updated` re-derives the slug whenever the name changes.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use opsdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Slug, TenantId, UserId};
use opsdesk_events::Event;

/// Identifier of an organisation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganisationId(Uuid);

impl OrganisationId {
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

impl Default for OrganisationId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for OrganisationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for OrganisationId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| DomainError::invalid_id(format!("OrganisationId: {e}")))?;
        Ok(Self(uuid))
    }
}

impl From<OrganisationId> for AggregateId {
    fn from(value: OrganisationId) -> Self {
        AggregateId::from_uuid(value.0)
    }
}

impl From<AggregateId> for OrganisationId {
    fn from(value: AggregateId) -> Self {
        Self(*value.as_uuid())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Organisation Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// Organisation aggregate.
///
/// # Invariants
/// - `tenant_id` is assigned once at creation and never changes.
/// - `slug` always equals `Slug::derive(name)`.
/// - Membership is a set; bulk add/remove events carry only the delta.
#[derive(Debug, Clone)]
pub struct Organisation {
    pub id: OrganisationId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub slug: Option<Slug>,
    pub members: BTreeSet<UserId>,
    pub version: u64,
    pub created: bool,
    pub deleted: bool,
}

impl Default for Organisation {
    fn default() -> Self {
        Self {
            id: OrganisationId::new(),
            tenant_id: None,
            name: String::new(),
            slug: None,
            members: BTreeSet::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }
}

impl Organisation {
    pub fn empty(id: OrganisationId) -> Self {
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
}

impl AggregateRoot for Organisation {
    type Id = OrganisationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganisation {
    pub organisation_id: OrganisationId,
    /// Tenant provisioned for this organisation, minted by the caller so the
    /// API layer can hand it back in the response.
    pub tenant_id: TenantId,
    pub name: String,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrganisation {
    pub organisation_id: OrganisationId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddUsers {
    pub organisation_id: OrganisationId,
    pub user_ids: Vec<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveUsers {
    pub organisation_id: OrganisationId,
    pub user_ids: Vec<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteOrganisation {
    pub organisation_id: OrganisationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrganisationCommand {
    Create(CreateOrganisation),
    Update(UpdateOrganisation),
    AddUsers(AddUsers),
    RemoveUsers(RemoveUsers),
    Delete(DeleteOrganisation),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganisationCreated {
    pub organisation_id: OrganisationId,
    pub tenant_id: TenantId,
    pub name: String,
    pub slug: Slug,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganisationUpdated {
    pub organisation_id: OrganisationId,
    pub tenant_id: TenantId,
    pub name: String,
    pub slug: Slug,
    pub occurred_at: DateTime<Utc>,
}

/// Only user ids that were not already members appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersAdded {
    pub organisation_id: OrganisationId,
    pub tenant_id: TenantId,
    pub user_ids: Vec<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersRemoved {
    pub organisation_id: OrganisationId,
    pub tenant_id: TenantId,
    pub user_ids: Vec<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganisationDeleted {
    pub organisation_id: OrganisationId,
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrganisationEvent {
    Created(OrganisationCreated),
    Updated(OrganisationUpdated),
    UsersAdded(UsersAdded),
    UsersRemoved(UsersRemoved),
    Deleted(OrganisationDeleted),
}

impl Event for OrganisationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrganisationEvent::Created(_) => "organisation.created",
            OrganisationEvent::Updated(_) => "organisation.updated",
            OrganisationEvent::UsersAdded(_) => "organisation.users_added",
            OrganisationEvent::UsersRemoved(_) => "organisation.users_removed",
            OrganisationEvent::Deleted(_) => "organisation.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrganisationEvent::Created(e) => e.occurred_at,
            OrganisationEvent::Updated(e) => e.occurred_at,
            OrganisationEvent::UsersAdded(e) => e.occurred_at,
            OrganisationEvent::UsersRemoved(e) => e.occurred_at,
            OrganisationEvent::Deleted(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Organisation {
    type Command = OrganisationCommand;
    type Event = OrganisationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrganisationEvent::Created(e) => {
                self.id = e.organisation_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.slug = Some(e.slug.clone());
                self.members.insert(e.created_by);
                self.created = true;
            }
            OrganisationEvent::Updated(e) => {
                self.name = e.name.clone();
                self.slug = Some(e.slug.clone());
            }
            OrganisationEvent::UsersAdded(e) => {
                self.members.extend(e.user_ids.iter().copied());
            }
            OrganisationEvent::UsersRemoved(e) => {
                for id in &e.user_ids {
                    self.members.remove(id);
                }
            }
            OrganisationEvent::Deleted(_) => self.deleted = true,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrganisationCommand::Create(cmd) => self.handle_create(cmd),
            OrganisationCommand::Update(cmd) => self.handle_update(cmd),
            OrganisationCommand::AddUsers(cmd) => self.handle_add_users(cmd),
            OrganisationCommand::RemoveUsers(cmd) => self.handle_remove_users(cmd),
            OrganisationCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Organisation {
    fn tenant_id_or_bug(&self) -> Result<TenantId, DomainError> {
        self.tenant_id
            .ok_or_else(|| DomainError::invariant("organisation without tenant"))
    }

    fn handle_create(&self, cmd: &CreateOrganisation) -> Result<Vec<OrganisationEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invariant("organisation already exists"));
        }
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("organisation name cannot be empty"));
        }
        let slug = Slug::derive(name)?;

        Ok(vec![OrganisationEvent::Created(OrganisationCreated {
            organisation_id: cmd.organisation_id,
            tenant_id: cmd.tenant_id,
            name: name.to_string(),
            slug,
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateOrganisation) -> Result<Vec<OrganisationEvent>, DomainError> {
        self.ensure_exists()?;

        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("organisation name cannot be empty"));
        }
        if name == self.name {
            return Ok(vec![]);
        }
        let slug = Slug::derive(name)?;

        Ok(vec![OrganisationEvent::Updated(OrganisationUpdated {
            organisation_id: cmd.organisation_id,
            tenant_id: self.tenant_id_or_bug()?,
            name: name.to_string(),
            slug,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_users(&self, cmd: &AddUsers) -> Result<Vec<OrganisationEvent>, DomainError> {
        self.ensure_exists()?;

        let mut seen = BTreeSet::new();
        let new: Vec<UserId> = cmd
            .user_ids
            .iter()
            .copied()
            .filter(|id| !self.members.contains(id) && seen.insert(*id))
            .collect();

        if new.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![OrganisationEvent::UsersAdded(UsersAdded {
            organisation_id: cmd.organisation_id,
            tenant_id: self.tenant_id_or_bug()?,
            user_ids: new,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_users(&self, cmd: &RemoveUsers) -> Result<Vec<OrganisationEvent>, DomainError> {
        self.ensure_exists()?;

        let mut seen = BTreeSet::new();
        let removed: Vec<UserId> = cmd
            .user_ids
            .iter()
            .copied()
            .filter(|id| self.members.contains(id) && seen.insert(*id))
            .collect();

        if removed.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![OrganisationEvent::UsersRemoved(UsersRemoved {
            organisation_id: cmd.organisation_id,
            tenant_id: self.tenant_id_or_bug()?,
            user_ids: removed,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteOrganisation) -> Result<Vec<OrganisationEvent>, DomainError> {
        self.ensure_exists()?;

        Ok(vec![OrganisationEvent::Deleted(OrganisationDeleted {
            organisation_id: cmd.organisation_id,
            tenant_id: self.tenant_id_or_bug()?,
            occurred_at: cmd.occurred_at,
        })])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
