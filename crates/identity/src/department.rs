//! Department aggregate (event-sourced).
//!
//! A department is a named group of users inside one tenant. Permissions
//! granted to a department are inherited by every member for as long as the
//! membership and the grant both exist.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use opsdesk_auth::{Permission, PermissionSet};
use opsdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use opsdesk_events::Event;

/// Identifier of a department.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepartmentId(Uuid);

impl DepartmentId {
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

impl Default for DepartmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for DepartmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for DepartmentId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| DomainError::invalid_id(format!("DepartmentId: {e}")))?;
        Ok(Self(uuid))
    }
}

impl From<DepartmentId> for AggregateId {
    fn from(value: DepartmentId) -> Self {
        AggregateId::from_uuid(value.0)
    }
}

impl From<AggregateId> for DepartmentId {
    fn from(value: AggregateId) -> Self {
        Self(*value.as_uuid())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Department Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// Department aggregate.
///
/// # Invariants
/// - Membership is a set: adding a current member, or removing a non-member,
///   is filtered out rather than rejected.
/// - Department permission grants follow the same idempotency rule as user
///   grants.
#[derive(Debug, Clone)]
pub struct Department {
    pub id: DepartmentId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub permissions: PermissionSet,
    pub members: BTreeSet<UserId>,
    pub version: u64,
    pub created: bool,
    pub deleted: bool,
}

impl Default for Department {
    fn default() -> Self {
        Self {
            id: DepartmentId::new(),
            tenant_id: None,
            name: String::new(),
            permissions: PermissionSet::new(),
            members: BTreeSet::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }
}

impl Department {
    pub fn empty(id: DepartmentId) -> Self {
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

impl AggregateRoot for Department {
    type Id = DepartmentId;

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
pub struct CreateDepartment {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameDepartment {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantDepartmentPermissions {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub permissions: Vec<Permission>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeDepartmentPermissions {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub permissions: Vec<Permission>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMembers {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub user_ids: Vec<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveMembers {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub user_ids: Vec<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteDepartment {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DepartmentCommand {
    Create(CreateDepartment),
    Rename(RenameDepartment),
    GrantPermissions(GrantDepartmentPermissions),
    RevokePermissions(RevokeDepartmentPermissions),
    AddMembers(AddMembers),
    RemoveMembers(RemoveMembers),
    Delete(DeleteDepartment),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentCreated {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentRenamed {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Only codenames the department did not already hold appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentPermissionsGranted {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub permissions: Vec<Permission>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentPermissionsRevoked {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub permissions: Vec<Permission>,
    pub occurred_at: DateTime<Utc>,
}

/// Only user ids that were not already members appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembersAdded {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub user_ids: Vec<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembersRemoved {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub user_ids: Vec<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentDeleted {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DepartmentEvent {
    Created(DepartmentCreated),
    Renamed(DepartmentRenamed),
    PermissionsGranted(DepartmentPermissionsGranted),
    PermissionsRevoked(DepartmentPermissionsRevoked),
    MembersAdded(MembersAdded),
    MembersRemoved(MembersRemoved),
    Deleted(DepartmentDeleted),
}

impl Event for DepartmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DepartmentEvent::Created(_) => "identity.department.created",
            DepartmentEvent::Renamed(_) => "identity.department.renamed",
            DepartmentEvent::PermissionsGranted(_) => {
                "identity.department.permissions_granted"
            }
            DepartmentEvent::PermissionsRevoked(_) => {
                "identity.department.permissions_revoked"
            }
            DepartmentEvent::MembersAdded(_) => "identity.department.members_added",
            DepartmentEvent::MembersRemoved(_) => "identity.department.members_removed",
            DepartmentEvent::Deleted(_) => "identity.department.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DepartmentEvent::Created(e) => e.occurred_at,
            DepartmentEvent::Renamed(e) => e.occurred_at,
            DepartmentEvent::PermissionsGranted(e) => e.occurred_at,
            DepartmentEvent::PermissionsRevoked(e) => e.occurred_at,
            DepartmentEvent::MembersAdded(e) => e.occurred_at,
            DepartmentEvent::MembersRemoved(e) => e.occurred_at,
            DepartmentEvent::Deleted(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Department {
    type Command = DepartmentCommand;
    type Event = DepartmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DepartmentEvent::Created(e) => {
                self.id = e.department_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.created = true;
            }
            DepartmentEvent::Renamed(e) => self.name = e.name.clone(),
            DepartmentEvent::PermissionsGranted(e) => {
                self.permissions.extend(e.permissions.iter().cloned());
            }
            DepartmentEvent::PermissionsRevoked(e) => {
                for perm in &e.permissions {
                    self.permissions.remove(perm);
                }
            }
            DepartmentEvent::MembersAdded(e) => {
                self.members.extend(e.user_ids.iter().copied());
            }
            DepartmentEvent::MembersRemoved(e) => {
                for id in &e.user_ids {
                    self.members.remove(id);
                }
            }
            DepartmentEvent::Deleted(_) => self.deleted = true,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DepartmentCommand::Create(cmd) => self.handle_create(cmd),
            DepartmentCommand::Rename(cmd) => self.handle_rename(cmd),
            DepartmentCommand::GrantPermissions(cmd) => self.handle_grant(cmd),
            DepartmentCommand::RevokePermissions(cmd) => self.handle_revoke(cmd),
            DepartmentCommand::AddMembers(cmd) => self.handle_add_members(cmd),
            DepartmentCommand::RemoveMembers(cmd) => self.handle_remove_members(cmd),
            DepartmentCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Department {
    fn handle_create(&self, cmd: &CreateDepartment) -> Result<Vec<DepartmentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invariant("department already exists"));
        }
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("department name cannot be empty"));
        }

        Ok(vec![DepartmentEvent::Created(DepartmentCreated {
            tenant_id: cmd.tenant_id,
            department_id: cmd.department_id,
            name: name.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_rename(&self, cmd: &RenameDepartment) -> Result<Vec<DepartmentEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("department name cannot be empty"));
        }
        if name == self.name {
            return Ok(vec![]);
        }

        Ok(vec![DepartmentEvent::Renamed(DepartmentRenamed {
            tenant_id: cmd.tenant_id,
            department_id: cmd.department_id,
            name: name.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_grant(
        &self,
        cmd: &GrantDepartmentPermissions,
    ) -> Result<Vec<DepartmentEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        let new: Vec<Permission> = cmd
            .permissions
            .iter()
            .filter(|p| !self.permissions.contains(p))
            .cloned()
            .collect();

        if new.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![DepartmentEvent::PermissionsGranted(
            DepartmentPermissionsGranted {
                tenant_id: cmd.tenant_id,
                department_id: cmd.department_id,
                permissions: new,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_revoke(
        &self,
        cmd: &RevokeDepartmentPermissions,
    ) -> Result<Vec<DepartmentEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        let held: Vec<Permission> = cmd
            .permissions
            .iter()
            .filter(|p| self.permissions.contains(p))
            .cloned()
            .collect();

        if held.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![DepartmentEvent::PermissionsRevoked(
            DepartmentPermissionsRevoked {
                tenant_id: cmd.tenant_id,
                department_id: cmd.department_id,
                permissions: held,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_add_members(&self, cmd: &AddMembers) -> Result<Vec<DepartmentEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

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

        Ok(vec![DepartmentEvent::MembersAdded(MembersAdded {
            tenant_id: cmd.tenant_id,
            department_id: cmd.department_id,
            user_ids: new,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_members(
        &self,
        cmd: &RemoveMembers,
    ) -> Result<Vec<DepartmentEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

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

        Ok(vec![DepartmentEvent::MembersRemoved(MembersRemoved {
            tenant_id: cmd.tenant_id,
            department_id: cmd.department_id,
            user_ids: removed,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteDepartment) -> Result<Vec<DepartmentEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        Ok(vec![DepartmentEvent::Deleted(DepartmentDeleted {
            tenant_id: cmd.tenant_id,
            department_id: cmd.department_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_department(tenant_id: TenantId) -> Department {
        let id = DepartmentId::new();
        let mut dept = Department::empty(id);
        let cmd = DepartmentCommand::Create(CreateDepartment {
            tenant_id,
            department_id: id,
            name: "  Procurement  ".to_string(),
            occurred_at: now(),
        });
        for event in dept.handle(&cmd).unwrap() {
            dept.apply(&event);
        }
        dept
    }

    #[test]
    fn create_trims_name() {
        let dept = created_department(TenantId::new());
        assert_eq!(dept.name, "Procurement");
        assert!(dept.created);
    }

    #[test]
    fn add_members_filters_existing_and_duplicates() {
        let tenant_id = TenantId::new();
        let mut dept = created_department(tenant_id);

        let alice = UserId::new();
        let bob = UserId::new();

        let cmd = DepartmentCommand::AddMembers(AddMembers {
            tenant_id,
            department_id: dept.id,
            user_ids: vec![alice, alice, bob],
            occurred_at: now(),
        });
        let events = dept.handle(&cmd).unwrap();
        assert_eq!(events.len(), 1);
        let DepartmentEvent::MembersAdded(e) = &events[0] else {
            panic!("expected MembersAdded");
        };
        assert_eq!(e.user_ids.len(), 2);
        for event in events {
            dept.apply(&event);
        }

        // Re-adding alice alongside a new user emits only the new user.
        let carol = UserId::new();
        let cmd = DepartmentCommand::AddMembers(AddMembers {
            tenant_id,
            department_id: dept.id,
            user_ids: vec![alice, carol],
            occurred_at: now(),
        });
        let events = dept.handle(&cmd).unwrap();
        let DepartmentEvent::MembersAdded(e) = &events[0] else {
            panic!("expected MembersAdded");
        };
        assert_eq!(e.user_ids, vec![carol]);
    }

    #[test]
    fn remove_members_ignores_nonmembers() {
        let tenant_id = TenantId::new();
        let mut dept = created_department(tenant_id);

        let alice = UserId::new();
        let cmd = DepartmentCommand::AddMembers(AddMembers {
            tenant_id,
            department_id: dept.id,
            user_ids: vec![alice],
            occurred_at: now(),
        });
        for event in dept.handle(&cmd).unwrap() {
            dept.apply(&event);
        }

        let stranger = UserId::new();
        let cmd = DepartmentCommand::RemoveMembers(RemoveMembers {
            tenant_id,
            department_id: dept.id,
            user_ids: vec![stranger],
            occurred_at: now(),
        });
        assert!(dept.handle(&cmd).unwrap().is_empty());

        let cmd = DepartmentCommand::RemoveMembers(RemoveMembers {
            tenant_id,
            department_id: dept.id,
            user_ids: vec![alice, stranger],
            occurred_at: now(),
        });
        let events = dept.handle(&cmd).unwrap();
        let DepartmentEvent::MembersRemoved(e) = &events[0] else {
            panic!("expected MembersRemoved");
        };
        assert_eq!(e.user_ids, vec![alice]);
    }

    #[test]
    fn grant_and_revoke_department_permissions() {
        let tenant_id = TenantId::new();
        let mut dept = created_department(tenant_id);

        let grant = DepartmentCommand::GrantPermissions(GrantDepartmentPermissions {
            tenant_id,
            department_id: dept.id,
            permissions: vec![Permission::new("view_expense"), Permission::new("add_expense")],
            occurred_at: now(),
        });
        for event in dept.handle(&grant).unwrap() {
            dept.apply(&event);
        }
        assert!(dept.permissions.contains_codename("view_expense"));

        // Granting again is a no-op.
        assert!(dept.handle(&grant).unwrap().is_empty());

        let revoke = DepartmentCommand::RevokePermissions(RevokeDepartmentPermissions {
            tenant_id,
            department_id: dept.id,
            permissions: vec![Permission::new("add_expense"), Permission::new("delete_expense")],
            occurred_at: now(),
        });
        let events = dept.handle(&revoke).unwrap();
        let DepartmentEvent::PermissionsRevoked(e) = &events[0] else {
            panic!("expected PermissionsRevoked");
        };
        assert_eq!(e.permissions, vec![Permission::new("add_expense")]);
    }

    #[test]
    fn deleted_department_accepts_no_commands() {
        let tenant_id = TenantId::new();
        let mut dept = created_department(tenant_id);

        let delete = DepartmentCommand::Delete(DeleteDepartment {
            tenant_id,
            department_id: dept.id,
            occurred_at: now(),
        });
        for event in dept.handle(&delete).unwrap() {
            dept.apply(&event);
        }
        assert!(matches!(dept.handle(&delete), Err(DomainError::NotFound)));
    }

    #[test]
    fn cross_tenant_command_rejected() {
        let mut dept = created_department(TenantId::new());
        let cmd = DepartmentCommand::Rename(RenameDepartment {
            tenant_id: TenantId::new(),
            department_id: dept.id,
            name: "Ops".to_string(),
            occurred_at: now(),
        });
        assert!(dept.handle(&cmd).is_err());
        dept.apply(&DepartmentEvent::Renamed(DepartmentRenamed {
            tenant_id: dept.tenant_id.unwrap(),
            department_id: dept.id,
            name: "Ops".to_string(),
            occurred_at: now(),
        }));
        assert_eq!(dept.name, "Ops");
    }
}
