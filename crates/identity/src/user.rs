//! User aggregate (event-sourced).
//!
//! A user belongs to exactly one tenant and carries a profile, a role and a
//! set of *directly* granted permission codenames. Department-inherited
//! permissions are never stored on the user; they are resolved at read time
//! from department membership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use opsdesk_auth::{Permission, PermissionSet, UserRole};
use opsdesk_core::{Aggregate, AggregateRoot, DomainError, TenantId, UserId};
use opsdesk_events::Event;

// ─────────────────────────────────────────────────────────────────────────────
// User Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// User aggregate.
///
/// # Invariants
/// - `tenant_id` is immutable after creation.
/// - Permission grants are idempotent: granting a held codename is a no-op,
///   revoking an unheld codename is a no-op.
/// - A deleted user accepts no further commands.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub tenant_id: Option<TenantId>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub permissions: PermissionSet,
    pub version: u64,
    pub created: bool,
    pub deleted: bool,
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: UserId::new(),
            tenant_id: None,
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            role: UserRole::default(),
            permissions: PermissionSet::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }
}

impl User {
    pub fn empty(id: UserId) -> Self {
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

impl AggregateRoot for User {
    type Id = UserId;

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
pub struct CreateUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub occurred_at: DateTime<Utc>,
}

/// Profile update. `None` fields are untouched, so the same command backs
/// both full (PUT) and partial (PATCH) updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRole {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: UserRole,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantPermissions {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub permissions: Vec<Permission>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokePermissions {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub permissions: Vec<Permission>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserCommand {
    Create(CreateUser),
    Update(UpdateUser),
    ChangeRole(ChangeRole),
    GrantPermissions(GrantPermissions),
    RevokePermissions(RevokePermissions),
    Delete(DeleteUser),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreated {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdated {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRoleChanged {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: UserRole,
    pub occurred_at: DateTime<Utc>,
}

/// Only codenames the user did not already hold appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPermissionsGranted {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub permissions: Vec<Permission>,
    pub occurred_at: DateTime<Utc>,
}

/// Only codenames the user actually held appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPermissionsRevoked {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub permissions: Vec<Permission>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDeleted {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserEvent {
    Created(UserCreated),
    Updated(UserUpdated),
    RoleChanged(UserRoleChanged),
    PermissionsGranted(UserPermissionsGranted),
    PermissionsRevoked(UserPermissionsRevoked),
    Deleted(UserDeleted),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "identity.user.created",
            UserEvent::Updated(_) => "identity.user.updated",
            UserEvent::RoleChanged(_) => "identity.user.role_changed",
            UserEvent::PermissionsGranted(_) => "identity.user.permissions_granted",
            UserEvent::PermissionsRevoked(_) => "identity.user.permissions_revoked",
            UserEvent::Deleted(_) => "identity.user.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Created(e) => e.occurred_at,
            UserEvent::Updated(e) => e.occurred_at,
            UserEvent::RoleChanged(e) => e.occurred_at,
            UserEvent::PermissionsGranted(e) => e.occurred_at,
            UserEvent::PermissionsRevoked(e) => e.occurred_at,
            UserEvent::Deleted(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Created(e) => self.apply_created(e),
            UserEvent::Updated(e) => self.apply_updated(e),
            UserEvent::RoleChanged(e) => self.role = e.role,
            UserEvent::PermissionsGranted(e) => {
                self.permissions.extend(e.permissions.iter().cloned());
            }
            UserEvent::PermissionsRevoked(e) => {
                for perm in &e.permissions {
                    self.permissions.remove(perm);
                }
            }
            UserEvent::Deleted(_) => self.deleted = true,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Create(cmd) => self.handle_create(cmd),
            UserCommand::Update(cmd) => self.handle_update(cmd),
            UserCommand::ChangeRole(cmd) => self.handle_change_role(cmd),
            UserCommand::GrantPermissions(cmd) => self.handle_grant(cmd),
            UserCommand::RevokePermissions(cmd) => self.handle_revoke(cmd),
            UserCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

fn normalize_email(email: &str) -> Result<String, DomainError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(DomainError::validation("invalid email format"));
    }
    Ok(email)
}

impl User {
    fn handle_create(&self, cmd: &CreateUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invariant("user already exists"));
        }

        let email = normalize_email(&cmd.email)?;
        if cmd.first_name.trim().is_empty() {
            return Err(DomainError::validation("first name cannot be empty"));
        }

        Ok(vec![UserEvent::Created(UserCreated {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            email,
            first_name: cmd.first_name.trim().to_string(),
            last_name: cmd.last_name.trim().to_string(),
            role: cmd.role,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        let email = cmd.email.as_deref().map(normalize_email).transpose()?;

        Ok(vec![UserEvent::Updated(UserUpdated {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            email,
            first_name: cmd.first_name.as_ref().map(|s| s.trim().to_string()),
            last_name: cmd.last_name.as_ref().map(|s| s.trim().to_string()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_role(&self, cmd: &ChangeRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.role == cmd.role {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::RoleChanged(UserRoleChanged {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            role: cmd.role,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_grant(&self, cmd: &GrantPermissions) -> Result<Vec<UserEvent>, DomainError> {
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

        Ok(vec![UserEvent::PermissionsGranted(UserPermissionsGranted {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            permissions: new,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revoke(&self, cmd: &RevokePermissions) -> Result<Vec<UserEvent>, DomainError> {
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

        Ok(vec![UserEvent::PermissionsRevoked(UserPermissionsRevoked {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            permissions: held,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        Ok(vec![UserEvent::Deleted(UserDeleted {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn apply_created(&mut self, e: &UserCreated) {
        self.id = e.user_id;
        self.tenant_id = Some(e.tenant_id);
        self.email = e.email.clone();
        self.first_name = e.first_name.clone();
        self.last_name = e.last_name.clone();
        self.role = e.role;
        self.created = true;
    }

    fn apply_updated(&mut self, e: &UserUpdated) {
        if let Some(email) = &e.email {
            self.email = email.clone();
        }
        if let Some(first) = &e.first_name {
            self.first_name = first.clone();
        }
        if let Some(last) = &e.last_name {
            self.last_name = last.clone();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
