//! Vendor aggregate.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use opsdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use opsdesk_events::Event;

/// Identifier of a vendor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorId(Uuid);

impl VendorId {
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

impl Default for VendorId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for VendorId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for VendorId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("VendorId: {e}")))?;
        Ok(Self(uuid))
    }
}

impl From<VendorId> for AggregateId {
    fn from(value: VendorId) -> Self {
        AggregateId::from_uuid(value.0)
    }
}

impl From<AggregateId> for VendorId {
    fn from(value: AggregateId) -> Self {
        Self(*value.as_uuid())
    }
}

/// Vendor profile fields shared by create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorProfile {
    pub display_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub shipping_address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Vendor {
    pub id: VendorId,
    pub tenant_id: Option<TenantId>,
    pub profile: VendorProfile,
    pub version: u64,
    pub created: bool,
    pub deleted: bool,
}

impl Default for Vendor {
    fn default() -> Self {
        Self {
            id: VendorId::new(),
            tenant_id: None,
            profile: VendorProfile::default(),
            version: 0,
            created: false,
            deleted: false,
        }
    }
}

impl Vendor {
    pub fn empty(id: VendorId) -> Self {
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

impl AggregateRoot for Vendor {
    type Id = VendorId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVendor {
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub profile: VendorProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateVendor {
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub profile: VendorProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteVendor {
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VendorCommand {
    Create(CreateVendor),
    Update(UpdateVendor),
    Delete(DeleteVendor),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorCreated {
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub profile: VendorProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorUpdated {
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub profile: VendorProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorDeleted {
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VendorEvent {
    Created(VendorCreated),
    Updated(VendorUpdated),
    Deleted(VendorDeleted),
}

impl Event for VendorEvent {
    fn event_type(&self) -> &'static str {
        match self {
            VendorEvent::Created(_) => "purchase.vendor.created",
            VendorEvent::Updated(_) => "purchase.vendor.updated",
            VendorEvent::Deleted(_) => "purchase.vendor.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            VendorEvent::Created(e) => e.occurred_at,
            VendorEvent::Updated(e) => e.occurred_at,
            VendorEvent::Deleted(e) => e.occurred_at,
        }
    }
}

fn validate_profile(profile: &VendorProfile) -> Result<VendorProfile, DomainError> {
    let display_name = profile.display_name.trim();
    if display_name.is_empty() {
        return Err(DomainError::validation("vendor display name cannot be empty"));
    }
    if let Some(email) = &profile.email {
        if !email.contains('@') {
            return Err(DomainError::validation("invalid vendor email"));
        }
    }
    Ok(VendorProfile {
        display_name: display_name.to_string(),
        email: profile.email.clone(),
        phone: profile.phone.clone(),
        shipping_address: profile.shipping_address.clone(),
    })
}

impl Aggregate for Vendor {
    type Command = VendorCommand;
    type Event = VendorEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            VendorEvent::Created(e) => {
                self.id = e.vendor_id;
                self.tenant_id = Some(e.tenant_id);
                self.profile = e.profile.clone();
                self.created = true;
            }
            VendorEvent::Updated(e) => self.profile = e.profile.clone(),
            VendorEvent::Deleted(_) => self.deleted = true,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            VendorCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::invariant("vendor already exists"));
                }
                let profile = validate_profile(&cmd.profile)?;
                Ok(vec![VendorEvent::Created(VendorCreated {
                    tenant_id: cmd.tenant_id,
                    vendor_id: cmd.vendor_id,
                    profile,
                    occurred_at: cmd.occurred_at,
                })])
            }
            VendorCommand::Update(cmd) => {
                self.ensure_exists()?;
                self.ensure_tenant(cmd.tenant_id)?;
                let profile = validate_profile(&cmd.profile)?;
                if profile == self.profile {
                    return Ok(vec![]);
                }
                Ok(vec![VendorEvent::Updated(VendorUpdated {
                    tenant_id: cmd.tenant_id,
                    vendor_id: cmd.vendor_id,
                    profile,
                    occurred_at: cmd.occurred_at,
                })])
            }
            VendorCommand::Delete(cmd) => {
                self.ensure_exists()?;
                self.ensure_tenant(cmd.tenant_id)?;
                Ok(vec![VendorEvent::Deleted(VendorDeleted {
                    tenant_id: cmd.tenant_id,
                    vendor_id: cmd.vendor_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
