//! Organisation domain module.
//!
//! An organisation is the business-facing face of a tenant: creating one
//! provisions a fresh tenant, deriving a URL slug from the name and enrolling
//! the creating user as the first member. Membership changes here drive the
//! cross-aggregate "add users to my organisation" flows at the API layer.

pub mod organisation;

pub use organisation::{
    AddUsers, CreateOrganisation, DeleteOrganisation, Organisation, OrganisationCommand,
    OrganisationCreated, OrganisationDeleted, OrganisationEvent, OrganisationId,
    OrganisationUpdated, RemoveUsers, UpdateOrganisation, UsersAdded, UsersRemoved,
};
