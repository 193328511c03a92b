mod organisation_directory;
mod tenant_store;

pub use organisation_directory::{OrganisationDirectory, OrganisationRecord};
pub use tenant_store::{InMemoryTenantStore, TenantStore};
