//! `opsdesk-auth` — pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: the permission
//! registry, role model, claim validation, policy checks and the
//! source-of-truth resolver are all deterministic and IO-free.

pub mod authorize;
pub mod claims;
pub mod permission;
pub mod registry;
pub mod roles;
pub mod source_of_truth;

pub use authorize::{AuthzError, Principal, authorize};
pub use claims::{Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError, validate_claims};
pub use permission::{Permission, PermissionSet};
pub use registry::{PermissionDescriptor, PermissionRegistry};
pub use roles::UserRole;
pub use source_of_truth::{PermissionStatus, SourceOfTruthReport, resolve_source_of_truth};
