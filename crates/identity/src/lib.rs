//! Identity domain module (users and departments, event-sourced).
//!
//! This crate contains the business rules for tenant-scoped users (profile,
//! role, direct permission grants) and departments (permission grants plus
//! membership, which is what permission inheritance hangs off). Pure
//! deterministic domain logic: no IO, no HTTP, no storage.

pub mod department;
pub mod user;

pub use department::{
    AddMembers, CreateDepartment, DeleteDepartment, Department, DepartmentCommand,
    DepartmentCreated, DepartmentDeleted, DepartmentEvent, DepartmentId,
    DepartmentPermissionsGranted, DepartmentPermissionsRevoked, DepartmentRenamed,
    GrantDepartmentPermissions, MembersAdded, MembersRemoved, RemoveMembers, RenameDepartment,
    RevokeDepartmentPermissions,
};
pub use user::{
    ChangeRole, CreateUser, DeleteUser, GrantPermissions, RevokePermissions, UpdateUser, User,
    UserCommand, UserCreated, UserDeleted, UserEvent, UserPermissionsGranted,
    UserPermissionsRevoked, UserRoleChanged, UserUpdated,
};
