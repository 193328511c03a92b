//! Read-model projections.
//!
//! Each projection folds published event envelopes into a read model and
//! ignores envelopes for other aggregate types, so they can all share one
//! bus subscription. Delivery is at-least-once; every fold is idempotent.

pub mod departments;
pub mod expenses;
pub mod organisations;
pub mod users;
pub mod vendors;

pub use departments::{DepartmentReadModel, DepartmentsProjection};
pub use expenses::{ExpenseReadModel, ExpensesProjection};
pub use organisations::OrganisationsProjection;
pub use users::{UserReadModel, UsersProjection};
pub use vendors::{VendorReadModel, VendorsProjection};
