//! Purchasing domain module (vendors and expenses, event-sourced).
//!
//! Straightforward tenant-scoped CRUD aggregates. Monetary amounts are
//! integers in minor units; tax handling is a flag on the expense saying
//! whether the recorded amount already includes tax.

pub mod expense;
pub mod vendor;

pub use expense::{
    CreateExpense, DeleteExpense, Expense, ExpenseCommand, ExpenseCreated, ExpenseDeleted,
    ExpenseDetails, ExpenseEvent, ExpenseId, ExpenseUpdated, UpdateExpense,
};
pub use vendor::{
    CreateVendor, DeleteVendor, UpdateVendor, Vendor, VendorCommand, VendorCreated, VendorDeleted,
    VendorEvent, VendorId, VendorProfile, VendorUpdated,
};
