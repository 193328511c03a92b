use serde::{Deserialize, Serialize};

use crate::permission::{Permission, PermissionSet};

/// Role of a user within their tenant.
///
/// Roles are coarse: fine-grained access is decided by permission sets. The
/// role contributes a *default* permission set on enrolment and gates a small
/// number of management-only operations (e.g. inspecting another user's
/// permissions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Employee,
    Manager,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Employee => "employee",
            UserRole::Manager => "manager",
            UserRole::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    /// Management roles may inspect other subjects' permissions.
    pub fn is_management(&self) -> bool {
        matches!(self, UserRole::Manager | UserRole::Admin)
    }

    /// The permission set granted when a user with this role is enrolled in
    /// an organisation.
    pub fn default_permissions(&self) -> PermissionSet {
        match self {
            // Admins authorize through the wildcard; no need to enumerate.
            UserRole::Admin => [Permission::new("*")].into_iter().collect(),
            UserRole::Manager => [
                "add_user",
                "view_user",
                "change_user",
                "view_department",
                "change_department",
                "view_organisation",
                "view_vendor",
                "change_vendor",
                "view_expense",
                "change_expense",
                "view_invoice",
                "view_account",
            ]
            .into_iter()
            .map(Permission::from)
            .collect(),
            UserRole::Employee => [
                "view_user",
                "view_department",
                "view_vendor",
                "view_expense",
            ]
            .into_iter()
            .map(Permission::from)
            .collect(),
        }
    }
}

impl core::fmt::Display for UserRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_matches_seniority() {
        assert!(UserRole::Admin > UserRole::Manager);
        assert!(UserRole::Manager > UserRole::Employee);
    }

    #[test]
    fn only_management_inspects_others() {
        assert!(!UserRole::Employee.is_management());
        assert!(UserRole::Manager.is_management());
        assert!(UserRole::Admin.is_management());
    }

    #[test]
    fn admin_defaults_are_wildcard() {
        assert!(UserRole::Admin.default_permissions().has_wildcard());
        assert!(!UserRole::Employee.default_permissions().has_wildcard());
    }
}
