//! Static permission registry.
//!
//! The catalogue of declared permissions is configuration, not data: every
//! permission codename lives under a model, every model under a category.
//! The source-of-truth resolver walks this registry so a report always covers
//! the full declared catalogue, not just the codenames a subject happens to
//! hold.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::permission::Permission;

/// A declared permission: codename plus human-readable name (for audit UIs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDescriptor {
    pub codename: String,
    pub name: String,
}

impl PermissionDescriptor {
    fn standard(action: &str, model: &str) -> Self {
        Self {
            codename: format!("{action}_{model}"),
            name: format!("Can {action} {model}"),
        }
    }

    fn custom(codename: &str, name: &str) -> Self {
        Self {
            codename: codename.to_string(),
            name: name.to_string(),
        }
    }

    pub fn permission(&self) -> Permission {
        Permission::new(self.codename.clone())
    }
}

/// Registry of permission categories: category → model → declared permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRegistry {
    categories: BTreeMap<String, BTreeMap<String, Vec<PermissionDescriptor>>>,
}

/// Standard per-model actions, mirroring the add/view/change/delete CRUD set.
const STANDARD_ACTIONS: [&str; 4] = ["add", "view", "change", "delete"];

impl PermissionRegistry {
    /// The statically declared catalogue for this deployment.
    pub fn declared() -> Self {
        let mut categories: BTreeMap<String, BTreeMap<String, Vec<PermissionDescriptor>>> =
            BTreeMap::new();

        let mut organisation: BTreeMap<String, Vec<PermissionDescriptor>> = BTreeMap::new();
        let mut user_perms = standard_perms("user");
        user_perms.push(PermissionDescriptor::custom(
            "custom_update_users",
            "Can bulk-update organisation users",
        ));
        organisation.insert("user".to_string(), user_perms);
        organisation.insert("department".to_string(), standard_perms("department"));
        let mut org_perms = standard_perms("organisation");
        org_perms.push(PermissionDescriptor::custom(
            "custom_view_all_organisations",
            "Can view all organisations",
        ));
        organisation.insert("organisation".to_string(), org_perms);
        categories.insert("organisation".to_string(), organisation);

        let mut purchase: BTreeMap<String, Vec<PermissionDescriptor>> = BTreeMap::new();
        purchase.insert("vendor".to_string(), standard_perms("vendor"));
        purchase.insert("expense".to_string(), standard_perms("expense"));
        categories.insert("purchase".to_string(), purchase);

        let mut accounting: BTreeMap<String, Vec<PermissionDescriptor>> = BTreeMap::new();
        accounting.insert("invoice".to_string(), standard_perms("invoice"));
        accounting.insert("account".to_string(), standard_perms("account"));
        categories.insert("accounting".to_string(), accounting);

        Self { categories }
    }

    /// Iterate categories in stable order.
    pub fn categories(
        &self,
    ) -> impl Iterator<Item = (&String, &BTreeMap<String, Vec<PermissionDescriptor>>)> {
        self.categories.iter()
    }

    pub fn category_names(&self) -> Vec<&str> {
        self.categories.keys().map(String::as_str).collect()
    }

    /// All declared descriptors across every category/model.
    pub fn all_descriptors(&self) -> impl Iterator<Item = &PermissionDescriptor> {
        self.categories
            .values()
            .flat_map(|models| models.values())
            .flatten()
    }

    /// Whether a codename is part of the declared catalogue.
    pub fn declares(&self, codename: &str) -> bool {
        self.all_descriptors().any(|d| d.codename == codename)
    }
}

fn standard_perms(model: &str) -> Vec<PermissionDescriptor> {
    STANDARD_ACTIONS
        .iter()
        .map(|action| PermissionDescriptor::standard(action, model))
        .collect()
}
