//! Permission provenance resolver.
//!
//! Answers "where does this permission come from?" for a subject: every
//! declared permission is reported with an `active` flag (held at all) and an
//! `inherited` flag (held only through department membership). The report is
//! keyed category → model → entries and always covers the full declared
//! catalogue, so an inactive permission is visible as such rather than
//! silently absent.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::permission::PermissionSet;
use crate::registry::{PermissionDescriptor, PermissionRegistry};

/// Provenance of a single declared permission for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionStatus {
    pub perm: PermissionDescriptor,
    /// Held at all (directly or through a department).
    pub active: bool,
    /// Held *only* through department membership.
    pub inherited: bool,
}

/// Full provenance report: category → model → declared permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SourceOfTruthReport(pub BTreeMap<String, BTreeMap<String, Vec<PermissionStatus>>>);

impl SourceOfTruthReport {
    /// Entries for one model, wherever its category is.
    pub fn model(&self, model: &str) -> Option<&Vec<PermissionStatus>> {
        self.0.values().find_map(|models| models.get(model))
    }

    pub fn category_names(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

/// Resolve the source-of-truth report for a subject.
///
/// - `direct`: permissions assigned to the subject itself.
/// - `inherited`: union of the direct permission sets of the departments the
///   subject belongs to (empty for department subjects and for the
///   subject-less catalogue view).
///
/// `active` = codename ∈ direct ∪ inherited;
/// `inherited` = codename ∈ inherited ∧ codename ∉ direct.
///
/// Pure read: no side effects, deterministic output order.
pub fn resolve_source_of_truth(
    registry: &PermissionRegistry,
    direct: &PermissionSet,
    inherited: &PermissionSet,
) -> SourceOfTruthReport {
    let mut report: BTreeMap<String, BTreeMap<String, Vec<PermissionStatus>>> = BTreeMap::new();

    for (category, models) in registry.categories() {
        let mut model_reports: BTreeMap<String, Vec<PermissionStatus>> = BTreeMap::new();

        for (model, descriptors) in models {
            let entries = descriptors
                .iter()
                .map(|descriptor| {
                    let is_direct = direct.contains_codename(&descriptor.codename);
                    let is_inherited = inherited.contains_codename(&descriptor.codename);
                    PermissionStatus {
                        perm: descriptor.clone(),
                        active: is_direct || is_inherited,
                        inherited: is_inherited && !is_direct,
                    }
                })
                .collect();

            model_reports.insert(model.clone(), entries);
        }

        report.insert(category.clone(), model_reports);
    }

    SourceOfTruthReport(report)
}
