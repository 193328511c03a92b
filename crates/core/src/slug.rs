//! URL slug value object.
//!
//! Slugs are derived, never free-form: a tenant's slug is always recomputed
//! from its organisation name, so renames keep the two in sync.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A lowercase, hyphen-separated slug (value object: compared by value).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    /// Derive a slug from an arbitrary display name.
    ///
    /// Alphanumerics are lowercased; every other run of characters collapses
    /// into a single hyphen. Fails if nothing slug-worthy remains.
    pub fn derive(name: &str) -> DomainResult<Self> {
        let mut out = String::with_capacity(name.len());
        let mut pending_sep = false;

        for ch in name.chars() {
            if ch.is_alphanumeric() {
                if pending_sep && !out.is_empty() {
                    out.push('-');
                }
                pending_sep = false;
                out.extend(ch.to_lowercase());
            } else {
                pending_sep = true;
            }
        }

        if out.is_empty() {
            return Err(DomainError::validation(format!(
                "cannot derive slug from '{name}'"
            )));
        }

        Ok(Self(out))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Slug {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
