use std::collections::BTreeSet;

use opsdesk_auth::Permission;
use opsdesk_core::UserId;

use crate::app::errors;

/// Parse a batch of user ids, deduplicating as we go. Any unparseable id
/// fails the whole request.
pub fn parse_user_ids(raw: &[String]) -> Result<BTreeSet<UserId>, axum::response::Response> {
    let mut ids = BTreeSet::new();
    for s in raw {
        let id: UserId = s.parse().map_err(|_| errors::invalid_id("user"))?;
        ids.insert(id);
    }
    Ok(ids)
}

pub fn parse_permissions(raw: Vec<String>) -> Vec<Permission> {
    raw.into_iter().map(Permission::new).collect()
}
