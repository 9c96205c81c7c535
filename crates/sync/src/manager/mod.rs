pub(crate) mod group;
pub(crate) mod reconcile;
pub(crate) mod user;

use crate::error::Result;
use crate::naming::source_tag;
use crate::repository::RoleRepository;
use crate::sys::RoleSys;
use crate::types::{IdentityKind, RoleName};

/// Provenance of an existing role, judged from its comment tag.
pub(crate) enum Ownership {
    /// Created by the synchronizer for exactly this identity.
    Ours,
    /// Created by the synchronizer, but for a different identity: a
    /// sanitization collision between distinct identifiers.
    OursOther(String),
    /// No synchronizer tag: someone else's role wearing a managed prefix.
    Untagged,
}

pub(crate) async fn check_ownership(
    sys: &RoleSys,
    name: &RoleName,
    kind: IdentityKind,
    identifier: &str,
) -> Result<Ownership> {
    let expected = source_tag(kind, identifier);
    match RoleRepository::get_comment(&sys.pool, name).await? {
        Some(tag) if tag == expected => Ok(Ownership::Ours),
        Some(tag) if tag.starts_with("rolegate:") => Ok(Ownership::OursOther(tag)),
        _ => Ok(Ownership::Untagged),
    }
}
