// Full-state reconciliation for RoleSys
//
// Convergent pass used at startup or after missed events: upserts every
// derivable role, aligns login flags and membership edges exactly, and leaves
// unmanaged roles untouched.

use super::{check_ownership, Ownership};
use crate::error::{Error, Result};
use crate::naming::source_tag;
use crate::repository::RoleRepository;
use crate::sys::RoleSys;
use crate::types::{AppGroup, AppUser, IdentityKind, RoleKind, RoleName};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{error, info};

#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileSummary {
    pub users_synced: usize,
    pub groups_synced: usize,
    pub grants: usize,
    pub revokes: usize,
    /// Pre-existing tagless roles with a managed name that were taken over.
    pub adopted: usize,
    /// Identities left unsynchronized; each failure was logged individually.
    pub failures: usize,
    pub removals_completed: usize,
    pub removals_pending: usize,
}

pub(crate) trait RoleSysReconcileExt {
    async fn resync(&self, users: &[AppUser], groups: &[AppGroup]) -> ReconcileSummary;
}

impl RoleSysReconcileExt for RoleSys {
    async fn resync(&self, users: &[AppUser], groups: &[AppGroup]) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for user in users {
            let lock = self.lock_for(&user.id);
            let _guard = lock.lock().await;
            if let Err(e) = resync_user(self, user, &mut summary).await {
                error!("resync of user '{}' failed: {}", user.id, e);
                summary.failures += 1;
            } else {
                summary.users_synced += 1;
            }
        }

        for group in groups {
            let lock = self.lock_for(&group.id);
            let _guard = lock.lock().await;
            if let Err(e) = resync_group(self, group, &mut summary).await {
                error!("resync of group '{}' failed: {}", group.id, e);
                summary.failures += 1;
            } else {
                summary.groups_synced += 1;
            }
        }

        summary.removals_completed = self.retry_pending().await;
        summary.removals_pending = self.pending().await.len();

        info!(
            "resync complete: {} users, {} groups, {} grants, {} revokes, {} failures",
            summary.users_synced, summary.groups_synced, summary.grants, summary.revokes, summary.failures
        );
        summary
    }
}

/// Upsert a role for the identity, adopting tagless look-alikes. Returns the
/// role name so callers can continue aligning state.
async fn upsert_role(
    sys: &RoleSys,
    kind: IdentityKind,
    id: &str,
    summary: &mut ReconcileSummary,
) -> Result<RoleName> {
    let name = sys.naming.role_name(kind, id)?;
    let tag = source_tag(kind, id);

    if !RoleRepository::exists(&sys.pool, &name).await? {
        let created = match kind {
            IdentityKind::User => RoleRepository::create_login_role(&sys.pool, &name).await?,
            IdentityKind::Group => RoleRepository::create_group_role(&sys.pool, &name).await?,
        };
        RoleRepository::set_comment(&sys.pool, &name, &tag).await?;
        if created {
            info!("resync created role '{}'", name);
        }
        return Ok(name);
    }

    match check_ownership(sys, &name, kind, id).await? {
        Ownership::Ours => {}
        Ownership::OursOther(other) => {
            return Err(Error::NamingConflict(format!(
                "role '{name}' already mirrors another identity ({other})"
            )))
        }
        Ownership::Untagged => {
            // Unlike the event path, an operator-driven resync is the place
            // where pre-existing roles get taken under management.
            RoleRepository::set_comment(&sys.pool, &name, &tag).await?;
            info!("adopted existing role '{}'", name);
            summary.adopted += 1;
        }
    }
    Ok(name)
}

async fn resync_user(sys: &RoleSys, user: &AppUser, summary: &mut ReconcileSummary) -> Result<()> {
    let name = upsert_role(sys, IdentityKind::User, &user.id, summary).await?;

    if let Some(role) = RoleRepository::find(&sys.pool, &name, &sys.naming).await? {
        if role.can_login != user.active {
            RoleRepository::set_login(&sys.pool, &name, user.active).await?;
            info!("resync aligned login for '{}' to {}", name, user.active);
        }
    }
    Ok(())
}

async fn resync_group(sys: &RoleSys, group: &AppGroup, summary: &mut ReconcileSummary) -> Result<()> {
    let group_name = upsert_role(sys, IdentityKind::Group, &group.id, summary).await?;

    let mut desired = HashSet::new();
    for member in &group.members {
        let member_name = sys.naming.role_name(IdentityKind::User, member)?;
        if !RoleRepository::exists(&sys.pool, &member_name).await? {
            RoleRepository::create_login_role(&sys.pool, &member_name).await?;
            RoleRepository::set_comment(&sys.pool, &member_name, &source_tag(IdentityKind::User, member)).await?;
        }
        desired.insert(member_name);
    }

    let actual: HashSet<RoleName> = RoleRepository::members_of(&sys.pool, &group_name).await?.into_iter().collect();

    for member_name in desired.difference(&actual) {
        if RoleRepository::grant_membership(&sys.pool, &group_name, member_name).await? {
            summary.grants += 1;
        }
    }

    for member_name in actual.difference(&desired) {
        // Only managed user roles are pruned; memberships granted out-of-band
        // to unmanaged roles are none of our business.
        if sys.naming.classify(member_name.as_str()) != RoleKind::UserRole {
            continue;
        }
        if RoleRepository::revoke_membership(&sys.pool, &group_name, member_name).await? {
            summary.revokes += 1;
        }
    }

    Ok(())
}
