// Group lifecycle and membership methods for RoleSys

use super::{check_ownership, Ownership};
use crate::error::{Error, Result};
use crate::naming::source_tag;
use crate::repository::role::{db_error_code, DEPENDENT_OBJECTS_STILL_EXIST};
use crate::repository::RoleRepository;
use crate::types::{IdentityKind, SyncOutcome};
use tracing::info;

pub(crate) trait RoleSysGroupExt {
    async fn create_group(&self, id: &str) -> Result<SyncOutcome>;
    async fn rename_group(&self, old_id: &str, new_id: &str) -> Result<SyncOutcome>;
    async fn delete_group(&self, id: &str) -> Result<SyncOutcome>;
    async fn membership_changed(&self, group_id: &str, added: &[String], removed: &[String]) -> Result<SyncOutcome>;
}

impl RoleSysGroupExt for crate::sys::RoleSys {
    async fn create_group(&self, id: &str) -> Result<SyncOutcome> {
        let name = self.naming.role_name(IdentityKind::Group, id)?;
        let tag = source_tag(IdentityKind::Group, id);

        if RoleRepository::exists(&self.pool, &name).await? {
            return match check_ownership(self, &name, IdentityKind::Group, id).await? {
                Ownership::Ours => Ok(SyncOutcome::Noop),
                Ownership::OursOther(other) => Err(Error::NamingConflict(format!(
                    "role '{name}' already mirrors another identity ({other})"
                ))),
                Ownership::Untagged => Err(Error::NamingConflict(format!(
                    "role '{name}' exists but was not created by the synchronizer"
                ))),
            };
        }

        RoleRepository::create_group_role(&self.pool, &name).await?;
        RoleRepository::set_comment(&self.pool, &name, &tag).await?;
        info!("created group role '{}' for group '{}'", name, id);
        Ok(SyncOutcome::Applied)
    }

    async fn rename_group(&self, old_id: &str, new_id: &str) -> Result<SyncOutcome> {
        let old_name = self.naming.role_name(IdentityKind::Group, old_id)?;
        let new_name = self.naming.role_name(IdentityKind::Group, new_id)?;
        let new_tag = source_tag(IdentityKind::Group, new_id);

        if old_name == new_name {
            if RoleRepository::exists(&self.pool, &old_name).await? {
                RoleRepository::set_comment(&self.pool, &old_name, &new_tag).await?;
            }
            return Ok(SyncOutcome::Noop);
        }

        if RoleRepository::exists(&self.pool, &new_name).await? {
            return match check_ownership(self, &new_name, IdentityKind::Group, new_id).await? {
                Ownership::Ours => Ok(SyncOutcome::Noop),
                Ownership::OursOther(other) => Err(Error::NamingConflict(format!(
                    "rename target '{new_name}' already mirrors another identity ({other})"
                ))),
                Ownership::Untagged => Err(Error::NamingConflict(format!(
                    "rename target '{new_name}' exists but was not created by the synchronizer"
                ))),
            };
        }

        if !RoleRepository::exists(&self.pool, &old_name).await? {
            RoleRepository::create_group_role(&self.pool, &new_name).await?;
            RoleRepository::set_comment(&self.pool, &new_name, &new_tag).await?;
            info!("created group role '{}' for renamed group '{}'", new_name, new_id);
            return Ok(SyncOutcome::Applied);
        }

        match check_ownership(self, &old_name, IdentityKind::Group, old_id).await? {
            Ownership::Ours => {}
            Ownership::OursOther(other) => {
                return Err(Error::NamingConflict(format!(
                    "role '{old_name}' mirrors another identity ({other}), refusing rename"
                )))
            }
            Ownership::Untagged => return Err(Error::Protected(old_name.to_string())),
        }

        RoleRepository::rename_role(&self.pool, &old_name, &new_name).await?;
        RoleRepository::set_comment(&self.pool, &new_name, &new_tag).await?;
        info!("renamed group role '{}' to '{}', members and grants retained", old_name, new_name);
        Ok(SyncOutcome::Applied)
    }

    async fn delete_group(&self, id: &str) -> Result<SyncOutcome> {
        let name = self.naming.role_name(IdentityKind::Group, id)?;

        if !RoleRepository::exists(&self.pool, &name).await? {
            return Ok(SyncOutcome::Noop);
        }

        match check_ownership(self, &name, IdentityKind::Group, id).await? {
            Ownership::Ours => {}
            Ownership::OursOther(other) => {
                return Err(Error::NamingConflict(format!(
                    "role '{name}' mirrors another identity ({other}), refusing removal"
                )))
            }
            Ownership::Untagged => return Err(Error::Protected(name.to_string())),
        }

        if RoleRepository::owns_objects(&self.pool, &name).await? {
            self.queue_removal(name, "group role still owns objects or holds grants").await;
            return Ok(SyncOutcome::RemovalPending);
        }

        // Membership edges do not block DROP ROLE; they are removed with it.
        match RoleRepository::drop_role(&self.pool, &name).await {
            Ok(()) => {
                info!("dropped group role '{}' for deleted group '{}'", name, id);
                Ok(SyncOutcome::Applied)
            }
            Err(e) if db_error_code(&e).as_deref() == Some(DEPENDENT_OBJECTS_STILL_EXIST) => {
                self.queue_removal(name, "group role still owns objects or holds grants").await;
                Ok(SyncOutcome::RemovalPending)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn membership_changed(&self, group_id: &str, added: &[String], removed: &[String]) -> Result<SyncOutcome> {
        let group_name = self.naming.role_name(IdentityKind::Group, group_id)?;

        if !RoleRepository::exists(&self.pool, &group_name).await? {
            // At-least-once delivery: a membership change can outrun the
            // group's own create event.
            RoleRepository::create_group_role(&self.pool, &group_name).await?;
            RoleRepository::set_comment(&self.pool, &group_name, &source_tag(IdentityKind::Group, group_id)).await?;
            info!("created group role '{}' ahead of its create event", group_name);
        } else {
            match check_ownership(self, &group_name, IdentityKind::Group, group_id).await? {
                Ownership::Ours => {}
                Ownership::OursOther(other) => {
                    return Err(Error::NamingConflict(format!(
                        "role '{group_name}' mirrors another identity ({other})"
                    )))
                }
                Ownership::Untagged => return Err(Error::Protected(group_name.to_string())),
            }
        }

        let mut changed = false;

        for member in added {
            let member_name = self.naming.role_name(IdentityKind::User, member)?;
            if !RoleRepository::exists(&self.pool, &member_name).await? {
                RoleRepository::create_login_role(&self.pool, &member_name).await?;
                RoleRepository::set_comment(&self.pool, &member_name, &source_tag(IdentityKind::User, member)).await?;
                info!("created user role '{}' ahead of its create event", member_name);
            }
            if RoleRepository::grant_membership(&self.pool, &group_name, &member_name).await? {
                info!("granted '{}' to '{}'", group_name, member_name);
                changed = true;
            }
        }

        for member in removed {
            let member_name = self.naming.role_name(IdentityKind::User, member)?;
            if !RoleRepository::exists(&self.pool, &member_name).await? {
                continue;
            }
            if RoleRepository::revoke_membership(&self.pool, &group_name, &member_name).await? {
                info!("revoked '{}' from '{}'", group_name, member_name);
                changed = true;
            }
        }

        Ok(if changed { SyncOutcome::Applied } else { SyncOutcome::Noop })
    }
}
