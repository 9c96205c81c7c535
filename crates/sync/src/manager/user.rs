// User lifecycle methods for RoleSys

use super::{check_ownership, Ownership};
use crate::error::{Error, Result};
use crate::naming::source_tag;
use crate::repository::role::{db_error_code, DEPENDENT_OBJECTS_STILL_EXIST};
use crate::repository::RoleRepository;
use crate::types::{IdentityKind, SyncOutcome};
use tracing::info;

pub(crate) trait RoleSysUserExt {
    async fn create_user(&self, id: &str) -> Result<SyncOutcome>;
    async fn rename_user(&self, old_id: &str, new_id: &str) -> Result<SyncOutcome>;
    async fn set_user_active(&self, id: &str, active: bool) -> Result<SyncOutcome>;
    async fn delete_user(&self, id: &str) -> Result<SyncOutcome>;
}

impl RoleSysUserExt for crate::sys::RoleSys {
    async fn create_user(&self, id: &str) -> Result<SyncOutcome> {
        let name = self.naming.role_name(IdentityKind::User, id)?;
        let tag = source_tag(IdentityKind::User, id);

        if RoleRepository::exists(&self.pool, &name).await? {
            return match check_ownership(self, &name, IdentityKind::User, id).await? {
                // Replay of an already-processed create.
                Ownership::Ours => Ok(SyncOutcome::Noop),
                Ownership::OursOther(other) => Err(Error::NamingConflict(format!(
                    "role '{name}' already mirrors another identity ({other})"
                ))),
                Ownership::Untagged => Err(Error::NamingConflict(format!(
                    "role '{name}' exists but was not created by the synchronizer"
                ))),
            };
        }

        RoleRepository::create_login_role(&self.pool, &name).await?;
        RoleRepository::set_comment(&self.pool, &name, &tag).await?;
        info!("created login role '{}' for user '{}'", name, id);
        Ok(SyncOutcome::Applied)
    }

    async fn rename_user(&self, old_id: &str, new_id: &str) -> Result<SyncOutcome> {
        let old_name = self.naming.role_name(IdentityKind::User, old_id)?;
        let new_name = self.naming.role_name(IdentityKind::User, new_id)?;
        let new_tag = source_tag(IdentityKind::User, new_id);

        if old_name == new_name {
            // Sanitization collapsed the rename; move the provenance tag so
            // it keeps naming the current identifier.
            if RoleRepository::exists(&self.pool, &old_name).await? {
                RoleRepository::set_comment(&self.pool, &old_name, &new_tag).await?;
            }
            return Ok(SyncOutcome::Noop);
        }

        if RoleRepository::exists(&self.pool, &new_name).await? {
            return match check_ownership(self, &new_name, IdentityKind::User, new_id).await? {
                // Replay: the rename already happened.
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
            // The create event was never seen (or arrived after a crash);
            // synthesize the role under its current identifier.
            RoleRepository::create_login_role(&self.pool, &new_name).await?;
            RoleRepository::set_comment(&self.pool, &new_name, &new_tag).await?;
            info!("created login role '{}' for renamed user '{}'", new_name, new_id);
            return Ok(SyncOutcome::Applied);
        }

        match check_ownership(self, &old_name, IdentityKind::User, old_id).await? {
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
        info!("renamed role '{}' to '{}', memberships and grants retained", old_name, new_name);
        Ok(SyncOutcome::Applied)
    }

    async fn set_user_active(&self, id: &str, active: bool) -> Result<SyncOutcome> {
        let name = self.naming.role_name(IdentityKind::User, id)?;
        let Some(role) = RoleRepository::find(&self.pool, &name, &self.naming).await? else {
            return Err(Error::NoSuchRole(name.to_string()));
        };

        match check_ownership(self, &name, IdentityKind::User, id).await? {
            Ownership::Ours => {}
            Ownership::OursOther(other) => {
                return Err(Error::NamingConflict(format!(
                    "role '{name}' mirrors another identity ({other})"
                )))
            }
            Ownership::Untagged => return Err(Error::Protected(name.to_string())),
        }

        if role.can_login == active {
            return Ok(SyncOutcome::Noop);
        }

        RoleRepository::set_login(&self.pool, &name, active).await?;
        if active {
            info!("restored login for role '{}'", name);
        } else {
            info!("revoked login for role '{}', grants retained", name);
        }
        Ok(SyncOutcome::Applied)
    }

    async fn delete_user(&self, id: &str) -> Result<SyncOutcome> {
        let name = self.naming.role_name(IdentityKind::User, id)?;

        if !RoleRepository::exists(&self.pool, &name).await? {
            return Ok(SyncOutcome::Noop);
        }

        match check_ownership(self, &name, IdentityKind::User, id).await? {
            Ownership::Ours => {}
            Ownership::OursOther(other) => {
                return Err(Error::NamingConflict(format!(
                    "role '{name}' mirrors another identity ({other}), refusing removal"
                )))
            }
            Ownership::Untagged => return Err(Error::Protected(name.to_string())),
        }

        if RoleRepository::owns_objects(&self.pool, &name).await? {
            self.queue_removal(name, "role still owns objects or holds grants").await;
            return Ok(SyncOutcome::RemovalPending);
        }
        if RoleRepository::has_active_sessions(&self.pool, &name).await? {
            self.queue_removal(name, "role is referenced by active sessions").await;
            return Ok(SyncOutcome::RemovalPending);
        }

        match RoleRepository::drop_role(&self.pool, &name).await {
            Ok(()) => {
                info!("dropped role '{}' for deleted user '{}'", name, id);
                Ok(SyncOutcome::Applied)
            }
            // Dependency appeared between the check and the drop.
            Err(e) if db_error_code(&e).as_deref() == Some(DEPENDENT_OBJECTS_STILL_EXIST) => {
                self.queue_removal(name, "role still owns objects or holds grants").await;
                Ok(SyncOutcome::RemovalPending)
            }
            Err(e) => Err(e.into()),
        }
    }
}
