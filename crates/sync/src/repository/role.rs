use crate::naming::RoleNaming;
use crate::repository::sql;
use crate::types::{DbRole, RoleName};
use sqlx::PgPool;

/// SQLSTATE raised when a role being created already exists.
const DUPLICATE_OBJECT: &str = "42710";

/// SQLSTATE raised when `DROP ROLE` is blocked by dependent objects.
pub(crate) const DEPENDENT_OBJECTS_STILL_EXIST: &str = "2BP01";

/// Repository for database role operations.
///
/// Stateless; every operation runs against the given pool. Creates and
/// membership changes are upserts so that replaying an at-least-once event
/// never produces duplicates or errors.
pub struct RoleRepository;

impl RoleRepository {
    pub async fn exists(pool: &PgPool, name: &RoleName) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = $1)")
            .bind(name.as_str())
            .fetch_one(pool)
            .await
    }

    /// Load a role and its membership edges, classified by the naming policy.
    pub async fn find(pool: &PgPool, name: &RoleName, naming: &RoleNaming) -> Result<Option<DbRole>, sqlx::Error> {
        let can_login = sqlx::query_scalar::<_, bool>("SELECT rolcanlogin FROM pg_roles WHERE rolname = $1")
            .bind(name.as_str())
            .fetch_optional(pool)
            .await?;

        let Some(can_login) = can_login else {
            return Ok(None);
        };

        let member_of: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT g.rolname FROM pg_auth_members m
            JOIN pg_roles g ON g.oid = m.roleid
            JOIN pg_roles r ON r.oid = m.member
            WHERE r.rolname = $1
            ORDER BY g.rolname
            "#,
        )
        .bind(name.as_str())
        .fetch_all(pool)
        .await?;

        Ok(Some(DbRole {
            kind: naming.classify(name.as_str()),
            name: name.clone(),
            can_login,
            member_of: member_of.into_iter().map(RoleName::new).collect(),
        }))
    }

    /// Create a login-capable role. Returns `false` when the role already
    /// existed (replay), `true` when it was created.
    pub async fn create_login_role(pool: &PgPool, name: &RoleName) -> Result<bool, sqlx::Error> {
        if Self::exists(pool, name).await? {
            return Ok(false);
        }
        match sqlx::query(&sql::create_login_role(name)).execute(pool).await {
            Ok(_) => Ok(true),
            // Lost a create race with a concurrent replay; same end state.
            Err(e) if db_error_code(&e).as_deref() == Some(DUPLICATE_OBJECT) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create a NOLOGIN privilege-container role. Same replay semantics as
    /// [`Self::create_login_role`].
    pub async fn create_group_role(pool: &PgPool, name: &RoleName) -> Result<bool, sqlx::Error> {
        if Self::exists(pool, name).await? {
            return Ok(false);
        }
        match sqlx::query(&sql::create_group_role(name)).execute(pool).await {
            Ok(_) => Ok(true),
            Err(e) if db_error_code(&e).as_deref() == Some(DUPLICATE_OBJECT) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Rename in place. Membership edges and granted privileges survive.
    pub async fn rename_role(pool: &PgPool, old: &RoleName, new: &RoleName) -> Result<(), sqlx::Error> {
        sqlx::query(&sql::rename_role(old, new)).execute(pool).await?;
        Ok(())
    }

    pub async fn set_login(pool: &PgPool, name: &RoleName, can_login: bool) -> Result<(), sqlx::Error> {
        sqlx::query(&sql::set_login(name, can_login)).execute(pool).await?;
        Ok(())
    }

    pub async fn membership_exists(pool: &PgPool, group: &RoleName, member: &RoleName) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM pg_auth_members m
                JOIN pg_roles g ON g.oid = m.roleid
                JOIN pg_roles r ON r.oid = m.member
                WHERE g.rolname = $1 AND r.rolname = $2
            )
            "#,
        )
        .bind(group.as_str())
        .bind(member.as_str())
        .fetch_one(pool)
        .await
    }

    /// Grant group membership. Returns `false` when the edge already existed.
    pub async fn grant_membership(pool: &PgPool, group: &RoleName, member: &RoleName) -> Result<bool, sqlx::Error> {
        if Self::membership_exists(pool, group, member).await? {
            return Ok(false);
        }
        sqlx::query(&sql::grant_membership(group, member)).execute(pool).await?;
        Ok(true)
    }

    /// Revoke group membership. Returns `false` when no edge existed.
    pub async fn revoke_membership(pool: &PgPool, group: &RoleName, member: &RoleName) -> Result<bool, sqlx::Error> {
        if !Self::membership_exists(pool, group, member).await? {
            return Ok(false);
        }
        sqlx::query(&sql::revoke_membership(group, member)).execute(pool).await?;
        Ok(true)
    }

    /// Direct members of a group role.
    pub async fn members_of(pool: &PgPool, group: &RoleName) -> Result<Vec<RoleName>, sqlx::Error> {
        let members: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT r.rolname FROM pg_auth_members m
            JOIN pg_roles g ON g.oid = m.roleid
            JOIN pg_roles r ON r.oid = m.member
            WHERE g.rolname = $1
            ORDER BY r.rolname
            "#,
        )
        .bind(group.as_str())
        .fetch_all(pool)
        .await?;

        Ok(members.into_iter().map(RoleName::new).collect())
    }

    /// Whether the role still owns database objects or holds grants on them
    /// (either blocks `DROP ROLE`).
    pub async fn owns_objects(pool: &PgPool, name: &RoleName) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM pg_shdepend d
                JOIN pg_roles r ON r.oid = d.refobjid
                WHERE r.rolname = $1 AND d.deptype IN ('o', 'a')
            )
            "#,
        )
        .bind(name.as_str())
        .fetch_one(pool)
        .await
    }

    pub async fn has_active_sessions(pool: &PgPool, name: &RoleName) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM pg_stat_activity WHERE usename = $1)")
            .bind(name.as_str())
            .fetch_one(pool)
            .await
    }

    pub async fn drop_role(pool: &PgPool, name: &RoleName) -> Result<(), sqlx::Error> {
        sqlx::query(&sql::drop_role(name)).execute(pool).await?;
        Ok(())
    }

    /// Record the provenance tag as the role's comment.
    pub async fn set_comment(pool: &PgPool, name: &RoleName, comment: &str) -> Result<(), sqlx::Error> {
        sqlx::query(&sql::comment_on_role(name, comment)).execute(pool).await?;
        Ok(())
    }

    /// Read back the role's comment (roles are shared objects, so comments
    /// live in `pg_shdescription`).
    pub async fn get_comment(pool: &PgPool, name: &RoleName) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT d.description FROM pg_shdescription d
            JOIN pg_roles r ON r.oid = d.objoid
            WHERE r.rolname = $1
            "#,
        )
        .bind(name.as_str())
        .fetch_optional(pool)
        .await
    }

    /// List every role carrying one of the managed prefixes.
    pub async fn list_managed(pool: &PgPool, naming: &RoleNaming) -> Result<Vec<DbRole>, sqlx::Error> {
        let mut out = Vec::new();
        for prefix in [naming.user_prefix(), naming.group_prefix()] {
            let pattern = format!("{}%", like_escape(prefix));
            let names: Vec<String> =
                sqlx::query_scalar("SELECT rolname FROM pg_roles WHERE rolname LIKE $1 ESCAPE '\\' ORDER BY rolname")
                    .bind(&pattern)
                    .fetch_all(pool)
                    .await?;
            for name in names {
                let role_name = RoleName::new(name);
                if let Some(role) = Self::find(pool, &role_name, naming).await? {
                    out.push(role);
                }
            }
        }
        Ok(out)
    }
}

/// SQLSTATE of a database-side error, if any.
pub(crate) fn db_error_code(e: &sqlx::Error) -> Option<String> {
    match e {
        sqlx::Error::Database(db) => db.code().map(|c| c.to_string()),
        _ => None,
    }
}

/// Escape LIKE wildcards so a prefix containing `_` matches literally.
fn like_escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_escape() {
        assert_eq!(like_escape("user_"), "user\\_");
        assert_eq!(like_escape("100%"), "100\\%");
        assert_eq!(like_escape("a\\b"), "a\\\\b");
    }
}
