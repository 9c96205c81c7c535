//! Role DDL text construction.
//!
//! PostgreSQL does not accept bind parameters in role DDL, so these builders
//! interpolate quoted identifiers. Kept pure so the generated statements can
//! be tested without a database.

use crate::types::RoleName;

pub fn create_login_role(name: &RoleName) -> String {
    format!("CREATE ROLE {} LOGIN", name.quoted())
}

pub fn create_group_role(name: &RoleName) -> String {
    format!("CREATE ROLE {} NOLOGIN", name.quoted())
}

pub fn rename_role(old: &RoleName, new: &RoleName) -> String {
    format!("ALTER ROLE {} RENAME TO {}", old.quoted(), new.quoted())
}

pub fn set_login(name: &RoleName, can_login: bool) -> String {
    let capability = if can_login { "LOGIN" } else { "NOLOGIN" };
    format!("ALTER ROLE {} {}", name.quoted(), capability)
}

pub fn drop_role(name: &RoleName) -> String {
    format!("DROP ROLE {}", name.quoted())
}

pub fn grant_membership(group: &RoleName, member: &RoleName) -> String {
    format!("GRANT {} TO {}", group.quoted(), member.quoted())
}

pub fn revoke_membership(group: &RoleName, member: &RoleName) -> String {
    format!("REVOKE {} FROM {}", group.quoted(), member.quoted())
}

pub fn comment_on_role(name: &RoleName, comment: &str) -> String {
    format!("COMMENT ON ROLE {} IS '{}'", name.quoted(), comment.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_statements() {
        let user = RoleName::new("user_smith");
        let group = RoleName::new("role_librarians");
        assert_eq!(create_login_role(&user), "CREATE ROLE \"user_smith\" LOGIN");
        assert_eq!(create_group_role(&group), "CREATE ROLE \"role_librarians\" NOLOGIN");
    }

    #[test]
    fn test_rename_preserves_quoting() {
        let old = RoleName::new("user_smith");
        let new = RoleName::new("user_smithjr");
        assert_eq!(rename_role(&old, &new), "ALTER ROLE \"user_smith\" RENAME TO \"user_smithjr\"");
    }

    #[test]
    fn test_login_toggle() {
        let name = RoleName::new("user_smith");
        assert_eq!(set_login(&name, false), "ALTER ROLE \"user_smith\" NOLOGIN");
        assert_eq!(set_login(&name, true), "ALTER ROLE \"user_smith\" LOGIN");
    }

    #[test]
    fn test_membership_statements() {
        let group = RoleName::new("role_librarians");
        let member = RoleName::new("user_smith");
        assert_eq!(grant_membership(&group, &member), "GRANT \"role_librarians\" TO \"user_smith\"");
        assert_eq!(revoke_membership(&group, &member), "REVOKE \"role_librarians\" FROM \"user_smith\"");
    }

    #[test]
    fn test_embedded_quote_is_doubled() {
        let odd = RoleName::new("user_o\"hara");
        assert_eq!(drop_role(&odd), "DROP ROLE \"user_o\"\"hara\"");
    }

    #[test]
    fn test_comment_escapes_single_quotes() {
        let name = RoleName::new("user_smith");
        assert_eq!(
            comment_on_role(&name, "rolegate:user:o'brien"),
            "COMMENT ON ROLE \"user_smith\" IS 'rolegate:user:o''brien'"
        );
    }
}
