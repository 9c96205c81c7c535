//! Identity-to-role-name mapping.
//!
//! Pure and deterministic: the same (kind, identifier) pair always maps to
//! the same role name, across process restarts, so replaying synchronization
//! is idempotent. Names that would collide with reserved or unmanaged role
//! patterns are rejected with [`Error::NamingConflict`] instead of being
//! silently rewritten.

use crate::error::{Error, Result};
use crate::types::{IdentityKind, RoleKind, RoleName};

pub use rolegate_postgresqlx::quote_ident;

/// PostgreSQL identifier length limit (NAMEDATALEN - 1).
const MAX_IDENT_BYTES: usize = 63;

const DEFAULT_USER_PREFIX: &str = "user_";
const DEFAULT_GROUP_PREFIX: &str = "role_";

/// Patterns that always denote roles the synchronizer must never touch.
/// A trailing `%` matches any suffix.
const BUILTIN_PROTECTED: &[&str] = &["pg_%", "postgres", "public"];

/// The naming policy: maps application identities to database role names and
/// classifies existing role names.
#[derive(Debug, Clone)]
pub struct RoleNaming {
    user_prefix: String,
    group_prefix: String,
    protected: Vec<String>,
}

impl Default for RoleNaming {
    fn default() -> Self {
        Self::new(DEFAULT_USER_PREFIX, DEFAULT_GROUP_PREFIX).expect("default prefixes are valid")
    }
}

impl RoleNaming {
    /// Create a policy with the given kind prefixes.
    ///
    /// Prefixes must be non-empty, already-sanitized, and must not be a
    /// prefix of one another (distinct kinds must never produce colliding
    /// names).
    pub fn new(user_prefix: impl Into<String>, group_prefix: impl Into<String>) -> Result<Self> {
        let user_prefix = user_prefix.into();
        let group_prefix = group_prefix.into();

        if user_prefix.is_empty() || group_prefix.is_empty() {
            return Err(Error::NamingConflict("role name prefixes must not be empty".to_string()));
        }
        if sanitize(&user_prefix) != user_prefix || sanitize(&group_prefix) != group_prefix {
            return Err(Error::NamingConflict(
                "role name prefixes must be lowercase [a-z0-9_]".to_string(),
            ));
        }
        if user_prefix.starts_with(&group_prefix) || group_prefix.starts_with(&user_prefix) {
            return Err(Error::NamingConflict(format!(
                "prefixes '{user_prefix}' and '{group_prefix}' overlap"
            )));
        }

        Ok(Self {
            user_prefix,
            group_prefix,
            protected: BUILTIN_PROTECTED.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Add operator-supplied protected patterns (unmanaged role names the
    /// synchronizer must refuse to produce or mutate).
    pub fn with_protected(mut self, patterns: impl IntoIterator<Item = String>) -> Self {
        self.protected.extend(patterns);
        self
    }

    /// Derive the role name for an application identity.
    pub fn role_name(&self, kind: IdentityKind, identifier: &str) -> Result<RoleName> {
        if identifier.is_empty() {
            return Err(Error::NamingConflict("identifier is empty".to_string()));
        }

        let sanitized = sanitize(identifier);
        if sanitized.chars().all(|c| c == '_') {
            return Err(Error::NamingConflict(format!(
                "identifier '{identifier}' sanitizes to nothing usable"
            )));
        }

        let prefix = match kind {
            IdentityKind::User => &self.user_prefix,
            IdentityKind::Group => &self.group_prefix,
        };
        let name = format!("{prefix}{sanitized}");

        if name.len() > MAX_IDENT_BYTES {
            return Err(Error::NamingConflict(format!(
                "derived role name '{name}' exceeds {MAX_IDENT_BYTES} bytes"
            )));
        }
        if self.is_protected(&name) {
            return Err(Error::NamingConflict(format!(
                "derived role name '{name}' matches a protected pattern"
            )));
        }

        Ok(RoleName::new(name))
    }

    /// Whether a role name matches a protected (never-touch) pattern.
    pub fn is_protected(&self, name: &str) -> bool {
        self.protected.iter().any(|pattern| match pattern.strip_suffix('%') {
            Some(prefix) => name.starts_with(prefix),
            None => name == pattern,
        })
    }

    /// Classify an existing role name. Anything that does not carry one of
    /// the managed prefixes (or matches a protected pattern) is unmanaged.
    pub fn classify(&self, name: &str) -> RoleKind {
        if self.is_protected(name) {
            return RoleKind::Unmanaged;
        }
        if name.starts_with(&self.user_prefix) {
            RoleKind::UserRole
        } else if name.starts_with(&self.group_prefix) {
            RoleKind::GroupRole
        } else {
            RoleKind::Unmanaged
        }
    }

    pub fn user_prefix(&self) -> &str {
        &self.user_prefix
    }

    pub fn group_prefix(&self) -> &str {
        &self.group_prefix
    }
}

fn sanitize(identifier: &str) -> String {
    identifier
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' { c } else { '_' })
        .collect()
}

/// Provenance tag recorded as the role's comment.
///
/// Lets the synchronizer distinguish roles it created (and which identity
/// they mirror) from look-alike roles someone else created, so it refuses to
/// rename or drop the latter.
pub fn source_tag(kind: IdentityKind, identifier: &str) -> String {
    let kind = match kind {
        IdentityKind::User => "user",
        IdentityKind::Group => "group",
    };
    format!("rolegate:{kind}:{identifier}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_mapping() {
        let naming = RoleNaming::default();
        let a = naming.role_name(IdentityKind::User, "smith").unwrap();
        let b = naming.role_name(IdentityKind::User, "smith").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "user_smith");
    }

    #[test]
    fn test_kind_prefixes_separate() {
        let naming = RoleNaming::default();
        let user = naming.role_name(IdentityKind::User, "librarians").unwrap();
        let group = naming.role_name(IdentityKind::Group, "librarians").unwrap();
        assert_ne!(user, group);
        assert_eq!(group.as_str(), "role_librarians");
    }

    #[test]
    fn test_sanitization() {
        let naming = RoleNaming::default();
        let name = naming.role_name(IdentityKind::User, "Smith Jr.").unwrap();
        assert_eq!(name.as_str(), "user_smith_jr_");
    }

    #[test]
    fn test_empty_identifier_rejected() {
        let naming = RoleNaming::default();
        let err = naming.role_name(IdentityKind::User, "").unwrap_err();
        assert!(crate::error::is_err_naming_conflict(&err));
    }

    #[test]
    fn test_unusable_identifier_rejected() {
        let naming = RoleNaming::default();
        let err = naming.role_name(IdentityKind::User, "!!!").unwrap_err();
        assert!(crate::error::is_err_naming_conflict(&err));
    }

    #[test]
    fn test_length_limit() {
        let naming = RoleNaming::default();
        let long = "x".repeat(80);
        let err = naming.role_name(IdentityKind::User, &long).unwrap_err();
        assert!(crate::error::is_err_naming_conflict(&err));

        // 58 chars + "user_" prefix = 63, exactly at the limit
        let edge = "x".repeat(58);
        assert!(naming.role_name(IdentityKind::User, &edge).is_ok());
    }

    #[test]
    fn test_protected_patterns() {
        let naming = RoleNaming::new("pg_app_", "grp_").unwrap();
        let err = naming.role_name(IdentityKind::User, "monitor").unwrap_err();
        assert!(crate::error::is_err_naming_conflict(&err));
    }

    #[test]
    fn test_custom_protected() {
        let naming = RoleNaming::default().with_protected(vec!["user_backup%".to_string()]);
        let err = naming.role_name(IdentityKind::User, "backup_daily").unwrap_err();
        assert!(crate::error::is_err_naming_conflict(&err));
        assert!(naming.role_name(IdentityKind::User, "backup").is_err());
        assert!(naming.role_name(IdentityKind::User, "smith").is_ok());
    }

    #[test]
    fn test_overlapping_prefixes_rejected() {
        assert!(RoleNaming::new("app_", "app_group_").is_err());
        assert!(RoleNaming::new("", "role_").is_err());
        assert!(RoleNaming::new("User_", "role_").is_err());
    }

    #[test]
    fn test_classify() {
        let naming = RoleNaming::default();
        assert_eq!(naming.classify("user_smith"), RoleKind::UserRole);
        assert_eq!(naming.classify("role_librarians"), RoleKind::GroupRole);
        assert_eq!(naming.classify("postgres"), RoleKind::Unmanaged);
        assert_eq!(naming.classify("pg_monitor"), RoleKind::Unmanaged);
        assert_eq!(naming.classify("backup_admin"), RoleKind::Unmanaged);
    }

    #[test]
    fn test_source_tag() {
        assert_eq!(source_tag(IdentityKind::User, "smith"), "rolegate:user:smith");
        assert_eq!(source_tag(IdentityKind::Group, "librarians"), "rolegate:group:librarians");
    }
}
