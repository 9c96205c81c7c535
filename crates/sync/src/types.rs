use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Application-side identity kind.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum IdentityKind {
    User,
    Group,
}

/// Classification of a database role from the synchronizer's point of view.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum RoleKind {
    /// Login-capable role mirroring an application user.
    UserRole,
    /// NOLOGIN privilege container mirroring an application group.
    GroupRole,
    /// Pre-existing role with no application counterpart. Never mutated.
    Unmanaged,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::UserRole => "user_role",
            RoleKind::GroupRole => "group_role",
            RoleKind::Unmanaged => "unmanaged",
        }
    }
}

/// A validated database role name.
///
/// Construction does not validate; names produced by the naming policy are
/// already sanitized, and names read back from `pg_roles` are trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(String);

impl RoleName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as a safely double-quoted SQL identifier.
    pub fn quoted(&self) -> String {
        crate::naming::quote_ident(&self.0)
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Snapshot of a database role and its membership edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbRole {
    pub name: RoleName,
    pub kind: RoleKind,
    pub can_login: bool,
    pub member_of: Vec<RoleName>,
}

/// A deferred role removal, queued until the role owns no objects and is not
/// referenced by active sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRemoval {
    pub role: RoleName,
    pub reason: String,
    pub since: DateTime<Utc>,
    pub attempts: u32,
}

impl PendingRemoval {
    pub fn new(role: RoleName, reason: impl Into<String>) -> Self {
        Self {
            role,
            reason: reason.into(),
            since: Utc::now(),
            attempts: 0,
        }
    }
}

/// Externally-owned snapshot of an application user, consumed by full
/// reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppUser {
    pub id: String,
    pub active: bool,
}

/// Externally-owned snapshot of an application group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppGroup {
    pub id: String,
    pub members: Vec<String>,
}

/// What a synchronization operation did.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SyncOutcome {
    /// Database role state was changed.
    Applied,
    /// Event was a replay or otherwise already satisfied; nothing to do.
    Noop,
    /// Role removal was blocked and queued for retry.
    RemovalPending,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_name_display_and_quote() {
        let name = RoleName::new("user_smith");
        assert_eq!(name.to_string(), "user_smith");
        assert_eq!(name.quoted(), "\"user_smith\"");
    }

    #[test]
    fn test_role_name_serde_transparent() {
        let name = RoleName::new("role_librarians");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"role_librarians\"");
        let back: RoleName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }
}
