//! Identity lifecycle events.
//!
//! Delivered at-least-once by the application's identity store (or a queue in
//! front of it); every handler in the synchronizer is an upsert, so replaying
//! an event is always safe.

use crate::types::IdentityKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdentityEvent {
    UserCreated { id: String },
    UserRenamed { old_id: String, new_id: String },
    UserDeactivated { id: String },
    UserReactivated { id: String },
    UserDeleted { id: String },
    GroupCreated { id: String },
    GroupRenamed { old_id: String, new_id: String },
    GroupDeleted { id: String },
    MembershipChanged {
        group_id: String,
        #[serde(default)]
        added: Vec<String>,
        #[serde(default)]
        removed: Vec<String>,
    },
}

impl IdentityEvent {
    /// The key the synchronizer serializes on.
    ///
    /// Operations on the same identity must not interleave (two rapid renames
    /// would otherwise race); membership changes serialize on the group, whose
    /// state they mutate. Renames key on the old identifier so that a rename
    /// and a preceding event for the same identity queue behind each other.
    pub fn identity_key(&self) -> &str {
        match self {
            IdentityEvent::UserCreated { id }
            | IdentityEvent::UserDeactivated { id }
            | IdentityEvent::UserReactivated { id }
            | IdentityEvent::UserDeleted { id }
            | IdentityEvent::GroupCreated { id }
            | IdentityEvent::GroupDeleted { id } => id,
            IdentityEvent::UserRenamed { old_id, .. } | IdentityEvent::GroupRenamed { old_id, .. } => old_id,
            IdentityEvent::MembershipChanged { group_id, .. } => group_id,
        }
    }

    pub fn kind(&self) -> IdentityKind {
        match self {
            IdentityEvent::UserCreated { .. }
            | IdentityEvent::UserRenamed { .. }
            | IdentityEvent::UserDeactivated { .. }
            | IdentityEvent::UserReactivated { .. }
            | IdentityEvent::UserDeleted { .. } => IdentityKind::User,
            IdentityEvent::GroupCreated { .. }
            | IdentityEvent::GroupRenamed { .. }
            | IdentityEvent::GroupDeleted { .. }
            | IdentityEvent::MembershipChanged { .. } => IdentityKind::Group,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_serde() {
        let event = IdentityEvent::MembershipChanged {
            group_id: "librarians".to_string(),
            added: vec!["smith".to_string()],
            removed: vec![],
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"membership_changed\""));
        let back: IdentityEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_membership_lists_default() {
        let event: IdentityEvent =
            serde_json::from_str(r#"{"type":"membership_changed","group_id":"librarians"}"#).unwrap();
        match event {
            IdentityEvent::MembershipChanged { added, removed, .. } => {
                assert!(added.is_empty());
                assert!(removed.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_identity_key() {
        let rename = IdentityEvent::UserRenamed {
            old_id: "smith".to_string(),
            new_id: "smithjr".to_string(),
        };
        assert_eq!(rename.identity_key(), "smith");

        let membership = IdentityEvent::MembershipChanged {
            group_id: "librarians".to_string(),
            added: vec![],
            removed: vec![],
        };
        assert_eq!(membership.identity_key(), "librarians");
        assert_eq!(membership.kind(), IdentityKind::Group);
    }
}
