//! Identity-to-role synchronization.
//!
//! Keeps PostgreSQL roles consistent with an application's users and groups
//! as they are created, renamed, deactivated, deleted, or regrouped, and
//! applies declared per-entity permission statements at migration time. The
//! database itself is the source of truth for role state, so synchronization
//! is a convergent, retryable reconciliation: every operation is an upsert
//! and replaying events is safe.

pub mod applier;
pub mod error;
pub mod events;
pub mod naming;
pub mod repository;
pub mod types;

mod manager;
mod sys;

pub use applier::{DeclarationApplier, PermissionDeclaration, SqlDeclarationApplier};
pub use error::{is_err_naming_conflict, is_err_no_such_role, is_err_protected, Error, Result};
pub use events::IdentityEvent;
pub use manager::reconcile::ReconcileSummary;
pub use naming::{quote_ident, source_tag, RoleNaming};
pub use sys::{get, init_role_sys, spawn_event_worker, spawn_pending_worker, RoleSys};
pub use types::{
    AppGroup, AppUser, DbRole, IdentityKind, PendingRemoval, RoleKind, RoleName, SyncOutcome,
};
