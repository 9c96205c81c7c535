use crate::error::{Error, Result};
use crate::events::IdentityEvent;
use crate::manager::group::RoleSysGroupExt;
use crate::manager::user::RoleSysUserExt;
use crate::naming::RoleNaming;
use crate::repository::role::{db_error_code, DEPENDENT_OBJECTS_STILL_EXIST};
use crate::repository::RoleRepository;
use crate::types::{PendingRemoval, RoleName, SyncOutcome};
use dashmap::DashMap;
use sqlx::PgPool;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

static ROLE_SYS: OnceLock<Arc<RoleSys>> = OnceLock::new();

pub fn init_role_sys(pool: PgPool, naming: RoleNaming) -> Result<()> {
    debug!("init role synchronizer");
    ROLE_SYS
        .set(Arc::new(RoleSys::new(pool, naming)))
        .map_err(|_| Error::StringError("role synchronizer already initialized".to_string()))
}

#[inline]
pub fn get() -> Result<Arc<RoleSys>> {
    ROLE_SYS
        .get()
        .map(Arc::clone)
        .ok_or_else(|| Error::StringError("role synchronizer not initialized".to_string()))
}

/// The identity synchronizer.
///
/// Reacts to identity lifecycle events and reconciles the corresponding
/// database roles and membership edges. Operations touching the same identity
/// are serialized through a per-identity mutex; different identities proceed
/// concurrently. Blocked role removals are queued and retried, never dropped.
pub struct RoleSys {
    pub(crate) pool: PgPool,
    pub(crate) naming: RoleNaming,
    locks: DashMap<String, Arc<Mutex<()>>>,
    pending: RwLock<Vec<PendingRemoval>>,
}

impl RoleSys {
    pub fn new(pool: PgPool, naming: RoleNaming) -> Self {
        Self {
            pool,
            naming,
            locks: DashMap::new(),
            pending: RwLock::new(Vec::new()),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn naming(&self) -> &RoleNaming {
        &self.naming
    }

    pub(crate) fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Apply one identity lifecycle event.
    ///
    /// Safe under at-least-once delivery: replays end in `SyncOutcome::Noop`.
    /// Errors concern only this identity and never block synchronization of
    /// others.
    pub async fn apply(&self, event: &IdentityEvent) -> Result<SyncOutcome> {
        let lock = self.lock_for(event.identity_key());
        let _guard = lock.lock().await;

        match event {
            IdentityEvent::UserCreated { id } => self.create_user(id).await,
            IdentityEvent::UserRenamed { old_id, new_id } => self.rename_user(old_id, new_id).await,
            IdentityEvent::UserDeactivated { id } => self.set_user_active(id, false).await,
            IdentityEvent::UserReactivated { id } => self.set_user_active(id, true).await,
            IdentityEvent::UserDeleted { id } => self.delete_user(id).await,
            IdentityEvent::GroupCreated { id } => self.create_group(id).await,
            IdentityEvent::GroupRenamed { old_id, new_id } => self.rename_group(old_id, new_id).await,
            IdentityEvent::GroupDeleted { id } => self.delete_group(id).await,
            IdentityEvent::MembershipChanged { group_id, added, removed } => {
                self.membership_changed(group_id, added, removed).await
            }
        }
    }

    /// Full-state reconciliation against a snapshot of the application's
    /// identities. Convergent and safe to re-run; per-identity failures are
    /// counted and logged, never propagated.
    pub async fn resync(
        &self,
        users: &[crate::types::AppUser],
        groups: &[crate::types::AppGroup],
    ) -> crate::manager::reconcile::ReconcileSummary {
        use crate::manager::reconcile::RoleSysReconcileExt;
        RoleSysReconcileExt::resync(self, users, groups).await
    }

    /// Snapshot of removals currently blocked.
    pub async fn pending(&self) -> Vec<PendingRemoval> {
        self.pending.read().await.clone()
    }

    pub(crate) async fn queue_removal(&self, role: RoleName, reason: impl Into<String>) {
        let reason = reason.into();
        let mut pending = self.pending.write().await;
        if let Some(entry) = pending.iter_mut().find(|p| p.role == role) {
            entry.attempts += 1;
            entry.reason = reason;
        } else {
            warn!("role '{}' removal blocked, queued for retry: {}", role, reason);
            pending.push(PendingRemoval::new(role, reason));
        }
    }

    /// One reconciliation pass over the queued removals. Returns the number
    /// of roles actually dropped; still-blocked entries stay queued with an
    /// incremented attempt counter.
    pub async fn retry_pending(&self) -> usize {
        let snapshot = {
            let mut pending = self.pending.write().await;
            std::mem::take(&mut *pending)
        };
        if snapshot.is_empty() {
            return 0;
        }

        let mut removed = 0;
        let mut still_pending = Vec::new();
        for mut entry in snapshot {
            match self.try_remove(&entry.role).await {
                Ok(true) => {
                    info!("deferred removal of role '{}' completed", entry.role);
                    removed += 1;
                }
                Ok(false) => {
                    entry.attempts += 1;
                    still_pending.push(entry);
                }
                Err(e) => {
                    error!("retrying removal of role '{}' failed: {}", entry.role, e);
                    entry.attempts += 1;
                    still_pending.push(entry);
                }
            }
        }

        self.pending.write().await.extend(still_pending);
        removed
    }

    /// Attempt to drop a role if nothing blocks it. `Ok(false)` means still
    /// blocked (or already gone counts as done: returns `Ok(true)`).
    async fn try_remove(&self, role: &RoleName) -> Result<bool> {
        if !RoleRepository::exists(&self.pool, role).await? {
            return Ok(true);
        }
        if RoleRepository::owns_objects(&self.pool, role).await?
            || RoleRepository::has_active_sessions(&self.pool, role).await?
        {
            return Ok(false);
        }
        match RoleRepository::drop_role(&self.pool, role).await {
            Ok(()) => Ok(true),
            Err(e) if db_error_code(&e).as_deref() == Some(DEPENDENT_OBJECTS_STILL_EXIST) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Drain identity events from a channel into the synchronizer.
///
/// Ties into whatever reliable change-notification mechanism the identity
/// store provides; the sender side should enqueue within the store's own
/// transaction boundary. Failures are logged per event and never stop the
/// worker.
pub fn spawn_event_worker(
    sys: Arc<RoleSys>,
    mut events: mpsc::Receiver<IdentityEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match sys.apply(&event).await {
                Ok(outcome) => debug!("event for '{}' applied: {:?}", event.identity_key(), outcome),
                Err(e) => error!("synchronization failed for '{}': {}", event.identity_key(), e),
            }
        }
        debug!("identity event channel closed, worker exiting");
    })
}

/// Periodically retry blocked role removals.
pub fn spawn_pending_worker(sys: Arc<RoleSys>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = sys.retry_pending().await;
            if removed > 0 {
                info!("pending-removal pass dropped {} role(s)", removed);
            }
        }
    })
}
