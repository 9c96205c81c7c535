use crate::error::{Result, SessionError};
use crate::stack::{ContextStack, RestoreTarget};
use futures_util::future::BoxFuture;
use rolegate_postgresqlx::quote_ident;
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};
use tracing::{debug, error, warn};

/// SQLSTATE raised when the session may not assume the requested role.
const INSUFFICIENT_PRIVILEGE: &str = "42501";

/// A database session with scoped, nestable privilege switching.
///
/// Owns exactly one pooled connection for its whole lifetime; it is never
/// shared between concurrent units of work. Every successful [`enter`] must
/// be matched by an [`exit`]; [`with_role`] does that on every exit path. A
/// session dropped mid-context, or whose restore directive failed, discards
/// its connection instead of returning it to the pool; a connection in an
/// unknown privilege state is never reused.
///
/// [`enter`]: PrivilegedSession::enter
/// [`exit`]: PrivilegedSession::exit
/// [`with_role`]: PrivilegedSession::with_role
pub struct PrivilegedSession {
    conn: Option<PoolConnection<Postgres>>,
    stack: ContextStack,
    session_authorized: bool,
    poisoned: bool,
}

impl PrivilegedSession {
    /// Check a dedicated connection out of the pool.
    pub async fn acquire(pool: &PgPool) -> Result<Self> {
        let conn = pool.acquire().await?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-acquired connection. The connection must be at its
    /// default privilege state.
    pub fn from_connection(conn: PoolConnection<Postgres>) -> Self {
        Self {
            conn: Some(conn),
            stack: ContextStack::new(),
            session_authorized: false,
            poisoned: false,
        }
    }

    /// Number of privilege contexts currently entered.
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    /// The role this session currently runs as, `None` at default privilege.
    pub fn active_role(&self) -> Option<&str> {
        self.stack.active()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn conn_mut(&mut self) -> &mut PgConnection {
        self.conn.as_mut().expect("connection held until the session is consumed")
    }

    /// Switch the session's effective privileges to `role`.
    ///
    /// Nestable: the prior context is remembered and restored by the matching
    /// [`PrivilegedSession::exit`]. On any error the session's privilege
    /// state is unchanged and the attempted switch must be treated as not
    /// having happened.
    pub async fn enter(&mut self, role: &str) -> Result<()> {
        if self.poisoned {
            return Err(SessionError::Poisoned);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = $1)")
            .bind(role)
            .fetch_one(self.conn_mut())
            .await?;
        if !exists {
            return Err(SessionError::UnknownRole(role.to_string()));
        }

        let directive = format!("SET ROLE {}", quote_ident(role));
        match sqlx::query(&directive).execute(self.conn_mut()).await {
            Ok(_) => {
                self.stack.push(role);
                debug!("entered privilege context '{}' (depth {})", role, self.stack.depth());
                Ok(())
            }
            Err(e) if db_error_code(&e).as_deref() == Some(INSUFFICIENT_PRIVILEGE) => {
                Err(SessionError::PrivilegeDenied(role.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Restore the privilege state active immediately before the matching
    /// [`PrivilegedSession::enter`].
    ///
    /// If the restore directive itself fails, the session is poisoned: its
    /// connection is in an unknown privilege state and will be discarded,
    /// never returned to the pool.
    pub async fn exit(&mut self) -> Result<()> {
        if self.poisoned {
            return Err(SessionError::Poisoned);
        }

        let target = self.stack.pop().ok_or(SessionError::NotInContext)?;
        let directive = match &target {
            RestoreTarget::Role(role) => format!("SET ROLE {}", quote_ident(role)),
            RestoreTarget::Default => "RESET ROLE".to_string(),
        };

        if let Err(e) = sqlx::query(&directive).execute(self.conn_mut()).await {
            self.poisoned = true;
            error!("privilege restore failed, poisoning session: {}", e);
            return Err(SessionError::RestoreFailed(e.to_string()));
        }

        debug!("exited privilege context (depth {})", self.stack.depth());
        Ok(())
    }

    /// Run a unit of work under `role`, restoring the prior privilege state
    /// on every exit path, normal return and error propagation alike.
    ///
    /// The closure receives the raw connection to run its queries on; what it
    /// executes is up to the caller, this method only governs the privilege
    /// context it runs under. If the work fails *and* the restore fails, the
    /// work's error is returned and the poisoned session discards its
    /// connection when released.
    pub async fn with_role<T>(
        &mut self,
        role: &str,
        work: impl for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T>>,
    ) -> Result<T> {
        self.enter(role).await?;
        let result = work(self.conn_mut()).await;
        let restore = self.exit().await;

        match (result, restore) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Err(work_err), Err(restore_err)) => {
                error!("privilege restore failed after work error: {}", restore_err);
                Err(work_err)
            }
        }
    }

    /// Switch the session's authorization identity outright.
    ///
    /// Unlike [`PrivilegedSession::enter`] this is not stackable: attempting
    /// it while any context is active fails with
    /// [`SessionError::AlreadyInContext`].
    pub async fn set_session_authorization(&mut self, role: &str) -> Result<()> {
        if self.poisoned {
            return Err(SessionError::Poisoned);
        }
        if !self.stack.is_empty() || self.session_authorized {
            return Err(SessionError::AlreadyInContext);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = $1)")
            .bind(role)
            .fetch_one(self.conn_mut())
            .await?;
        if !exists {
            return Err(SessionError::UnknownRole(role.to_string()));
        }

        let directive = format!("SET SESSION AUTHORIZATION {}", quote_ident(role));
        match sqlx::query(&directive).execute(self.conn_mut()).await {
            Ok(_) => {
                self.session_authorized = true;
                Ok(())
            }
            Err(e) if db_error_code(&e).as_deref() == Some(INSUFFICIENT_PRIVILEGE) => {
                Err(SessionError::PrivilegeDenied(role.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Restore the original session authorization set at connect time.
    pub async fn reset_session_authorization(&mut self) -> Result<()> {
        if self.poisoned {
            return Err(SessionError::Poisoned);
        }
        if !self.session_authorized {
            return Err(SessionError::NotInContext);
        }
        if !self.stack.is_empty() {
            // Inner SET ROLE contexts must be exited first.
            return Err(SessionError::AlreadyInContext);
        }

        if let Err(e) = sqlx::query("RESET SESSION AUTHORIZATION").execute(self.conn_mut()).await {
            self.poisoned = true;
            error!("session authorization restore failed, poisoning session: {}", e);
            return Err(SessionError::RestoreFailed(e.to_string()));
        }
        self.session_authorized = false;
        Ok(())
    }

    /// The role the database reports for the session right now.
    pub async fn current_role(&mut self) -> Result<String> {
        Ok(sqlx::query_scalar::<_, String>("SELECT current_user")
            .fetch_one(self.conn_mut())
            .await?)
    }

    /// Give the connection back.
    ///
    /// Returned to the pool only when every context has been exited and no
    /// restore ever failed; otherwise the connection is discarded. Dropping
    /// the session has the same effect, so cancellation and panics cannot
    /// leak a switched connection into the pool.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PrivilegedSession {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.stack.is_empty() && !self.session_authorized && !self.poisoned {
            // Restored to default; safe to hand back to the pool.
            drop(conn);
        } else {
            warn!(
                "privileged session dropped with depth {} (poisoned: {}); discarding connection",
                self.stack.depth(),
                self.poisoned
            );
            rolegate_postgresqlx::discard(conn);
        }
    }
}

fn db_error_code(e: &sqlx::Error) -> Option<String> {
    match e {
        sqlx::Error::Database(db) => db.code().map(|c| c.to_string()),
        _ => None,
    }
}
