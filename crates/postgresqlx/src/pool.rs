use crate::{DatabaseConfig, PgxError, Result};
use sqlx::pool::PoolConnection;
use sqlx::{Connection, PgPool, Postgres};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

static GLOBAL_POOL: OnceCell<Arc<PgPool>> = OnceCell::const_new();

/// PostgreSQL connection pool wrapper.
///
/// The process holds a single global pool, initialized once with [`PgxPool::init`]
/// and retrieved with [`PgxPool::get`]. Crates that prefer explicit dependency
/// injection can construct one from an existing [`PgPool`] with [`PgxPool::from_pool`].
#[derive(Clone)]
pub struct PgxPool {
    pool: Arc<PgPool>,
}

impl PgxPool {
    /// Initialize the global connection pool.
    ///
    /// If the configuration names a schema, it is created when missing.
    ///
    /// # Arguments
    /// * `config` - Database configuration
    ///
    /// # Returns
    /// Returns `Ok(())` on success, or an error if the pool cannot be created
    /// or was already initialized.
    pub async fn init(config: &DatabaseConfig) -> Result<()> {
        let pool = config.create_pool().await?;

        if let Some(schema_name) = config.schema.as_deref() {
            let schema_sql = format!("CREATE SCHEMA IF NOT EXISTS {schema_name}");
            if let Err(e) = sqlx::query(&schema_sql).execute(&pool).await {
                warn!("failed to create schema '{}': {}", schema_name, e);
            } else {
                info!("schema '{}' created or already exists", schema_name);
            }
        }

        GLOBAL_POOL
            .set(Arc::new(pool))
            .map_err(|_| PgxError::Configuration("pool already initialized".to_string()))?;

        Ok(())
    }

    /// Get the global connection pool instance.
    ///
    /// Call [`PgxPool::init`] first.
    pub fn get() -> Result<Self> {
        let pool = GLOBAL_POOL
            .get()
            .ok_or_else(|| PgxError::Configuration("pool not initialized, call init() first".to_string()))?;

        Ok(Self { pool: pool.clone() })
    }

    /// Wrap an existing pool without touching the global instance.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Get the underlying `PgPool`.
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    /// Check out a dedicated connection from the pool.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>> {
        Ok(self.pool.acquire().await?)
    }

    /// Check if the connection pool is healthy.
    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .execute(self.inner())
            .await
            .map_err(|e| PgxError::Query(e.to_string()))
            .map(|_| true)
    }
}

/// Permanently remove a connection from its pool and close it.
///
/// The connection will not be handed to any other caller. Used when a session's
/// privilege state can no longer be trusted (failed restore, drop mid-context):
/// the connection is discarded rather than returned to the pool.
pub fn discard(conn: PoolConnection<Postgres>) {
    warn!("discarding pooled connection instead of returning it");
    let raw = conn.detach();
    // May run from a Drop outside any runtime; the detached connection is
    // closed on drop either way, the graceful close is just quieter.
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            if let Err(e) = raw.close().await {
                warn!("error closing discarded connection: {}", e);
            }
        });
    }
}
