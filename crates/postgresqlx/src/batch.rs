use crate::{PgxError, Result};
use sqlx::PgPool;
use tracing::{info, warn};

/// Execute a single raw SQL statement.
///
/// # Arguments
/// * `pool` - PostgreSQL connection pool
/// * `sql` - Statement to execute
/// * `label` - Short description used in log output
pub async fn execute_statement(pool: &PgPool, sql: &str, label: &str) -> Result<()> {
    sqlx::query(sql).execute(pool).await.map_err(|e| {
        warn!("statement '{}' failed: {}", label, e);
        PgxError::Query(format!("statement '{label}' failed: {e}"))
    })?;

    Ok(())
}

/// Execute an ordered list of raw SQL statements inside one transaction.
///
/// Statements run in the given order; any failure rolls the whole batch back,
/// so a partial failure leaves nothing applied.
///
/// # Arguments
/// * `pool` - PostgreSQL connection pool
/// * `statements` - Statements in execution order
/// * `label` - Short description used in log output
pub async fn execute_batch(pool: &PgPool, statements: &[String], label: &str) -> Result<()> {
    if statements.is_empty() {
        return Ok(());
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| PgxError::Query(format!("failed to begin transaction for '{label}': {e}")))?;

    for (idx, sql) in statements.iter().enumerate() {
        sqlx::query(sql).execute(&mut *tx).await.map_err(|e| {
            warn!("batch '{}' statement {} failed: {}", label, idx, e);
            PgxError::Query(format!("batch '{label}' statement {idx} failed: {e}"))
        })?;
    }

    tx.commit()
        .await
        .map_err(|e| PgxError::Query(format!("failed to commit batch '{label}': {e}")))?;

    info!("batch '{}' applied ({} statements)", label, statements.len());
    Ok(())
}
