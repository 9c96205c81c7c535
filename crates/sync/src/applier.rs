//! Permission declaration application.
//!
//! The schema/migration tooling surfaces an ordered list of raw
//! access-control statements per schema entity (grants, row/column security
//! policies). This module applies them under the connecting (privileged)
//! role: in declared order, inside one transaction, and safely re-runnable,
//! since a batch that was already applied is skipped by checksum.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{info, warn};

/// Ordered access-control statements attached to one schema entity.
///
/// The statements are opaque to rolegate; only ordering and atomicity are
/// guaranteed. Later statements may depend on earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDeclaration {
    pub entity: String,
    pub statements: Vec<String>,
}

impl PermissionDeclaration {
    pub fn new(entity: impl Into<String>, statements: Vec<String>) -> Self {
        Self {
            entity: entity.into(),
            statements,
        }
    }

    /// Stable digest over the entity name and the ordered statements.
    /// Reordering or editing any statement changes the checksum.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.entity.as_bytes());
        hasher.update([0u8]);
        for statement in &self.statements {
            hasher.update(statement.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

/// Contract consumed by the external migration tooling.
#[async_trait]
pub trait DeclarationApplier: Send + Sync {
    async fn apply(&self, declaration: &PermissionDeclaration) -> Result<()>;
}

const CREATE_TRACKING_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rolegate_applied_declarations (
    entity VARCHAR(255) NOT NULL,
    checksum VARCHAR(64) NOT NULL,
    applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
    PRIMARY KEY (entity, checksum)
)
"#;

/// Default applier: runs each batch in one transaction and records it in a
/// tracking table so replayed migrations no-op.
pub struct SqlDeclarationApplier {
    pool: PgPool,
}

impl SqlDeclarationApplier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_tracking_table(&self) -> Result<()> {
        sqlx::query(CREATE_TRACKING_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    async fn already_applied(&self, declaration: &PermissionDeclaration, checksum: &str) -> Result<bool> {
        let applied = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM rolegate_applied_declarations WHERE entity = $1 AND checksum = $2)",
        )
        .bind(&declaration.entity)
        .bind(checksum)
        .fetch_one(&self.pool)
        .await?;
        Ok(applied)
    }
}

#[async_trait]
impl DeclarationApplier for SqlDeclarationApplier {
    async fn apply(&self, declaration: &PermissionDeclaration) -> Result<()> {
        if declaration.statements.is_empty() {
            return Ok(());
        }

        self.ensure_tracking_table().await?;

        let checksum = declaration.checksum();
        if self.already_applied(declaration, &checksum).await? {
            info!("permissions for '{}' already applied, skipping", declaration.entity);
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (idx, statement) in declaration.statements.iter().enumerate() {
            if let Err(e) = sqlx::query(statement).execute(&mut *tx).await {
                warn!("permission statement {} for '{}' failed: {}", idx, declaration.entity, e);
                return Err(Error::StringError(format!(
                    "permission statement {} for '{}' failed: {}",
                    idx, declaration.entity, e
                )));
            }
        }
        sqlx::query("INSERT INTO rolegate_applied_declarations (entity, checksum) VALUES ($1, $2)")
            .bind(&declaration.entity)
            .bind(&checksum)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(
            "applied {} permission statement(s) for '{}'",
            declaration.statements.len(),
            declaration.entity
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(statements: &[&str]) -> PermissionDeclaration {
        PermissionDeclaration::new("books", statements.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_checksum_stable() {
        let a = decl(&["GRANT SELECT ON books TO role_librarians"]);
        let b = decl(&["GRANT SELECT ON books TO role_librarians"]);
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_checksum_order_sensitive() {
        let a = decl(&["GRANT SELECT ON books TO role_librarians", "GRANT INSERT ON books TO role_librarians"]);
        let b = decl(&["GRANT INSERT ON books TO role_librarians", "GRANT SELECT ON books TO role_librarians"]);
        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_checksum_unambiguous_concatenation() {
        // ["ab", "c"] and ["a", "bc"] must not collide.
        let a = decl(&["ab", "c"]);
        let b = decl(&["a", "bc"]);
        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_checksum_covers_entity() {
        let a = PermissionDeclaration::new("books", vec!["GRANT SELECT ON books TO x".to_string()]);
        let b = PermissionDeclaration::new("loans", vec!["GRANT SELECT ON books TO x".to_string()]);
        assert_ne!(a.checksum(), b.checksum());
    }
}
