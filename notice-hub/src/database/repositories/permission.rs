//! Per-object permission repository.
//!
//! Backs the optional object-scoped notification overrides: a user may be
//! granted named permissions on individual objects.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;

/// Object permission repository trait.
#[async_trait]
pub trait ObjectPermissionRepository: Send + Sync {
    async fn grant(
        &self,
        user_id: &str,
        permission: &str,
        content_type: &str,
        object_id: &str,
    ) -> Result<()>;

    async fn revoke(
        &self,
        user_id: &str,
        permission: &str,
        content_type: &str,
        object_id: &str,
    ) -> Result<()>;

    async fn exists(
        &self,
        user_id: &str,
        permission: &str,
        content_type: &str,
        object_id: &str,
    ) -> Result<bool>;
}

/// SQLx implementation of ObjectPermissionRepository.
pub struct SqlxObjectPermissionRepository {
    pool: SqlitePool,
}

impl SqlxObjectPermissionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ObjectPermissionRepository for SqlxObjectPermissionRepository {
    async fn grant(
        &self,
        user_id: &str,
        permission: &str,
        content_type: &str,
        object_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO object_permission (user_id, permission, content_type, object_id)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(permission)
        .bind(content_type)
        .bind(object_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke(
        &self,
        user_id: &str,
        permission: &str,
        content_type: &str,
        object_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "DELETE FROM object_permission \
             WHERE user_id = ? AND permission = ? AND content_type = ? AND object_id = ?",
        )
        .bind(user_id)
        .bind(permission)
        .bind(content_type)
        .bind(object_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn exists(
        &self,
        user_id: &str,
        permission: &str,
        content_type: &str,
        object_id: &str,
    ) -> Result<bool> {
        let found: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM object_permission \
             WHERE user_id = ? AND permission = ? AND content_type = ? AND object_id = ?",
        )
        .bind(user_id)
        .bind(permission)
        .bind(content_type)
        .bind(object_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }
}
