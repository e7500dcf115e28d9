//! Observed item repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::ObservedItemDbModel;

const COLUMNS: &str = "id, user_id, content_type, object_id, notice_type_id, added, signal";

/// Observed item repository trait.
#[async_trait]
pub trait ObservedItemRepository: Send + Sync {
    async fn create(&self, item: &ObservedItemDbModel) -> Result<()>;

    /// Registrations of one observer for an object and signal.
    async fn find_for(
        &self,
        content_type: &str,
        object_id: &str,
        user_id: &str,
        signal: &str,
    ) -> Result<Vec<ObservedItemDbModel>>;

    /// Every registration for an object and signal, newest first.
    async fn all_for(
        &self,
        content_type: &str,
        object_id: &str,
        signal: &str,
    ) -> Result<Vec<ObservedItemDbModel>>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// SQLx implementation of ObservedItemRepository.
pub struct SqlxObservedItemRepository {
    pool: SqlitePool,
}

impl SqlxObservedItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ObservedItemRepository for SqlxObservedItemRepository {
    async fn create(&self, item: &ObservedItemDbModel) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO observed_item ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&item.id)
        .bind(&item.user_id)
        .bind(&item.content_type)
        .bind(&item.object_id)
        .bind(&item.notice_type_id)
        .bind(item.added)
        .bind(&item.signal)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_for(
        &self,
        content_type: &str,
        object_id: &str,
        user_id: &str,
        signal: &str,
    ) -> Result<Vec<ObservedItemDbModel>> {
        let items = sqlx::query_as::<_, ObservedItemDbModel>(&format!(
            "SELECT {COLUMNS} FROM observed_item \
             WHERE content_type = ? AND object_id = ? AND user_id = ? AND signal = ? \
             ORDER BY added DESC, rowid DESC"
        ))
        .bind(content_type)
        .bind(object_id)
        .bind(user_id)
        .bind(signal)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn all_for(
        &self,
        content_type: &str,
        object_id: &str,
        signal: &str,
    ) -> Result<Vec<ObservedItemDbModel>> {
        let items = sqlx::query_as::<_, ObservedItemDbModel>(&format!(
            "SELECT {COLUMNS} FROM observed_item \
             WHERE content_type = ? AND object_id = ? AND signal = ? \
             ORDER BY added DESC, rowid DESC"
        ))
        .bind(content_type)
        .bind(object_id)
        .bind(signal)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM observed_item WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
