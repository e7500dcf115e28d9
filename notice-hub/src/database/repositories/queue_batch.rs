//! Queued batch repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::NoticeQueueBatchDbModel;

/// Queue batch repository trait.
#[async_trait]
pub trait QueueBatchRepository: Send + Sync {
    async fn create(&self, batch: &NoticeQueueBatchDbModel) -> Result<()>;
    /// All batches, oldest first.
    async fn list(&self) -> Result<Vec<NoticeQueueBatchDbModel>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// SQLx implementation of QueueBatchRepository.
pub struct SqlxQueueBatchRepository {
    pool: SqlitePool,
}

impl SqlxQueueBatchRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueBatchRepository for SqlxQueueBatchRepository {
    async fn create(&self, batch: &NoticeQueueBatchDbModel) -> Result<()> {
        sqlx::query("INSERT INTO notice_queue_batch (id, payload, created_at) VALUES (?, ?, ?)")
            .bind(&batch.id)
            .bind(&batch.payload)
            .bind(batch.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<NoticeQueueBatchDbModel>> {
        let batches = sqlx::query_as::<_, NoticeQueueBatchDbModel>(
            "SELECT id, payload, created_at FROM notice_queue_batch ORDER BY created_at, rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(batches)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM notice_queue_batch WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;

    #[tokio::test]
    async fn test_list_in_insertion_order() {
        let repo = SqlxQueueBatchRepository::new(test_pool().await);
        let first = NoticeQueueBatchDbModel::new("a");
        let mut second = NoticeQueueBatchDbModel::new("b");
        second.created_at = first.created_at;
        repo.create(&first).await.unwrap();
        repo.create(&second).await.unwrap();

        let listed: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.payload)
            .collect();
        assert_eq!(listed, vec!["a", "b"]);

        repo.delete(&first.id).await.unwrap();
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
