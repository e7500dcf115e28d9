//! Notice type repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::NoticeTypeDbModel;
use crate::{Error, Result};

const COLUMNS: &str = r#"id, label, display, description, "default""#;

/// Notice type repository trait.
#[async_trait]
pub trait NoticeTypeRepository: Send + Sync {
    async fn find_by_label(&self, label: &str) -> Result<Option<NoticeTypeDbModel>>;
    async fn find_by_id(&self, id: &str) -> Result<Option<NoticeTypeDbModel>>;
    async fn create(&self, notice_type: &NoticeTypeDbModel) -> Result<()>;
    async fn update(&self, notice_type: &NoticeTypeDbModel) -> Result<()>;
    async fn list(&self) -> Result<Vec<NoticeTypeDbModel>>;
}

/// SQLx implementation of NoticeTypeRepository.
pub struct SqlxNoticeTypeRepository {
    pool: SqlitePool,
}

impl SqlxNoticeTypeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NoticeTypeRepository for SqlxNoticeTypeRepository {
    async fn find_by_label(&self, label: &str) -> Result<Option<NoticeTypeDbModel>> {
        let notice_type = sqlx::query_as::<_, NoticeTypeDbModel>(&format!(
            "SELECT {COLUMNS} FROM notice_type WHERE label = ?"
        ))
        .bind(label)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notice_type)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<NoticeTypeDbModel>> {
        let notice_type = sqlx::query_as::<_, NoticeTypeDbModel>(&format!(
            "SELECT {COLUMNS} FROM notice_type WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notice_type)
    }

    async fn create(&self, notice_type: &NoticeTypeDbModel) -> Result<()> {
        let result = sqlx::query(&format!(
            "INSERT INTO notice_type ({COLUMNS}) VALUES (?, ?, ?, ?, ?)"
        ))
        .bind(&notice_type.id)
        .bind(&notice_type.label)
        .bind(&notice_type.display)
        .bind(&notice_type.description)
        .bind(notice_type.default)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(Error::duplicate("NoticeType", &notice_type.label))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, notice_type: &NoticeTypeDbModel) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notice_type SET
                display = ?,
                description = ?,
                "default" = ?
            WHERE id = ?
            "#,
        )
        .bind(&notice_type.display)
        .bind(&notice_type.description)
        .bind(notice_type.default)
        .bind(&notice_type.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<NoticeTypeDbModel>> {
        let types = sqlx::query_as::<_, NoticeTypeDbModel>(&format!(
            "SELECT {COLUMNS} FROM notice_type ORDER BY label"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(types)
    }
}
