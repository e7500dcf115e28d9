//! Notice setting (preference) repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::NoticeSettingDbModel;
use crate::{Error, Result};

const COLUMNS: &str = "id, user_id, notice_type_id, medium, send";

/// Preference repository trait.
#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    async fn find(
        &self,
        user_id: &str,
        notice_type_id: &str,
        medium: &str,
    ) -> Result<Option<NoticeSettingDbModel>>;

    /// Insert a new row; fails with `Error::Duplicate` when a row for the same
    /// (user, notice type, medium) already exists.
    async fn create(&self, setting: &NoticeSettingDbModel) -> Result<()>;

    async fn set_send(&self, id: &str, send: bool) -> Result<()>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<NoticeSettingDbModel>>;
}

/// SQLx implementation of PreferenceRepository.
pub struct SqlxPreferenceRepository {
    pool: SqlitePool,
}

impl SqlxPreferenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceRepository for SqlxPreferenceRepository {
    async fn find(
        &self,
        user_id: &str,
        notice_type_id: &str,
        medium: &str,
    ) -> Result<Option<NoticeSettingDbModel>> {
        let setting = sqlx::query_as::<_, NoticeSettingDbModel>(&format!(
            "SELECT {COLUMNS} FROM notice_setting \
             WHERE user_id = ? AND notice_type_id = ? AND medium = ?"
        ))
        .bind(user_id)
        .bind(notice_type_id)
        .bind(medium)
        .fetch_optional(&self.pool)
        .await?;
        Ok(setting)
    }

    async fn create(&self, setting: &NoticeSettingDbModel) -> Result<()> {
        let result = sqlx::query(&format!(
            "INSERT INTO notice_setting ({COLUMNS}) VALUES (?, ?, ?, ?, ?)"
        ))
        .bind(&setting.id)
        .bind(&setting.user_id)
        .bind(&setting.notice_type_id)
        .bind(&setting.medium)
        .bind(setting.send)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                Error::duplicate(
                    "NoticeSetting",
                    format!(
                        "{}/{}/{}",
                        setting.user_id, setting.notice_type_id, setting.medium
                    ),
                ),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_send(&self, id: &str, send: bool) -> Result<()> {
        let result = sqlx::query("UPDATE notice_setting SET send = ? WHERE id = ?")
            .bind(send)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("NoticeSetting", id));
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<NoticeSettingDbModel>> {
        let settings = sqlx::query_as::<_, NoticeSettingDbModel>(&format!(
            "SELECT {COLUMNS} FROM notice_setting WHERE user_id = ? ORDER BY notice_type_id, medium"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{NoticeTypeDbModel, UserDbModel};
    use crate::database::repositories::{
        NoticeTypeRepository, SqlxNoticeTypeRepository, SqlxUserRepository, UserRepository,
    };
    use crate::database::test_pool;

    #[tokio::test]
    async fn test_unique_per_user_type_medium() {
        let pool = test_pool().await;
        let user = UserDbModel::new("alice");
        SqlxUserRepository::new(pool.clone()).create(&user).await.unwrap();
        let nt = NoticeTypeDbModel::new("welcome", "Welcome", "Welcome message", 2);
        SqlxNoticeTypeRepository::new(pool.clone()).create(&nt).await.unwrap();
        let repo = SqlxPreferenceRepository::new(pool);

        repo.create(&NoticeSettingDbModel::new(&user.id, &nt.id, "1", true))
            .await
            .unwrap();
        repo.create(&NoticeSettingDbModel::new(&user.id, &nt.id, "3", false))
            .await
            .unwrap();
        let err = repo
            .create(&NoticeSettingDbModel::new(&user.id, &nt.id, "1", false))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());

        let stored = repo.find(&user.id, &nt.id, "1").await.unwrap().unwrap();
        assert!(stored.send);
        repo.set_send(&stored.id, false).await.unwrap();
        assert!(!repo.find(&user.id, &nt.id, "1").await.unwrap().unwrap().send);
        assert_eq!(repo.list_for_user(&user.id).await.unwrap().len(), 2);
        assert!(repo.set_send("missing", true).await.is_err());
    }
}
