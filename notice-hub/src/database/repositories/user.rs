//! User repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::UserDbModel;
use crate::{Error, Result};

const COLUMNS: &str = "id, username, email, sms_number, is_active, language, created_at";

/// User repository trait.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &UserDbModel) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<UserDbModel>>;
    /// Users with the given ids; unknown ids are ignored.
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<UserDbModel>>;
    async fn update(&self, user: &UserDbModel) -> Result<()>;
}

/// SQLx implementation of UserRepository.
pub struct SqlxUserRepository {
    pool: SqlitePool,
}

impl SqlxUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &UserDbModel) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, username, email, sms_number, is_active, language, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.sms_number)
        .bind(user.is_active)
        .bind(&user.language)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(Error::duplicate("User", &user.username))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserDbModel>> {
        let user = sqlx::query_as::<_, UserDbModel>(&format!(
            "SELECT {COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<UserDbModel>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        // SQLite has no array binding; the id list travels as JSON.
        let ids_json = serde_json::to_string(ids)?;
        let users = sqlx::query_as::<_, UserDbModel>(&format!(
            "SELECT {COLUMNS} FROM users WHERE id IN (SELECT value FROM json_each(?))"
        ))
        .bind(ids_json)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn update(&self, user: &UserDbModel) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                username = ?,
                email = ?,
                sms_number = ?,
                is_active = ?,
                language = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.sms_number)
        .bind(user.is_active)
        .bind(&user.language)
        .bind(&user.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("User", &user.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;

    #[tokio::test]
    async fn test_create_and_find() {
        let repo = SqlxUserRepository::new(test_pool().await);
        let user = UserDbModel::new("alice")
            .with_email("alice@example.com")
            .with_language("de");
        repo.create(&user).await.unwrap();

        let found = repo.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(found, user);
        assert!(repo.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let repo = SqlxUserRepository::new(test_pool().await);
        repo.create(&UserDbModel::new("bob")).await.unwrap();
        let err = repo.create(&UserDbModel::new("bob")).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_find_by_ids_ignores_unknown() {
        let repo = SqlxUserRepository::new(test_pool().await);
        let a = UserDbModel::new("a");
        let b = UserDbModel::new("b");
        repo.create(&a).await.unwrap();
        repo.create(&b).await.unwrap();

        let found = repo
            .find_by_ids(&[a.id.clone(), "nope".to_string(), b.id.clone()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(repo.find_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let repo = SqlxUserRepository::new(test_pool().await);
        let err = repo.update(&UserDbModel::new("ghost")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
