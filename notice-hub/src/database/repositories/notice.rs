//! Notice ledger repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::NoticeDbModel;
use crate::{Error, Result};

const COLUMNS: &str =
    "id, recipient_id, sender_id, message, notice_type_id, added, unseen, archived, on_site";

/// Filter for listing notices of one user.
///
/// `unseen` and `on_site` are ternary: `None` means "don't filter".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoticeFilter {
    /// Include archived notices too. When `false` only non-archived
    /// notices are returned.
    pub archived: bool,
    pub unseen: Option<bool>,
    pub on_site: Option<bool>,
}

impl NoticeFilter {
    pub fn unseen(mut self, unseen: bool) -> Self {
        self.unseen = Some(unseen);
        self
    }

    pub fn on_site(mut self, on_site: bool) -> Self {
        self.on_site = Some(on_site);
        self
    }

    pub fn include_archived(mut self) -> Self {
        self.archived = true;
        self
    }
}

/// Which side of the notice the user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoticeRole {
    #[default]
    Recipient,
    Sender,
}

impl NoticeRole {
    fn column(self) -> &'static str {
        match self {
            Self::Recipient => "recipient_id",
            Self::Sender => "sender_id",
        }
    }
}

/// Notice repository trait.
#[async_trait]
pub trait NoticeRepository: Send + Sync {
    async fn create(&self, notice: &NoticeDbModel) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<NoticeDbModel>>;
    /// Notices ordered by `added` descending.
    async fn list(
        &self,
        user_id: &str,
        role: NoticeRole,
        filter: &NoticeFilter,
    ) -> Result<Vec<NoticeDbModel>>;
    async fn count(&self, user_id: &str, role: NoticeRole, filter: &NoticeFilter) -> Result<i64>;
    async fn set_archived(&self, id: &str) -> Result<()>;
    async fn set_unseen(&self, id: &str, unseen: bool) -> Result<()>;
}

/// SQLx implementation of NoticeRepository.
pub struct SqlxNoticeRepository {
    pool: SqlitePool,
}

impl SqlxNoticeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// WHERE clause shared by `list` and `count`; binds are
/// (user_id, archived, unseen, unseen, on_site, on_site).
fn where_clause(role: NoticeRole) -> String {
    format!(
        "WHERE {} = ? \
           AND (? OR archived = FALSE) \
           AND (? IS NULL OR unseen = ?) \
           AND (? IS NULL OR on_site = ?)",
        role.column()
    )
}

#[async_trait]
impl NoticeRepository for SqlxNoticeRepository {
    async fn create(&self, notice: &NoticeDbModel) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO notice ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&notice.id)
        .bind(&notice.recipient_id)
        .bind(&notice.sender_id)
        .bind(&notice.message)
        .bind(&notice.notice_type_id)
        .bind(notice.added)
        .bind(notice.unseen)
        .bind(notice.archived)
        .bind(notice.on_site)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<NoticeDbModel>> {
        let notice = sqlx::query_as::<_, NoticeDbModel>(&format!(
            "SELECT {COLUMNS} FROM notice WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notice)
    }

    async fn list(
        &self,
        user_id: &str,
        role: NoticeRole,
        filter: &NoticeFilter,
    ) -> Result<Vec<NoticeDbModel>> {
        let query = format!(
            "SELECT {COLUMNS} FROM notice {} ORDER BY added DESC, rowid DESC",
            where_clause(role)
        );
        let notices = sqlx::query_as::<_, NoticeDbModel>(&query)
            .bind(user_id)
            .bind(filter.archived)
            .bind(filter.unseen)
            .bind(filter.unseen)
            .bind(filter.on_site)
            .bind(filter.on_site)
            .fetch_all(&self.pool)
            .await?;
        Ok(notices)
    }

    async fn count(&self, user_id: &str, role: NoticeRole, filter: &NoticeFilter) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM notice {}", where_clause(role));
        let count: (i64,) = sqlx::query_as(&query)
            .bind(user_id)
            .bind(filter.archived)
            .bind(filter.unseen)
            .bind(filter.unseen)
            .bind(filter.on_site)
            .bind(filter.on_site)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    async fn set_archived(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE notice SET archived = TRUE WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Notice", id));
        }
        Ok(())
    }

    async fn set_unseen(&self, id: &str, unseen: bool) -> Result<()> {
        let result = sqlx::query("UPDATE notice SET unseen = ? WHERE id = ?")
            .bind(unseen)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Notice", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_builders() {
        let filter = NoticeFilter::default().unseen(true).on_site(false).include_archived();
        assert_eq!(
            filter,
            NoticeFilter {
                archived: true,
                unseen: Some(true),
                on_site: Some(false),
            }
        );
        assert_eq!(NoticeRole::default().column(), "recipient_id");
        assert_eq!(NoticeRole::Sender.column(), "sender_id");
    }

    #[test]
    fn test_where_clause_binds() {
        let clause = where_clause(NoticeRole::Sender);
        assert!(clause.starts_with("WHERE sender_id = ?"));
        assert_eq!(clause.matches('?').count(), 6);
    }
}
