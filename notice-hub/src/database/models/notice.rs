//! Notice (ledger entry) database model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::ms_to_datetime;

/// One delivered-or-attempted notification to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct NoticeDbModel {
    pub id: String,
    pub recipient_id: String,
    /// `None` for system-generated notices.
    pub sender_id: Option<String>,
    /// Rendered `notice.html`, not the raw template.
    pub message: String,
    pub notice_type_id: String,
    /// Unix epoch milliseconds (UTC).
    pub added: i64,
    pub unseen: bool,
    pub archived: bool,
    pub on_site: bool,
}

impl NoticeDbModel {
    pub fn new(
        recipient_id: impl Into<String>,
        sender_id: Option<String>,
        message: impl Into<String>,
        notice_type_id: impl Into<String>,
        on_site: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            recipient_id: recipient_id.into(),
            sender_id,
            message: message.into(),
            notice_type_id: notice_type_id.into(),
            added: crate::database::time::now_ms(),
            unseen: true,
            archived: false,
            on_site,
        }
    }

    pub fn added_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.added)
    }
}

impl std::fmt::Display for NoticeDbModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
