//! Notice setting (per-user preference) database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Whether `user_id` wants notices of `notice_type_id` through `medium`.
///
/// At most one row exists per (user, notice type, medium).
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct NoticeSettingDbModel {
    pub id: String,
    pub user_id: String,
    pub notice_type_id: String,
    /// Medium code (see `Medium::code`).
    pub medium: String,
    pub send: bool,
}

impl NoticeSettingDbModel {
    pub fn new(
        user_id: impl Into<String>,
        notice_type_id: impl Into<String>,
        medium: impl Into<String>,
        send: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            notice_type_id: notice_type_id.into(),
            medium: medium.into(),
            send,
        }
    }
}
